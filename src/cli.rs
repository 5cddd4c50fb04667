// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::hash::{SimdLevel, DEFAULT_BLOCK_SIZE};
use crate::ipc::StartFrom;

/// Command-line arguments for `changefeed`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "changefeed",
    version,
    about = "Content-hashed file change events over a shared-memory ring.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CHANGEFEED_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Watch paths, hash changed files and publish events to the ring.
    Daemon(DaemonArgs),
    /// Attach to a ring and print events as they arrive.
    Tail(TailArgs),
    /// Print the fingerprint of each file.
    Hash(HashArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DaemonArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `changefeed.toml` in the current directory if present,
    /// otherwise built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override `[ring].path`.
    #[arg(long, value_name = "PATH")]
    pub ring: Option<PathBuf>,

    /// Override `[watch].paths`.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct TailArgs {
    /// Ring file to attach to. Default: `$TMPDIR/changefeed.ring`.
    #[arg(long, value_name = "PATH")]
    pub ring: Option<PathBuf>,

    /// Start with the oldest buffered event or only new ones.
    #[arg(long, value_enum, default_value = "oldest")]
    pub from: FromArg,

    /// Exit after this many events.
    #[arg(long, value_name = "N")]
    pub count: Option<u64>,

    /// Sleep-and-recheck instead of blocking on the futex.
    #[arg(long)]
    pub poll: bool,
}

#[derive(Debug, Clone, Args)]
pub struct HashArgs {
    /// Files to fingerprint.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Force a kernel (none, neon, avx2, avx512).
    #[arg(long, value_name = "LEVEL")]
    pub simd: Option<SimdLevel>,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum FromArg {
    Oldest,
    Latest,
}

impl From<FromArg> for StartFrom {
    fn from(arg: FromArg) -> Self {
        match arg {
            FromArg::Oldest => StartFrom::Oldest,
            FromArg::Latest => StartFrom::Latest,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
