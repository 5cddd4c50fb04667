// src/lib.rs

pub mod cache;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod fs;
pub mod hash;
pub mod ipc;
pub mod logging;
pub mod pipeline;
pub mod stats;
pub mod watch;

use anyhow::{Context, Result};

use crate::cli::{CliArgs, Command};
use crate::hash::{HashEngine, SimdLevel};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Daemon(daemon_args) => daemon::run_daemon(daemon_args).await,
        Command::Tail(tail_args) => commands::tail(tail_args).await,
        Command::Hash(hash_args) => commands::hash_files(&hash_args),
    }
}

/// Build the hashing engine, honouring a pinned kernel when one is given.
pub fn engine_for(simd: Option<SimdLevel>) -> Result<HashEngine> {
    match simd {
        None => Ok(HashEngine::detect()),
        Some(level) => HashEngine::with_level(level).with_context(|| {
            format!(
                "SIMD level {level} is not supported on this host (available: {:?})",
                SimdLevel::available()
            )
        }),
    }
}
