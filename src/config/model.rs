// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheOptions, DEFAULT_MAX_ENTRIES};
use crate::hash::{SimdLevel, DEFAULT_BLOCK_SIZE};
use crate::ipc::{OverflowPolicy, RingOptions, WakeMode, DEFAULT_CAPACITY, DEFAULT_SLOT_SIZE};
use crate::pipeline::{PipelineOptions, DEFAULT_MAX_FILE_SIZE};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [hash]
/// block_size = 4096
/// cache_ttl_secs = 3600
/// max_file_size = 104857600
///
/// [ring]
/// path = "/tmp/changefeed.ring"
/// capacity = 32768
/// overflow_policy = "drop-oldest"
///
/// [pipeline]
/// workers = 4
///
/// [watch]
/// paths = ["src"]
/// exclude = ["**/target/**"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub hash: HashSection,
    #[serde(default)]
    pub ring: RingSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub watch: WatchSection,
}

/// A validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub hash: HashSection,
    pub ring: RingSection,
    pub pipeline: PipelineSection,
    pub watch: WatchSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            hash: raw.hash,
            ring: raw.ring,
            pipeline: raw.pipeline,
            watch: raw.watch,
        }
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            ttl: Duration::from_secs(self.hash.cache_ttl_secs),
            block_size: self.hash.block_size,
            max_entries: self.hash.max_entries,
        }
    }

    pub fn ring_options(&self) -> RingOptions {
        let overflow = match self.ring.overflow_policy {
            OverflowPolicyKind::DropOldest => OverflowPolicy::DropOldest,
            OverflowPolicyKind::Block => OverflowPolicy::Block {
                timeout: self.ring.block_timeout_ms.map(Duration::from_millis),
            },
        };
        RingOptions {
            capacity: self.ring.capacity,
            slot_size: self.ring.slot_size,
            overflow,
            wake: self.ring.wake,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            workers: self.pipeline.workers,
            shutdown_grace: Duration::from_millis(self.pipeline.shutdown_grace_ms),
            publish_unchanged: self.pipeline.publish_unchanged,
            max_file_size: (self.hash.max_file_size > 0).then_some(self.hash.max_file_size),
        }
    }
}

/// `[hash]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashSection {
    /// Incremental hashing block, a non-zero multiple of 64 bytes.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// How often expired cache entries are swept.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Cached paths before the oldest are evicted.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Files larger than this many bytes are published without a
    /// fingerprint instead of being read. 0 hashes everything.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Pin the hashing kernel instead of auto-detecting. Fingerprints are
    /// identical either way; this only changes speed.
    #[serde(default)]
    pub simd: Option<SimdLevel>,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for HashSection {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_entries: default_max_entries(),
            max_file_size: default_max_file_size(),
            simd: None,
        }
    }
}

/// `"drop-oldest"` or `"block"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicyKind {
    #[default]
    DropOldest,
    Block,
}

/// `[ring]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RingSection {
    #[serde(default = "default_ring_path")]
    pub path: PathBuf,

    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Bytes per slot including the 16-byte slot header.
    #[serde(default = "default_slot_size")]
    pub slot_size: u32,

    #[serde(default)]
    pub overflow_policy: OverflowPolicyKind,

    /// Under `"block"`, give up after this long. Unset waits forever.
    #[serde(default)]
    pub block_timeout_ms: Option<u64>,

    #[serde(default)]
    pub wake: WakeMode,
}

/// `$TMPDIR/changefeed.ring`.
pub fn default_ring_path() -> PathBuf {
    std::env::temp_dir().join("changefeed.ring")
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

fn default_slot_size() -> u32 {
    DEFAULT_SLOT_SIZE
}

impl Default for RingSection {
    fn default() -> Self {
        Self {
            path: default_ring_path(),
            capacity: default_capacity(),
            slot_size: default_slot_size(),
            overflow_policy: OverflowPolicyKind::default(),
            block_timeout_ms: None,
            wake: WakeMode::default(),
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    /// Worker lanes; 0 means one per CPU.
    #[serde(default)]
    pub workers: usize,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Publish `Modified` events even when the content did not change.
    #[serde(default)]
    pub publish_unchanged: bool,

    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

fn default_stats_interval_secs() -> u64 {
    30
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            workers: 0,
            shutdown_grace_ms: default_shutdown_grace_ms(),
            publish_unchanged: false,
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// `[watch]` section, used by the built-in notify watcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    #[serde(default = "default_watch_paths")]
    pub paths: Vec<PathBuf>,

    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Globs relative to the watched root; a path must match one.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Globs relative to the watched root; a match drops the event.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_watch_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_true() -> bool {
    true
}

fn default_include() -> Vec<String> {
    vec!["**".to_string()]
}

fn default_exclude() -> Vec<String> {
    ["**/.git/**", "**/target/**", "**/node_modules/**"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            paths: default_watch_paths(),
            recursive: true,
            include: default_include(),
            exclude: default_exclude(),
        }
    }
}
