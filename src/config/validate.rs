// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ChangefeedError, Result};
use crate::hash::STRIPE_LEN;
use crate::ipc::Geometry;
use crate::watch::PathFilter;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ChangefeedError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_hash(cfg)?;
    validate_ring(cfg)?;
    validate_pipeline(cfg)?;
    validate_watch(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> ChangefeedError {
    ChangefeedError::ConfigError(msg.into())
}

fn validate_hash(cfg: &RawConfigFile) -> Result<()> {
    let block_size = cfg.hash.block_size;
    if block_size == 0 || block_size % STRIPE_LEN != 0 {
        return Err(config_error(format!(
            "[hash].block_size must be a non-zero multiple of {STRIPE_LEN} (got {block_size})"
        )));
    }
    if cfg.hash.max_entries == 0 {
        return Err(config_error("[hash].max_entries must be >= 1 (got 0)"));
    }
    if cfg.hash.sweep_interval_secs == 0 {
        return Err(config_error("[hash].sweep_interval_secs must be >= 1 (got 0)"));
    }
    if let Some(level) = cfg.hash.simd {
        if !level.is_supported() {
            return Err(config_error(format!(
                "[hash].simd = \"{level}\" is not supported on this CPU"
            )));
        }
    }
    Ok(())
}

fn validate_ring(cfg: &RawConfigFile) -> Result<()> {
    Geometry::new(cfg.ring.capacity, cfg.ring.slot_size)
        .map_err(|e| config_error(format!("[ring]: {e}")))?;
    if cfg.ring.path.as_os_str().is_empty() {
        return Err(config_error("[ring].path must not be empty"));
    }
    Ok(())
}

fn validate_pipeline(cfg: &RawConfigFile) -> Result<()> {
    if cfg.pipeline.stats_interval_secs == 0 {
        return Err(config_error(
            "[pipeline].stats_interval_secs must be >= 1 (got 0)",
        ));
    }
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.paths.is_empty() {
        return Err(config_error("[watch].paths must list at least one path"));
    }
    PathFilter::new(&cfg.watch.include, &cfg.watch.exclude)
        .map_err(|e| config_error(format!("[watch]: {e:#}")))?;
    Ok(())
}
