// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks block size, ring geometry, intervals and glob syntax.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load `path` if given. Otherwise load [`default_config_path`] when it
/// exists, falling back to built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = path {
        return load_and_validate(path);
    }
    let default_path = default_config_path();
    if default_path.is_file() {
        debug!(path = %default_path.display(), "using config from working directory");
        return load_and_validate(default_path);
    }
    debug!("no config file; using defaults");
    ConfigFile::try_from(RawConfigFile::default())
}

/// `changefeed.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("changefeed.toml")
}
