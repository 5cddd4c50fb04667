// src/config/mod.rs

//! Configuration loading and validation for changefeed.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and convert it into the option structs the core consumes
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    default_ring_path, ConfigFile, HashSection, OverflowPolicyKind, PipelineSection, RawConfigFile,
    RingSection, WatchSection,
};
