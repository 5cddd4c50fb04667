// src/watch/mod.rs

//! File watching.
//!
//! This module is responsible for:
//! - Compiling `include` / `exclude` glob patterns.
//! - Wiring up a cross-platform filesystem watcher (`notify`) that feeds raw
//!   events into the pipeline.
//!
//! It does **not** hash or publish anything; that is the pipeline's job.

pub mod patterns;
pub mod watcher;

pub use patterns::{relative_str, PathFilter};
pub use watcher::{classify, spawn_watcher, WatcherHandle};
