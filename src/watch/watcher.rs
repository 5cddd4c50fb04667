// src/watch/watcher.rs

//! Reference event source built on `notify`.
//!
//! Platform backends are external collaborators of the core; this adapter is
//! the one the daemon ships with. It translates notify events into
//! [`PipelineHandle::on_raw_event`] calls straight from notify's callback
//! thread.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, trace, warn};

use crate::clock::unix_time_ns;
use crate::ipc::EventKind;
use crate::pipeline::PipelineHandle;
use crate::watch::patterns::PathFilter;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("roots", &self.roots)
            .finish()
    }
}

impl WatcherHandle {
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Map a notify event kind to ours. `None` for events that carry no change
/// (pure access).
pub fn classify(kind: &notify::EventKind) -> Option<EventKind> {
    use notify::EventKind as N;
    match kind {
        N::Create(_) => Some(EventKind::Created),
        N::Modify(ModifyKind::Name(_)) => Some(EventKind::Moved),
        N::Modify(_) => Some(EventKind::Modified),
        N::Remove(_) => Some(EventKind::Deleted),
        N::Any => Some(EventKind::Modified),
        N::Access(_) | N::Other => None,
    }
}

fn is_directory_event(kind: &notify::EventKind, path: &Path) -> bool {
    use notify::EventKind as N;
    match kind {
        N::Create(CreateKind::Folder) | N::Remove(RemoveKind::Folder) => true,
        N::Create(CreateKind::File) | N::Remove(RemoveKind::File) => false,
        // Removed paths cannot be inspected any more.
        N::Remove(_) => false,
        _ => path.is_dir(),
    }
}

/// Watch `roots` and feed every matching change into `pipeline`.
///
/// Roots are canonicalized once so event paths can be matched against the
/// include/exclude globs relative to them.
pub fn spawn_watcher(
    roots: &[PathBuf],
    recursive: bool,
    filter: PathFilter,
    pipeline: PipelineHandle,
) -> Result<WatcherHandle> {
    let roots: Vec<PathBuf> = roots
        .iter()
        .map(|root| root.canonicalize().unwrap_or_else(|_| root.clone()))
        .collect();

    let callback_roots = roots.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => forward(&event, &callback_roots, &filter, &pipeline),
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )
    .context("creating filesystem watcher")?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    for root in &roots {
        watcher
            .watch(root, mode)
            .with_context(|| format!("watching {}", root.display()))?;
        info!(root = %root.display(), recursive, "file watcher started");
    }

    Ok(WatcherHandle {
        _inner: watcher,
        roots,
    })
}

fn forward(event: &Event, roots: &[PathBuf], filter: &PathFilter, pipeline: &PipelineHandle) {
    let Some(kind) = classify(&event.kind) else {
        trace!(?event, "ignoring access event");
        return;
    };
    let timestamp_ns = unix_time_ns();

    for path in &event.paths {
        if !filter.matches_under(roots, path) {
            trace!(path = %path.display(), "filtered out");
            continue;
        }
        let is_directory = is_directory_event(&event.kind, path);
        debug!(path = %path.display(), %kind, is_directory, "raw event");
        if let Err(e) = pipeline.on_raw_event(path.clone(), kind, timestamp_ns, is_directory) {
            debug!(path = %path.display(), error = %e, "pipeline refused event");
        }
    }
}
