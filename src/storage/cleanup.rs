// src/storage/cleanup.rs
//! Deletes files handed over by the transcode stage. Before the pipeline
//! starts, `sweep` clears leftovers of a previous run.
//!
//! Fragment names wrap, so a name can be written again while its earlier
//! deletion is still queued. Every scheduled path is recorded in
//! [`PendingDeletions`]; cleanup only deletes a path that is still pending,
//! and the writer reclaims a pending name (deleting it itself) before
//! reusing it. Both happen under the same lock.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::core::channel::ClosableChannel;
use crate::core::lock::lock_mutex;
use crate::types::SegmentKind;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed: u64,
    pub missing: u64,
    pub failed: u64,
    /// Queued paths whose name had already been reclaimed for a new file.
    pub superseded: u64,
}

/// Paths scheduled for deletion that cleanup has not handled yet.
#[derive(Clone, Default)]
pub struct PendingDeletions {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PendingDeletions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `path` and queues it. `false` if the deletion channel is
    /// already closed; the file is then left for the next startup sweep.
    pub fn schedule(&self, deletions: &ClosableChannel<PathBuf>, path: PathBuf) -> bool {
        let mut paths = lock_mutex(&self.paths, "pending.schedule");
        if !deletions.put(path.clone()) {
            return false;
        }
        paths.insert(path);
        true
    }

    /// Called before a name is written again. Deletes the old file right away
    /// if its deletion is still pending, so the queued entry becomes a no-op.
    /// Returns `true` if something was reclaimed.
    pub fn reclaim(&self, path: &Path) -> bool {
        let mut paths = lock_mutex(&self.paths, "pending.reclaim");
        if !paths.remove(path) {
            return false;
        }
        let mut stats = CleanupStats::default();
        remove(path, &mut stats);
        true
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        lock_mutex(&self.paths, "pending.is_pending").contains(path)
    }

    pub fn len(&self) -> usize {
        lock_mutex(&self.paths, "pending.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn complete(&self, path: &Path, stats: &mut CleanupStats) {
        let mut paths = lock_mutex(&self.paths, "pending.complete");
        if paths.remove(path) {
            remove(path, stats);
        } else {
            debug!("[cleanup] {} was reclaimed, keeping the new file", path.display());
            stats.superseded += 1;
        }
    }
}

/// Removes every raw/fragment file in `dir`. Other files are left alone.
/// A missing directory is created.
pub fn sweep(dir: &Path) -> anyhow::Result<CleanupStats> {
    fs::create_dir_all(dir)?;

    let mut stats = CleanupStats::default();
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if SegmentKind::parse_file_name(name).is_none() || !path.is_file() {
            continue;
        }
        remove(&path, &mut stats);
    }

    info!(
        "[cleanup] startup sweep of {}: removed {} stale file(s)",
        dir.display(),
        stats.removed
    );
    Ok(stats)
}

/// Drains `deletions` until the channel is closed.
pub fn run_cleanup(deletions: ClosableChannel<PathBuf>, pending: PendingDeletions) -> CleanupStats {
    let mut stats = CleanupStats::default();
    for path in &deletions {
        pending.complete(&path, &mut stats);
    }
    info!(
        "[cleanup] stopped (removed={} missing={} failed={} superseded={})",
        stats.removed, stats.missing, stats.failed, stats.superseded
    );
    stats
}

fn remove(path: &Path, stats: &mut CleanupStats) {
    match fs::remove_file(path) {
        Ok(_) => {
            debug!("[cleanup] removed {}", path.display());
            stats.removed += 1;
        }
        // schon weg: kein Fehler
        Err(e) if e.kind() == ErrorKind::NotFound => stats.missing += 1,
        Err(e) => {
            warn!("[cleanup] failed to remove {}: {}", path.display(), e);
            stats.failed += 1;
        }
    }
}
