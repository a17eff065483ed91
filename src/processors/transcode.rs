// src/processors/transcode.rs
//! Transcode & retention stage. One raw segment at a time, in arrival order:
//! transcode, publish the fragment, hand the raw file to cleanup, and evict
//! the oldest fragment once the retention window is full.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::config::{ServerConfig, TranscodeFailurePolicy};
use crate::core::channel::ClosableChannel;
use crate::core::logging::{ComponentLogger, LogContext};
use crate::core::shutdown::ShutdownSignal;
use crate::processors::transcoder::Transcoder;
use crate::storage::cleanup::PendingDeletions;
use crate::storage::retention::RetentionWindow;
use crate::types::{Segment, SegmentKind, SlotAllocator};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TranscodeStats {
    pub transcoded: u64,
    pub skipped: u64,
    pub evicted: u64,
}

/// Channels the stage reads from and writes to.
#[derive(Clone)]
pub struct TranscodeChannels {
    pub raw: ClosableChannel<Segment>,
    pub fragments: ClosableChannel<Segment>,
    pub deletions: ClosableChannel<PathBuf>,
    /// Shared with cleanup; lets a wrapped fragment name be reused safely.
    pub pending: PendingDeletions,
}

pub struct TranscodeStage<T: Transcoder> {
    media_dir: PathBuf,
    transcoder: T,
    window: RetentionWindow,
    names: SlotAllocator,
    policy: TranscodeFailurePolicy,
    channels: TranscodeChannels,
    shutdown: ShutdownSignal,
    stats: TranscodeStats,
}

impl<T: Transcoder> ComponentLogger for TranscodeStage<T> {
    fn log_context(&self) -> LogContext {
        LogContext::new("transcode", self.transcoder.name())
    }
}

impl<T: Transcoder> TranscodeStage<T> {
    pub fn new(
        cfg: &ServerConfig,
        transcoder: T,
        channels: TranscodeChannels,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            media_dir: cfg.media_dir.clone(),
            transcoder,
            window: RetentionWindow::new(cfg.retention_window),
            names: SlotAllocator::new(cfg.fragment_wrap),
            policy: cfg.on_transcode_failure,
            channels,
            shutdown,
            stats: TranscodeStats::default(),
        }
    }

    /// Runs until the raw channel is drained and closed. Closes the fragment
    /// and deletion channels on the way out.
    pub fn run(mut self) -> anyhow::Result<TranscodeStats> {
        self.info(&format!(
            "started (window={} wrap={})",
            self.window.capacity(),
            self.names.modulus()
        ));
        let result = self.process_all();

        if let Err(e) = &result {
            self.error(&format!("fatal: {:#}", e));
            self.shutdown.trigger("transcode failed");
        }
        self.channels.fragments.close();
        self.channels.deletions.close();

        self.info(&format!(
            "stopped (transcoded={} skipped={} evicted={})",
            self.stats.transcoded, self.stats.skipped, self.stats.evicted
        ));
        result.map(|_| self.stats)
    }

    fn process_all(&mut self) -> anyhow::Result<()> {
        let raw = self.channels.raw.clone();
        for segment in &raw {
            if self.shutdown.is_triggered() {
                self.info("shutdown requested, leaving remaining raw segments");
                break;
            }
            if !self.process(segment)? {
                self.info("fragment channel closed, stopping");
                break;
            }
        }
        Ok(())
    }

    /// `Ok(false)` once the fragment channel no longer takes items.
    fn process(&mut self, raw: Segment) -> anyhow::Result<bool> {
        let output = self.names.next_path(&self.media_dir, SegmentKind::Fragment);
        if self.channels.pending.reclaim(&output) {
            self.debug(&format!("reclaimed {} ahead of cleanup", output.display()));
        }

        if let Err(e) = self.transcoder.transcode(&raw.path, &output) {
            return match self.policy {
                TranscodeFailurePolicy::Fatal => Err(anyhow!(e).context(format!(
                    "transcoding segment {} ({})",
                    raw.index,
                    raw.path.display()
                ))),
                TranscodeFailurePolicy::Skip => {
                    self.warn(&format!(
                        "skipping segment {} ({}): {}",
                        raw.index,
                        raw.path.display(),
                        e
                    ));
                    self.stats.skipped += 1;
                    self.schedule_deletion(raw.path);
                    let _ = fs::remove_file(&output);
                    Ok(true)
                }
            };
        }

        let mut fragment = Segment::new(raw.index, SegmentKind::Fragment, output);
        if let Some(size) = file_size(&fragment.path) {
            fragment = fragment.with_size(size);
        }
        self.stats.transcoded += 1;
        self.info_segment(
            raw.index,
            &format!("{} -> {}", raw.path.display(), fragment.path.display()),
        );

        if !self.channels.fragments.put(fragment.clone()) {
            return Ok(false);
        }
        // Rohdatei wird nach erfolgreichem Transcode nicht mehr gebraucht
        self.schedule_deletion(raw.path);

        if let Some(evicted) = self.window.push(fragment) {
            self.stats.evicted += 1;
            self.debug(&format!("retention evicts {}", evicted.path.display()));
            self.schedule_deletion(evicted.path);
        }
        Ok(true)
    }

    fn schedule_deletion(&self, path: PathBuf) {
        if !self.channels.pending.schedule(&self.channels.deletions, path.clone()) {
            self.warn(&format!(
                "cleanup closed, {} left for the startup sweep",
                path.display()
            ));
        }
    }

    pub fn window(&self) -> &RetentionWindow {
        &self.window
    }
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).map(|m| m.len()).ok()
}
