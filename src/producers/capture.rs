// src/producers/capture.rs
//! Client capture stage: waits until the transport is connected, opens the
//! camera, then rotates the recording target every `segment_duration` and
//! pushes each completed raw file to the client channel.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info};

use crate::app::handshake::wait_for_token;
use crate::config::ClientConfig;
use crate::core::channel::ClosableChannel;
use crate::core::shutdown::ShutdownSignal;
use crate::core::timestamp::format_utc_ns;
use crate::producers::camera::CaptureDevice;
use crate::types::{ClientItem, ControlToken, Segment, SegmentKind, SlotAllocator};

pub struct CaptureStage {
    media_dir: PathBuf,
    segment_duration: Duration,
    slots: SlotAllocator,
    channel: ClosableChannel<ClientItem>,
    shutdown: ShutdownSignal,
}

impl CaptureStage {
    pub fn new(
        cfg: &ClientConfig,
        channel: ClosableChannel<ClientItem>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            media_dir: cfg.media_dir.clone(),
            segment_duration: cfg.segment_duration(),
            slots: SlotAllocator::new(cfg.raw_slots),
            channel,
            shutdown,
        }
    }

    /// `open_device` is only called once the connection is established.
    pub fn run<D, F>(mut self, open_device: F) -> anyhow::Result<()>
    where
        D: CaptureDevice,
        F: FnOnce() -> anyhow::Result<D>,
    {
        if !wait_for_token(&self.channel, ControlToken::ConnectionEstablished) {
            info!("[capture] channel closed before connection was established");
            return Ok(());
        }

        let mut device = match open_device() {
            Ok(device) => device,
            Err(e) => {
                error!("[capture] camera init failed: {:#}", e);
                self.shutdown.trigger("camera init failed");
                return Err(e);
            }
        };
        info!("[capture] camera '{}' initialized", device.name());
        if !self
            .channel
            .put(ClientItem::Token(ControlToken::CameraInitialized))
        {
            info!("[capture] channel closed before recording started");
            return Ok(());
        }

        let result = self.record(&mut device);
        if let Err(e) = device.stop_recording() {
            error!("[capture] stop failed: {:#}", e);
        }

        if let Err(e) = &result {
            error!("[capture] fatal: {:#}", e);
            self.shutdown.trigger("capture failed");
        }
        info!("[capture] stopped");
        result
    }

    fn record<D: CaptureDevice>(&mut self, device: &mut D) -> anyhow::Result<()> {
        fs::create_dir_all(&self.media_dir)
            .with_context(|| format!("creating {}", self.media_dir.display()))?;

        let mut index = 0u64;
        let first = self.slots.next_path(&self.media_dir, SegmentKind::Raw);
        device.start_recording(&first)?;
        let mut current = Segment::new(index, SegmentKind::Raw, first);

        loop {
            if self.shutdown.wait_timeout(self.segment_duration) || self.channel.is_closed() {
                break;
            }

            let next = self.slots.next_path(&self.media_dir, SegmentKind::Raw);
            device.split_recording(&next)?;

            if self.channel.is_closed() {
                // andere Stage hat das Ende angefordert
                break;
            }

            let size = fs::metadata(&current.path).map(|m| m.len()).ok();
            debug!(
                "[capture] segment {} complete: {} ({:?} bytes, started {})",
                index,
                current.path.display(),
                size,
                format_utc_ns(current.utc_ns)
            );
            let done = match size {
                Some(size) => current.with_size(size),
                None => current,
            };
            if !self.channel.put(ClientItem::Segment(done)) {
                break;
            }

            index += 1;
            current = Segment::new(index, SegmentKind::Raw, next);
        }

        Ok(())
    }
}
