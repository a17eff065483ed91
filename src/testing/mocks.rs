use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::core::error::TranscodeError;
use crate::core::timestamp::utc_ns_now;
use crate::processors::transcoder::Transcoder;
use crate::producers::camera::CaptureDevice;

/// Camera stand-in: every time a recording target is opened it writes a
/// complete file whose size is taken from `sizes` (cycled).
pub struct SimulatedCamera {
    sizes: Vec<usize>,
    written: usize,
    initialized_ns: u64,
    recordings: Arc<Mutex<Vec<PathBuf>>>,
    stopped: bool,
}

impl SimulatedCamera {
    pub fn new(sizes: Vec<usize>) -> Self {
        assert!(!sizes.is_empty(), "SimulatedCamera needs at least one size");
        Self {
            sizes,
            written: 0,
            initialized_ns: utc_ns_now(),
            recordings: Arc::new(Mutex::new(Vec::new())),
            stopped: false,
        }
    }

    pub fn initialized_ns(&self) -> u64 {
        self.initialized_ns
    }

    /// Shared log of every file the camera recorded into.
    pub fn recordings(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        self.recordings.clone()
    }

    fn record(&mut self, path: &Path) -> Result<()> {
        let size = self.sizes[self.written % self.sizes.len()];
        let fill = (self.written % 251) as u8;
        fs::write(path, vec![fill; size])?;
        self.written += 1;
        self.recordings
            .lock()
            .map_err(|_| anyhow::anyhow!("recordings lock poisoned"))?
            .push(path.to_path_buf());
        Ok(())
    }
}

impl CaptureDevice for SimulatedCamera {
    fn name(&self) -> &str {
        "simulated"
    }

    fn start_recording(&mut self, path: &Path) -> Result<()> {
        self.record(path)
    }

    fn split_recording(&mut self, path: &Path) -> Result<()> {
        if self.stopped {
            anyhow::bail!("split after stop");
        }
        self.record(path)
    }

    fn stop_recording(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }
}

/// "Transcodes" by copying the raw bytes to the output path.
#[derive(Clone, Default)]
pub struct CopyTranscoder {
    calls: Arc<AtomicU64>,
}

impl CopyTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Transcoder for CopyTranscoder {
    fn name(&self) -> &str {
        "copy"
    }

    fn transcode(&mut self, raw: &Path, output: &Path) -> Result<(), TranscodeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        fs::copy(raw, output)
            .map(|_| ())
            .map_err(|e| TranscodeError::message(format!("copy {}: {}", raw.display(), e)))
    }
}

/// Always fails, as a broken transcoder binary would.
pub struct FailingTranscoder;

impl Transcoder for FailingTranscoder {
    fn name(&self) -> &str {
        "failing"
    }

    fn transcode(&mut self, raw: &Path, _output: &Path) -> Result<(), TranscodeError> {
        Err(TranscodeError::message(format!(
            "cannot transcode {}",
            raw.display()
        )))
    }
}
