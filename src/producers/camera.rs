// src/producers/camera.rs
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, bail};
use log::{debug, info, warn};

use crate::config::OUTPUT_PLACEHOLDER;

/// Recording device that writes raw segments to files. Construction of the
/// device counts as "camera initialized".
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;
    fn start_recording(&mut self, path: &Path) -> anyhow::Result<()>;
    /// Finishes the current file and continues recording into `path`.
    fn split_recording(&mut self, path: &Path) -> anyhow::Result<()>;
    fn stop_recording(&mut self) -> anyhow::Result<()>;
}

/// Runs an external recorder process per segment file. The configured argv
/// contains `{output}`, which is replaced by the target path.
pub struct CommandCamera {
    argv: Vec<String>,
    child: Option<Child>,
    current: Option<PathBuf>,
}

impl CommandCamera {
    pub fn new(argv: Vec<String>) -> anyhow::Result<Self> {
        if argv.is_empty() {
            bail!("camera command must not be empty");
        }
        info!("[camera] using recorder '{}'", argv[0]);
        Ok(Self {
            argv,
            child: None,
            current: None,
        })
    }

    fn command_for(&self, path: &Path) -> Command {
        let target = path.to_string_lossy();
        let args: Vec<String> = self
            .argv
            .iter()
            .map(|a| a.replace(OUTPUT_PLACEHOLDER, &target))
            .collect();

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    fn spawn(&mut self, path: &Path) -> anyhow::Result<()> {
        let child = self
            .command_for(path)
            .spawn()
            .with_context(|| format!("starting recorder '{}'", self.argv[0]))?;
        debug!("[camera] recording {} (pid {})", path.display(), child.id());
        self.child = Some(child);
        self.current = Some(path.to_path_buf());
        Ok(())
    }

    fn finish_current(&mut self) -> anyhow::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(status) = child.try_wait()? {
            // Recorder hat sich selbst beendet: die Datei ist vermutlich unvollständig
            warn!(
                "[camera] recorder exited early with {} while writing {:?}",
                status, self.current
            );
            return Ok(());
        }

        child.kill().context("stopping recorder")?;
        child.wait().context("waiting for recorder")?;
        Ok(())
    }
}

impl CaptureDevice for CommandCamera {
    fn name(&self) -> &str {
        &self.argv[0]
    }

    fn start_recording(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.child.is_some() {
            bail!("recording already started");
        }
        self.spawn(path)
    }

    fn split_recording(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.child.is_none() {
            bail!("split without active recording");
        }
        self.finish_current()?;
        self.spawn(path)
    }

    fn stop_recording(&mut self) -> anyhow::Result<()> {
        self.finish_current()?;
        self.current = None;
        Ok(())
    }
}

impl Drop for CommandCamera {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_substituted() {
        let camera = CommandCamera::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo hi > {output}".to_string(),
        ])
        .expect("camera");
        let cmd = camera.command_for(Path::new("/tmp/raw_0.h264"));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-c", "echo hi > /tmp/raw_0.h264"]);
    }

    #[test]
    fn test_split_rotates_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut camera = CommandCamera::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf data > {output}; sleep 30".to_string(),
        ])
        .expect("camera");

        let first = dir.path().join("raw_0.h264");
        let second = dir.path().join("raw_1.h264");
        camera.start_recording(&first).expect("start");
        std::thread::sleep(std::time::Duration::from_millis(200));
        camera.split_recording(&second).expect("split");
        std::thread::sleep(std::time::Duration::from_millis(200));
        camera.stop_recording().expect("stop");

        assert_eq!(std::fs::read(&first).expect("first"), b"data");
        assert_eq!(std::fs::read(&second).expect("second"), b"data");
    }

    #[test]
    fn test_split_before_start_fails() {
        let mut camera = CommandCamera::new(vec!["true".to_string(), "{output}".to_string()])
            .expect("camera");
        assert!(camera.split_recording(Path::new("/tmp/x")).is_err());
    }
}
