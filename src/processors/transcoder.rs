// src/processors/transcoder.rs
use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use crate::config::TranscoderConfig;
use crate::core::error::TranscodeError;

/// Turns one raw segment into one browser-playable fragment. Blocking.
pub trait Transcoder: Send {
    fn name(&self) -> &str;
    fn transcode(&mut self, raw: &Path, output: &Path) -> Result<(), TranscodeError>;
}

/// Remuxes raw H.264 into fragmented MP4 without re-encoding, so a
/// MediaSource player can append the fragments one after another.
pub struct FfmpegTranscoder {
    program: String,
    framerate: u32,
}

impl FfmpegTranscoder {
    pub fn new(cfg: &TranscoderConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            framerate: cfg.framerate,
        }
    }

    fn args(&self, raw: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-framerate".to_string(),
            self.framerate.to_string(),
            "-i".to_string(),
            raw.to_string_lossy().into_owned(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            "-movflags".to_string(),
            "frag_keyframe+empty_moov+default_base_moof".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        &self.program
    }

    fn transcode(&mut self, raw: &Path, output: &Path) -> Result<(), TranscodeError> {
        let args = self.args(raw, output);
        debug!("[transcode] {} {}", self.program, args.join(" "));

        let out = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !out.status.success() {
            return Err(TranscodeError::Failed {
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        if !output.is_file() {
            return Err(TranscodeError::MissingOutput {
                path: output.display().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_copy_arguments() {
        let t = FfmpegTranscoder::new(&TranscoderConfig::default());
        let args = t.args(Path::new("video/raw_4.h264"), Path::new("video/segment_4.mp4"));

        assert_eq!(args[args.len() - 1], "video/segment_4.mp4");
        let pos = args.iter().position(|a| a == "-i").expect("-i");
        assert_eq!(args[pos + 1], "video/raw_4.h264");
        let pos = args.iter().position(|a| a == "-c:v").expect("-c:v");
        assert_eq!(args[pos + 1], "copy");
        assert!(args.iter().any(|a| a.contains("empty_moov")));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let mut t = FfmpegTranscoder::new(&TranscoderConfig {
            program: "definitely-not-installed-transcoder".to_string(),
            framerate: 30,
        });
        let err = t
            .transcode(Path::new("raw_0.h264"), Path::new("segment_0.mp4"))
            .expect_err("no such program");
        assert!(matches!(err, TranscodeError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_failure() {
        let mut t = FfmpegTranscoder::new(&TranscoderConfig {
            program: "false".to_string(),
            framerate: 30,
        });
        let err = t
            .transcode(Path::new("raw_0.h264"), Path::new("segment_0.mp4"))
            .expect_err("false exits 1");
        assert!(matches!(err, TranscodeError::Failed { .. }));
    }
}
