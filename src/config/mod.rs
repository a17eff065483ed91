use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::core::error::ConfigError;

pub const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeFailurePolicy {
    /// Tear down the whole pipeline.
    #[default]
    Fatal,
    /// Drop the raw segment and keep going.
    Skip,
}

// ---------- Client ----------
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_address: String,
    pub segment_duration_ms: u64,
    pub connect_retry_ms: u64,
    pub raw_slots: u64,
    pub media_dir: PathBuf,
    pub camera_command: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:5000".to_string(),
            segment_duration_ms: 3000,
            connect_retry_ms: 500,
            raw_slots: 10,
            media_dir: PathBuf::from("video"),
            camera_command: [
                "libcamera-vid",
                "-t",
                "0",
                "--width",
                "1280",
                "--height",
                "720",
                "--codec",
                "h264",
                "--inline",
                "-o",
                OUTPUT_PLACEHOLDER,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl ClientConfig {
    pub fn segment_duration(&self) -> Duration {
        Duration::from_millis(self.segment_duration_ms)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.server_address
            .parse::<SocketAddr>()
            .with_context(|| format!("client.server_address '{}'", self.server_address))?;
        if self.segment_duration_ms == 0 {
            bail!("client.segment_duration_ms must be > 0");
        }
        if self.connect_retry_ms == 0 {
            bail!("client.connect_retry_ms must be > 0");
        }
        if self.raw_slots == 0 {
            bail!("client.raw_slots must be > 0");
        }
        if self.camera_command.is_empty() {
            bail!("client.camera_command must not be empty");
        }
        if !self.camera_command.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER)) {
            bail!("client.camera_command must contain {}", OUTPUT_PLACEHOLDER);
        }
        Ok(())
    }
}

// ---------- Transcoder ----------
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub program: String,
    pub framerate: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            framerate: 30,
        }
    }
}

// ---------- Server ----------
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub media_dir: PathBuf,
    pub retention_window: usize,
    pub fragment_wrap: u64,
    pub http_address: String,
    pub on_transcode_failure: TranscodeFailurePolicy,
    pub transcoder: TranscoderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:5000".to_string(),
            media_dir: PathBuf::from("video"),
            retention_window: 10,
            fragment_wrap: 100,
            http_address: "0.0.0.0:5001".to_string(),
            on_transcode_failure: TranscodeFailurePolicy::Fatal,
            transcoder: TranscoderConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.listen_address
            .parse::<SocketAddr>()
            .with_context(|| format!("server.listen_address '{}'", self.listen_address))?;
        self.http_address
            .parse::<SocketAddr>()
            .with_context(|| format!("server.http_address '{}'", self.http_address))?;
        if self.retention_window == 0 {
            bail!("server.retention_window must be > 0");
        }
        // Sonst überschreiben sich Dateinamen noch im Fenster
        if self.fragment_wrap <= self.retention_window as u64 {
            bail!(
                "server.fragment_wrap ({}) must exceed server.retention_window ({})",
                self.fragment_wrap,
                self.retention_window
            );
        }
        if self.transcoder.program.trim().is_empty() {
            bail!("server.transcoder.program must not be empty");
        }
        if self.transcoder.framerate == 0 {
            bail!("server.transcoder.framerate must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::with_context(format!("reading config {}", path), e))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::with_context("invalid toml", e))?;
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.client.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg.server.retention_window, 10);
        assert_eq!(cfg.server.fragment_wrap, 100);
        assert_eq!(cfg.client.raw_slots, 10);
        assert_eq!(cfg.client.connect_retry(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let cfg = Config::from_toml(
            r#"
            [client]
            server_address = "192.168.0.177:5000"
            segment_duration_ms = 1500

            [server]
            retention_window = 5
            on_transcode_failure = "skip"
            "#,
        )
        .expect("parse");

        assert_eq!(cfg.client.server_address, "192.168.0.177:5000");
        assert_eq!(cfg.client.segment_duration(), Duration::from_millis(1500));
        assert_eq!(cfg.server.retention_window, 5);
        assert_eq!(cfg.server.fragment_wrap, 100);
        assert_eq!(cfg.server.on_transcode_failure, TranscodeFailurePolicy::Skip);
        assert_eq!(cfg.server.transcoder.program, "ffmpeg");
    }

    #[test]
    fn test_wrap_must_exceed_window() {
        let err = Config::from_toml(
            r#"
            [server]
            retention_window = 10
            fragment_wrap = 10
            "#,
        )
        .expect_err("wrap == window");
        assert!(format!("{:#}", err).contains("fragment_wrap"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = Config::load("/nonexistent/pistream.toml").expect_err("missing");
        let config_err = err.downcast_ref::<ConfigError>().expect("config error");
        assert!(config_err.to_string().contains("/nonexistent/pistream.toml"));
    }

    #[test]
    fn test_rejects_bad_address() {
        let mut cfg = Config::default();
        cfg.client.server_address = "not-an-address".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_camera_command_needs_placeholder() {
        let mut cfg = Config::default();
        cfg.client.camera_command = vec!["raspivid".to_string(), "-o".to_string(), "out.h264".to_string()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let path = path.to_str().expect("utf8 path");

        let mut cfg = Config::default();
        cfg.server.retention_window = 4;
        cfg.save(path).expect("save");

        let loaded = Config::load(path).expect("load");
        assert_eq!(loaded.server.retention_window, 4);
    }
}
