use std::error::Error as StdError;
use std::process::ExitStatus;

use thiserror::Error;

pub type WireResult<T> = Result<T, WireError>;

#[derive(Debug, Error)]
pub enum WireError {
    /// The peer closed the connection (or the read failed) before the
    /// requested number of bytes arrived.
    #[error("dropped connection with {peer}: got {received} of {expected} bytes")]
    DroppedConnection {
        peer: String,
        expected: u64,
        received: u64,
    },
    #[error("invalid length header {header:?}")]
    InvalidHeader { header: String },
    #[error("payload of {len} bytes does not fit the length header")]
    PayloadTooLarge { len: u64 },
    #[error("wire i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    pub fn is_dropped_connection(&self) -> bool {
        matches!(self, WireError::DroppedConnection { .. })
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start transcoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transcoder exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("transcoder produced no output at {path}")]
    MissingOutput { path: String },
    #[error("{message}")]
    Message { message: String },
}

impl TranscodeError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ConfigError {
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_connection_message() {
        let err = WireError::DroppedConnection {
            peer: "10.0.0.2:5000".to_string(),
            expected: 15,
            received: 3,
        };
        assert!(err.is_dropped_connection());
        assert_eq!(
            err.to_string(),
            "dropped connection with 10.0.0.2:5000: got 3 of 15 bytes"
        );
    }

    #[test]
    fn test_config_error_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ConfigError::with_context("reading config.toml", io);
        assert_eq!(err.to_string(), "reading config.toml: missing");
        assert!(err.source().is_some());
    }
}
