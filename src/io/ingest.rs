// src/io/ingest.rs
//! Server ingest stage: accepts exactly one capture-device connection and
//! turns the framed byte stream into `raw_<index>.h264` files.
//!
//! A dropped connection closes only the raw channel. Transcode drains what
//! was already received and then closes the fragment and deletion channels,
//! the publisher closes the broadcaster, so every shared channel ends up
//! closed without losing segments that had been fully received. Shutdown
//! (Ctrl+C, fatal errors) still closes everything at once.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::core::channel::ClosableChannel;
use crate::core::error::WireError;
use crate::core::logging::{ComponentLogger, LogContext};
use crate::core::shutdown::{ConnectionCloser, ShutdownSignal};
use crate::io::wire;
use crate::types::{Segment, SegmentKind};

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// How the ingest stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestExit {
    /// Shutdown fired before a client connected.
    NoConnection,
    /// The peer went away; the raw channel was closed so downstream stages
    /// finish what was already received and close in turn.
    DroppedConnection { segments: u64 },
    /// Another stage closed the pipeline while we were receiving.
    PipelineClosed { segments: u64 },
}

pub struct IngestStage {
    media_dir: PathBuf,
    raw: ClosableChannel<Segment>,
    shutdown: ShutdownSignal,
    listen: String,
}

impl ComponentLogger for IngestStage {
    fn log_context(&self) -> LogContext {
        LogContext::new("ingest", &self.listen)
    }
}

impl IngestStage {
    pub fn new(media_dir: &Path, raw: ClosableChannel<Segment>, shutdown: ShutdownSignal) -> Self {
        Self {
            media_dir: media_dir.to_path_buf(),
            raw,
            shutdown,
            listen: String::new(),
        }
    }

    pub fn run(mut self, listener: TcpListener) -> anyhow::Result<IngestExit> {
        self.listen = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();

        self.info("waiting for connection with capture device");
        let Some((stream, peer)) = self.accept(&listener)? else {
            self.info("shutdown before any connection");
            return Ok(IngestExit::NoConnection);
        };
        drop(listener);
        self.info(&format!("connection from {} established, serving", peer));

        // Blockierendes read soll bei Shutdown zurückkehren
        self.shutdown
            .register(Arc::new(ConnectionCloser::new(&stream)?));

        let exit = self.receive(stream, &peer);
        match &exit {
            Ok(IngestExit::DroppedConnection { segments }) => {
                self.warn(&format!("lost {} after {} segments", peer, segments));
                self.raw.close();
            }
            Ok(_) => {}
            Err(e) => {
                self.error(&format!("fatal: {:#}", e));
                self.shutdown.trigger("ingest failed");
            }
        }
        exit
    }

    fn accept(&self, listener: &TcpListener) -> anyhow::Result<Option<(TcpStream, String)>> {
        listener.set_nonblocking(true)?;
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(false)?;
                    return Ok(Some((stream, addr.to_string())));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if self.shutdown.wait_timeout(ACCEPT_POLL) || self.raw.is_closed() {
                        return Ok(None);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("accepting capture connection"),
            }
        }
    }

    fn receive(&self, mut stream: TcpStream, peer: &str) -> anyhow::Result<IngestExit> {
        fs::create_dir_all(&self.media_dir)
            .with_context(|| format!("creating {}", self.media_dir.display()))?;

        let mut index = 0u64;
        loop {
            let path = self.media_dir.join(SegmentKind::Raw.file_name(index));
            let size = match self.receive_file(&mut stream, peer, &path) {
                Ok(size) => size,
                Err(e) => {
                    let _ = fs::remove_file(&path);
                    return match e.downcast_ref::<WireError>() {
                        Some(w) if is_disconnect(w) => {
                            self.debug(&format!("{}", w));
                            Ok(IngestExit::DroppedConnection { segments: index })
                        }
                        _ => Err(e),
                    };
                }
            };

            let segment = Segment::new(index, SegmentKind::Raw, path.clone()).with_size(size);
            if !self.raw.put(segment) {
                self.info("pipeline closed, discarding received segment");
                let _ = fs::remove_file(&path);
                let _ = stream.shutdown(std::net::Shutdown::Both);
                return Ok(IngestExit::PipelineClosed { segments: index });
            }

            self.info_segment(index, &format!("received {} ({} bytes)", path.display(), size));
            index += 1;
        }
    }

    fn receive_file(&self, stream: &mut TcpStream, peer: &str, path: &Path) -> anyhow::Result<u64> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut sink = BufWriter::new(file);
        let size = wire::read_frame(stream, peer, &mut sink)?;
        sink.into_inner()
            .map_err(|e| e.into_error())
            .and_then(|f| f.sync_data().map(|_| f))
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(size)
    }
}

/// Protocol violations cannot be told apart from a broken peer; both end the
/// session the same way.
fn is_disconnect(e: &WireError) -> bool {
    matches!(
        e,
        WireError::DroppedConnection { .. } | WireError::InvalidHeader { .. }
    )
}
