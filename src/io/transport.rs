// src/io/transport.rs
//! Client transport stage: connect (fixed-interval retry), handshake with the
//! capture stage, then frame every raw segment onto the socket.

use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use anyhow::{Context, anyhow};
use log::{debug, info, warn};

use crate::app::handshake::wait_for_token;
use crate::config::ClientConfig;
use crate::core::channel::ClosableChannel;
use crate::core::shutdown::ShutdownSignal;
use crate::io::wire;
use crate::types::{ClientItem, ControlToken};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TransportStage {
    server: SocketAddr,
    retry: Duration,
    channel: ClosableChannel<ClientItem>,
    shutdown: ShutdownSignal,
    sent: u64,
}

impl TransportStage {
    pub fn new(
        cfg: &ClientConfig,
        channel: ClosableChannel<ClientItem>,
        shutdown: ShutdownSignal,
    ) -> anyhow::Result<Self> {
        let server = cfg
            .server_address
            .parse()
            .with_context(|| format!("server address '{}'", cfg.server_address))?;
        Ok(Self {
            server,
            retry: cfg.connect_retry(),
            channel,
            shutdown,
            sent: 0,
        })
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        let Some(mut stream) = self.connect() else {
            info!("[transport] shutdown while connecting");
            return Ok(());
        };

        let announced = self
            .channel
            .put(ClientItem::Token(ControlToken::ConnectionEstablished));
        if !announced || !wait_for_token(&self.channel, ControlToken::CameraInitialized) {
            close_gracefully(&mut stream);
            return Ok(());
        }
        info!("[transport] camera ready, sending segments to {}", self.server);

        let channel = self.channel.clone();
        for item in &channel {
            let segment = match item {
                ClientItem::Segment(segment) => segment,
                ClientItem::Token(token) => {
                    debug!("[transport] ignoring late token {:?}", token);
                    continue;
                }
            };

            match wire::send_file(&mut stream, &segment.path) {
                Ok(len) => {
                    self.sent += 1;
                    info!(
                        "[transport] sent segment {} ({}, {} bytes)",
                        segment.index,
                        segment.path.display(),
                        len
                    );
                }
                Err(e) => {
                    warn!("[transport] lost connection with the server: {}", e);
                    self.shutdown.trigger("transport lost connection");
                    return Err(anyhow!(e).context(format!(
                        "sending segment {} to {}",
                        segment.index, self.server
                    )));
                }
            }
        }

        info!("[transport] channel closed after {} segments", self.sent);
        close_gracefully(&mut stream);
        Ok(())
    }

    /// Retries every `retry` until connected. `None` once shutdown fires.
    fn connect(&self) -> Option<TcpStream> {
        info!("[transport] connecting to {} …", self.server);
        let mut attempts = 0u64;
        loop {
            if self.shutdown.is_triggered() || self.channel.is_closed() {
                return None;
            }
            attempts += 1;
            match TcpStream::connect_timeout(&self.server, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    info!(
                        "[transport] connected to {} after {} attempt(s)",
                        self.server, attempts
                    );
                    return Some(stream);
                }
                Err(e) => {
                    debug!("[transport] connect attempt {} failed: {}", attempts, e);
                }
            }
            if self.shutdown.wait_timeout(self.retry) {
                return None;
            }
        }
    }
}

/// Half-close, then drain until the server closes its side.
fn close_gracefully(stream: &mut TcpStream) {
    if stream.shutdown(Shutdown::Write).is_err() {
        return;
    }
    let _ = stream.set_read_timeout(Some(DRAIN_TIMEOUT));
    let mut sink = [0u8; 1024];
    while let Ok(n) = stream.read(&mut sink) {
        if n == 0 {
            break;
        }
    }
}
