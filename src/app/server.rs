// src/app/server.rs
//! Server pipeline: ingest -> transcode -> {cleanup, publisher}, plus the
//! HTTP surface for live viewers.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use anyhow::Context;
use log::{error, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::app::{join_stage, spawn_stage};
use crate::config::ServerConfig;
use crate::core::broadcast::Broadcaster;
use crate::core::channel::ClosableChannel;
use crate::core::shutdown::ShutdownSignal;
use crate::io::ingest::{IngestExit, IngestStage};
use crate::processors::transcode::{TranscodeChannels, TranscodeStage, TranscodeStats};
use crate::processors::transcoder::Transcoder;
use crate::storage::cleanup::{self, CleanupStats, PendingDeletions};
use crate::types::FragmentReady;
use crate::web::{self, WebState};

/// What every server stage reported on exit.
#[derive(Debug, Clone)]
pub struct ServerReport {
    pub ingest: IngestExit,
    pub transcode: TranscodeStats,
    pub cleanup: CleanupStats,
    pub published: u64,
}

/// Bound sockets and shared broadcaster. Binding is separate from running
/// so callers (and tests) can learn the actual addresses first.
pub struct ServerPipeline {
    cfg: ServerConfig,
    ingest_listener: TcpListener,
    http_listener: TcpListener,
    broadcaster: Arc<Broadcaster<FragmentReady>>,
}

impl ServerPipeline {
    /// Clears stale media from a previous run, then binds both listeners.
    pub fn bind(cfg: &ServerConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        cleanup::sweep(&cfg.media_dir)
            .with_context(|| format!("sweeping {}", cfg.media_dir.display()))?;

        let ingest_listener = TcpListener::bind(&cfg.listen_address)
            .with_context(|| format!("binding {}", cfg.listen_address))?;
        let http_listener = TcpListener::bind(&cfg.http_address)
            .with_context(|| format!("binding {}", cfg.http_address))?;

        Ok(Self {
            cfg: cfg.clone(),
            ingest_listener,
            http_listener,
            broadcaster: Broadcaster::new("live"),
        })
    }

    pub fn ingest_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.ingest_listener.local_addr()?)
    }

    pub fn http_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.http_listener.local_addr()?)
    }

    /// In-process viewer; sees the same notifications as SSE clients.
    pub fn subscribe(&self) -> UnboundedReceiver<FragmentReady> {
        self.broadcaster.subscribe()
    }

    /// Runs until the capture connection is gone and everything already
    /// received has been published, or until `shutdown` fires.
    pub fn run<T>(self, transcoder: T, shutdown: ShutdownSignal) -> anyhow::Result<ServerReport>
    where
        T: Transcoder + 'static,
    {
        let Self {
            cfg,
            ingest_listener,
            http_listener,
            broadcaster,
        } = self;

        let channels = TranscodeChannels {
            raw: ClosableChannel::new("raw"),
            fragments: ClosableChannel::new("fragments"),
            deletions: ClosableChannel::new("deletions"),
            pending: PendingDeletions::new(),
        };
        shutdown.register(Arc::new(channels.raw.clone()));
        shutdown.register(Arc::new(channels.fragments.clone()));
        shutdown.register(Arc::new(channels.deletions.clone()));
        shutdown.register(broadcaster.clone());

        let web_handle = {
            let state = WebState {
                broadcaster: broadcaster.clone(),
                media_dir: cfg.media_dir.clone(),
            };
            let shutdown = shutdown.clone();
            spawn_stage("web", move || {
                let result = web::serve_blocking(state, http_listener, shutdown.clone());
                if let Err(e) = &result {
                    error!("[web] fatal: {:#}", e);
                    shutdown.trigger("web server failed");
                }
                result
            })?
        };

        let ingest = IngestStage::new(&cfg.media_dir, channels.raw.clone(), shutdown.clone());
        let ingest_handle = spawn_stage("ingest", move || ingest.run(ingest_listener))?;

        let transcode = TranscodeStage::new(&cfg, transcoder, channels.clone(), shutdown.clone());
        let transcode_handle = spawn_stage("transcode", move || transcode.run())?;

        let deletions = channels.deletions.clone();
        let pending = channels.pending.clone();
        let cleanup_handle =
            spawn_stage("cleanup", move || cleanup::run_cleanup(deletions, pending))?;

        let fragments = channels.fragments.clone();
        let publisher_broadcaster = broadcaster.clone();
        let publisher_handle = spawn_stage("publisher", move || {
            web::publisher::run_publisher(fragments, publisher_broadcaster)
        })?;

        let ingest = join_stage("ingest", ingest_handle).and_then(|r| r);
        let transcode = join_stage("transcode", transcode_handle).and_then(|r| r);
        let cleanup = join_stage("cleanup", cleanup_handle);
        let published = join_stage("publisher", publisher_handle);

        // Pipeline leer: jetzt darf auch HTTP gehen
        shutdown.trigger("pipeline finished");
        let web = join_stage("web", web_handle).and_then(|r| r);
        if let Err(e) = &web {
            warn!("[server] web server: {:#}", e);
        }

        let report = ServerReport {
            ingest: ingest?,
            transcode: transcode?,
            cleanup: cleanup?,
            published: published?,
        };
        web?;

        info!(
            "[server] finished: {:?}, transcoded={}, published={}",
            report.ingest, report.transcode.transcoded, report.published
        );
        Ok(report)
    }
}
