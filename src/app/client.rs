// src/app/client.rs
//! Client pipeline: capture + transport sharing one closable channel.

use std::sync::Arc;

use log::{error, info};

use crate::app::{join_stage, spawn_stage};
use crate::config::ClientConfig;
use crate::core::channel::ClosableChannel;
use crate::core::shutdown::ShutdownSignal;
use crate::io::transport::TransportStage;
use crate::producers::camera::CaptureDevice;
use crate::producers::capture::CaptureStage;
use crate::types::ClientItem;

/// Runs both client stages and returns once both have exited, no matter
/// which one triggered the stop. The first stage error is returned.
pub fn run_client<D, F>(cfg: &ClientConfig, shutdown: ShutdownSignal, open_device: F) -> anyhow::Result<()>
where
    D: CaptureDevice + 'static,
    F: FnOnce() -> anyhow::Result<D> + Send + 'static,
{
    let channel: ClosableChannel<ClientItem> = ClosableChannel::new("segments");
    shutdown.register(Arc::new(channel.clone()));

    let transport = TransportStage::new(cfg, channel.clone(), shutdown.clone())?;
    let capture = CaptureStage::new(cfg, channel, shutdown.clone());

    let stages = vec![
        ("transport", spawn_stage("transport", move || transport.run())?),
        ("capture", spawn_stage("capture", move || capture.run(open_device))?),
    ];

    let mut first_error = None;
    for (name, handle) in stages {
        let result = join_stage(name, handle).and_then(|r| r);
        if let Err(e) = result {
            error!("[client] {} failed: {:#}", name, e);
            first_error.get_or_insert(e);
        }
        // eine Stage ist fertig: die andere muss auch aufhören
        shutdown.trigger(&format!("{} finished", name));
    }

    info!("[client] all stages finished");
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
