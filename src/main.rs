// src/main.rs

use std::path::Path;

use anyhow::bail;
use log::{info, warn};

use pistream::config::Config;
use pistream::core::shutdown::ShutdownSignal;
use pistream::processors::transcoder::FfmpegTranscoder;
use pistream::producers::camera::CommandCamera;
use pistream::{ServerPipeline, run_client};

const USAGE: &str = "usage: pistream <client|server> [config.toml]";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Args / Config
    // ------------------------------------------------------------
    let mut args = std::env::args().skip(1);
    let role = match args.next() {
        Some(role) => role,
        None => bail!(USAGE),
    };
    let cfg_path = args.next().unwrap_or_else(|| "config.toml".into());

    let cfg = if Path::new(&cfg_path).exists() {
        let cfg = Config::load(&cfg_path)?;
        info!("[pistream] loaded {}", cfg_path);
        cfg
    } else {
        warn!("[pistream] {} not found, using defaults", cfg_path);
        let cfg = Config::default();
        cfg.validate()?;
        cfg
    };

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let shutdown = ShutdownSignal::new();
    {
        let s = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("[pistream] shutdown requested");
            s.trigger("ctrl-c");
        })?;
    }

    match role.as_str() {
        "client" => {
            let argv = cfg.client.camera_command.clone();
            info!("[pistream] client → {}", cfg.client.server_address);
            run_client(&cfg.client, shutdown, move || CommandCamera::new(argv))?;
        }
        "server" => {
            let pipeline = ServerPipeline::bind(&cfg.server)?;
            info!(
                "[pistream] server: ingest on {}, live on {}",
                pipeline.ingest_addr()?,
                pipeline.http_addr()?
            );
            let transcoder = FfmpegTranscoder::new(&cfg.server.transcoder);
            let report = pipeline.run(transcoder, shutdown)?;
            info!(
                "[pistream] {:?}: {} fragment(s) published, {} file(s) cleaned up",
                report.ingest, report.published, report.cleanup.removed
            );
        }
        other => bail!("unknown role '{}'\n{}", other, USAGE),
    }

    info!("[pistream] shutdown complete");
    Ok(())
}
