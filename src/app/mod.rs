use std::thread::{self, JoinHandle};

use anyhow::{Context, anyhow};

pub mod client;
pub mod handshake;
pub mod server;

fn spawn_stage<R, F>(name: &str, f: F) -> anyhow::Result<JoinHandle<R>>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .with_context(|| format!("spawning {} thread", name))
}

fn join_stage<R>(name: &str, handle: JoinHandle<R>) -> anyhow::Result<R> {
    handle
        .join()
        .map_err(|_| anyhow!("{} thread panicked", name))
}
