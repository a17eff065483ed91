//! HTTP surface of the live publisher.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::core::broadcast::Broadcaster;
use crate::core::shutdown::ShutdownSignal;
use crate::types::FragmentReady;

pub mod handlers;
pub mod publisher;

const SHUTDOWN_POLL_MS: u64 = 100;

#[derive(Clone)]
pub struct WebState {
    pub broadcaster: Arc<Broadcaster<FragmentReady>>,
    pub media_dir: PathBuf,
}

pub fn router(state: WebState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ready_segments_stream", get(handlers::ready_segments_stream))
        .route("/health", get(handlers::health))
        .nest_service("/segments", ServeDir::new(state.media_dir.clone()))
        .layer(cors)
        .with_state(state)
}

/// Serves until `shutdown` fires. Open event streams end once the
/// broadcaster is closed.
pub fn serve_blocking(
    state: WebState,
    listener: std::net::TcpListener,
    shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    rt.block_on(async move {
        listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(listener)?;
        log::info!("[web] live stream on http://{}", listener.local_addr()?);

        axum::serve(listener, router(state))
            .with_graceful_shutdown(wait_for_shutdown(shutdown))
            .await?;

        log::info!("[web] stopped");
        Ok::<(), anyhow::Error>(())
    })
}

async fn wait_for_shutdown(shutdown: ShutdownSignal) {
    while !shutdown.is_triggered() {
        tokio::time::sleep(Duration::from_millis(SHUTDOWN_POLL_MS)).await;
    }
}
