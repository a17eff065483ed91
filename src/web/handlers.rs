use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::web::WebState;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// One `data:{"segment_path": ...}` event per fragment, from the moment of
/// subscribing on. Ends when the publisher closes.
pub async fn ready_segments_stream(
    State(state): State<WebState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();

    let stream = UnboundedReceiverStream::new(rx).map(|ready| {
        let data = serde_json::to_string(&ready).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE).text("keep-alive"))
}

pub async fn health() -> &'static str {
    "ok"
}
