use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::service::console_service::ConsoleService;

/// GET `/api/threads/{id}/transcript` — current transcript, following the thread if needed
pub async fn get_transcript_handler(
    Path(id): Path<String>,
    State(svc): State<ConsoleService>,
) -> impl IntoResponse {
    Json(svc.get_transcript(&id).await)
}

/// GET `/api/threads/{id}/transcript/stream` — one `transcript` event per change
pub async fn stream_transcript_handler(
    Path(id): Path<String>,
    State(svc): State<ConsoleService>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let snapshots = WatchStream::new(svc.watch_transcript(&id).await);
    let events = snapshots.map(|snapshot| Event::default().event("transcript").json_data(&snapshot));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// DELETE `/api/threads/{id}/transcript` — stop following the thread (idempotent)
pub async fn close_transcript_handler(
    Path(id): Path<String>,
    State(svc): State<ConsoleService>,
) -> StatusCode {
    if !svc.close_transcript(&id).await {
        debug!(thread_id = %id, "thread was not followed");
    }
    StatusCode::NO_CONTENT
}
