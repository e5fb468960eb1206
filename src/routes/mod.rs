pub mod api_routes;
pub mod transcript_routes;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::console_service::ConsoleService;

pub fn router(service: ConsoleService) -> Router {
    Router::new()
        .route("/api/threads", get(api_routes::list_threads_handler))
        .route(
            "/api/threads/{id}/transcript",
            get(transcript_routes::get_transcript_handler)
                .delete(transcript_routes::close_transcript_handler),
        )
        .route(
            "/api/threads/{id}/transcript/stream",
            get(transcript_routes::stream_transcript_handler),
        )
        .route("/api/agents/{id}/invoke", post(api_routes::invoke_handler))
        .route("/api/agents/{id}/status", get(api_routes::agent_status_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
