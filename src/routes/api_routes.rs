use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::errors::ConsoleError;
use crate::models::{AgentStatus, InvokeBody};
use crate::service::console_service::ConsoleService;

/// POST `/api/agents/{id}/invoke` — start a run, creating a thread when none is given
pub async fn invoke_handler(
    Path(agent_id): Path<String>,
    State(svc): State<ConsoleService>,
    Json(body): Json<InvokeBody>,
) -> Response {
    match svc.invoke(&agent_id, body).await {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => error_response(&err),
    }
}

/// GET `/api/agents/{id}/status` — whether a run is being started
pub async fn agent_status_handler(
    Path(agent_id): Path<String>,
    State(svc): State<ConsoleService>,
) -> Json<AgentStatus> {
    Json(svc.agent_status(&agent_id))
}

/// GET `/api/threads` — cached thread list
pub async fn list_threads_handler(State(svc): State<ConsoleService>) -> Response {
    match svc.get_threads().await {
        Ok(threads) => Json(threads).into_response(),
        Err(err) => error_response(&err),
    }
}

// ── Helper ────────────────────────────────────────────────────────────────────

pub(crate) fn error_response(err: &ConsoleError) -> Response {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_connection() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
