//! Handlers for the health endpoint.
use warp::http::StatusCode;
use warp::reply::{json, with_status};

use crate::api::models::health::KanbanHealthResponse;
use crate::common::now_rfc3339;

/// Version reported by the board API.
pub const KANBAN_API_VERSION: &str = "2.0.0";

/// Get health handler.
#[utoipa::path(
    get,
    operation_id = "checkKanbanHealth",
    path = "/kanban-api/health",
    tag = "health",
    responses(
        (status = 200, description = "The board API is up.", body = KanbanHealthResponse),
    )
)]
pub async fn get_kanban_health() -> impl warp::reply::Reply {
    let health = KanbanHealthResponse {
        status: "ok".to_string(),
        service: "kanban-api".to_string(),
        version: KANBAN_API_VERSION.to_string(),
        timestamp: now_rfc3339(),
    };
    with_status(json(&health), StatusCode::OK)
}
