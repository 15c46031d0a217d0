use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Liveness of the board API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KanbanHealthResponse {
    /// Always `ok`.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Version of the API.
    pub version: String,
    /// Time of the check.
    pub timestamp: String,
}
