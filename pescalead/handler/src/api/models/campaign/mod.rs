use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Body of the campaign queue processor. The whole body is optional.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CampaignQueueRequest {
    /// Messages to lock, `1..=100`; anything else uses the default.
    #[schema(value_type = Option<i64>)]
    pub batch_size: Option<Value>,
}

/// Answer when no campaign message was due.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CampaignQueueEmptyResponse {
    /// Always zero.
    pub processed: u32,
}

/// Answer of a campaign queue run.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CampaignQueueResponse {
    /// Always `true`.
    pub success: bool,
    /// Openers delivered.
    pub processed: u32,
    /// Messages failed for good.
    pub failed: u32,
    /// Messages left because their run paused.
    pub paused: u32,
}

/// Answer when the run could not start.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CampaignQueueErrorResponse {
    /// What went wrong.
    pub error: String,
    /// Always `FATAL_ERROR`.
    pub error_code: String,
}
