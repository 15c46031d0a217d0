use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// A message as delivered by the WhatsApp webhook.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct WebhookMessage {
    /// Provider message id.
    pub id: Option<String>,
    /// WhatsApp message type: `text`, `audio`, `ptt`, `image`, ...
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Text.
    pub content: Option<String>,
    /// Media caption.
    pub caption: Option<String>,
    /// Alternative text field used by some providers.
    pub body: Option<String>,
    /// Media location.
    pub media_url: Option<String>,
    /// Raw provider data, stored as is.
    #[schema(value_type = Option<Object>)]
    pub payload: Option<Value>,
}

/// Body of the webhook receiver.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct WebhookPayload {
    /// Event name.
    pub event: Option<String>,
    /// Conversation the message belongs to.
    pub conversation_id: Option<String>,
    /// The message.
    pub message: Option<WebhookMessage>,
}

/// Outcome of a pipeline call that did no work, or failed.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PipelineStatusResponse {
    /// `ignored`, `skipped`, `empty` or `error`.
    pub status: String,
    /// Why nothing was done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PipelineStatusResponse {
    /// A status with a reason.
    pub fn reason(status: &str, reason: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            reason: Some(reason.into()),
            message: None,
        }
    }

    /// A status with a message.
    pub fn message(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            reason: None,
            message: Some(message.into()),
        }
    }
}

/// A message accepted into the debouncer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReceiverQueuedResponse {
    /// Always `success`.
    pub status: String,
    /// Stored message.
    pub message_id: String,
    /// Debouncer entry the message joined.
    #[schema(value_type = Object)]
    pub debouncer_id: Value,
    /// Whether a transcription was requested.
    pub will_transcribe: bool,
    /// Quiet period before the conversation is processed.
    pub debounce_seconds: i64,
    /// Handling time.
    pub duration_ms: u64,
}

/// No queue message was ready.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueueEmptyResponse {
    /// Always `empty`.
    pub status: String,
    /// Always `No messages in queue`.
    pub message: String,
    /// Debouncer entries moved into the queue by this run.
    pub debouncer_moved: i64,
}

/// Outcome of a queue run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueueRunResponse {
    /// Always `success`; failed jobs are counted in `errors`.
    pub status: String,
    /// Jobs processed and deleted.
    pub processed: u32,
    /// Jobs that failed.
    pub errors: u32,
    /// Debouncer entries moved into the queue by this run.
    pub debouncer_moved: i64,
    /// Handling time.
    pub duration_ms: u64,
}
