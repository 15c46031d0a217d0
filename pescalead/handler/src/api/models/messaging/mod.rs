use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Body of the AI message sender.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendAiMessageRequestBody {
    /// Conversation to answer.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Text to send.
    #[serde(default)]
    pub text: Option<String>,
}

/// A message sent on behalf of the AI agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SendAiMessageResponse {
    /// Always true.
    pub success: bool,
    /// Stored message.
    pub message: SentMessage,
    /// Raw provider response.
    #[schema(value_type = Object)]
    pub provider_response: Value,
}

/// The stored copy of a sent message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SentMessage {
    /// Message id.
    pub id: String,
    /// Conversation.
    pub conversation_id: String,
    /// Always `sent`.
    pub message_type: String,
    /// Always `text`.
    pub content_type: String,
    /// Text sent.
    pub text_content: String,
    /// Always true.
    pub is_read: bool,
    /// Id assigned by the provider.
    pub provider_message_id: Option<String>,
    /// Send time, RFC 3339.
    pub created_at: String,
}
