//! Conversation, instance and message rows.

use serde::{Deserialize, Serialize};

/// A conversation, with the columns the senders and the receiver need.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConversationEntry {
    /// Conversation id.
    pub id: String,
    /// Contact phone, free format.
    pub contact_phone: Option<String>,
    /// Owning workspace.
    pub workspace_id: Option<String>,
    /// Inbox the conversation arrived in.
    pub inbox_id: Option<String>,
    /// Linked lead, if any.
    pub lead_id: Option<String>,
    /// Unread messages.
    pub unread_count: Option<i64>,
}

/// An `inbox_instances` mapping.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct InboxInstanceEntry {
    /// The instance serving the inbox.
    pub instance_id: String,
}

/// A WhatsApp instance.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstanceEntry {
    /// Instance id.
    pub id: String,
    /// Name the provider knows the instance by.
    pub name: String,
    /// `connected`, `disconnected`, ...
    pub status: Option<String>,
}

/// A message for insertion.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NewMessageEntry<'a> {
    /// Conversation.
    pub conversation_id: &'a str,
    /// `sent` or `received`.
    pub message_type: &'a str,
    /// `text`, `audio`, `image`, ...
    pub content_type: &'a str,
    /// Text or caption.
    pub text_content: &'a str,
    /// Media URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<&'a str>,
    /// Id assigned by the provider.
    pub provider_message_id: Option<&'a str>,
    /// Whether the message was read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    /// Creation time; the database clock when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<&'a str>,
    /// `none` or `pending`, for received messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_status: Option<&'a str>,
    /// Raw webhook data, for received messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<&'a serde_json::Value>,
    /// Sending user; always null for automated messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_by: Option<Option<&'a str>>,
}

/// Preview columns of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationPreviewUpdate<'a> {
    /// First 100 characters of the last message.
    pub last_message: &'a str,
    /// Time of the last message, RFC 3339.
    pub last_message_at: &'a str,
    /// Row update time, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<&'a str>,
    /// New unread counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<i64>,
}

/// A lead timeline entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewLeadActivityEntry<'a> {
    /// Lead.
    pub lead_id: &'a str,
    /// Text shown in the timeline.
    pub description: &'a str,
    /// `system` for automated entries.
    pub activity_type: &'a str,
}
