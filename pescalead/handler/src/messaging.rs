//! Outbound messages written by the AI agent, the campaigns and the
//! follow-ups.
//!
//! A message is sent through the instance serving the conversation, stored
//! as a `sent` message, and mirrored in the conversation preview and the
//! lead timeline. The last two are best effort.

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::api::models::messaging::{SendAiMessageResponse, SentMessage};
use crate::common::error::Error;
use crate::common::{now_rfc3339, truncate_chars};
use crate::context::PescaleadContext;
use crate::database::accessors;
use crate::database::entries::messaging::{
    ConversationEntry, ConversationPreviewUpdate, NewLeadActivityEntry, NewMessageEntry,
};
use crate::pipeline::PREVIEW_CHARS;
use crate::whatsapp;

/// Characters of the text quoted in the lead timeline.
const ACTIVITY_QUOTE_CHARS: usize = 80;

fn failure(message: impl Into<String>) -> Error {
    Error::HttpRequest(StatusCode::INTERNAL_SERVER_ERROR, message.into())
}

/// Timeline entry for a message the agent sent.
pub fn activity_description(text: &str) -> String {
    let quoted = truncate_chars(text, ACTIVITY_QUOTE_CHARS);
    let ellipsis = if quoted.len() < text.len() { "..." } else { "" };
    format!("[IA] Enviou: \"{quoted}{ellipsis}\"")
}

/// Instance that should carry a reply: the one serving the inbox of the
/// conversation, else any connected instance of the workspace.
async fn reply_instance(
    context: &PescaleadContext,
    conversation: &ConversationEntry,
) -> Result<Option<String>, Error> {
    let db = &context.db;
    if let Some(inbox_id) = conversation.inbox_id.as_deref() {
        if let Some(instance_id) = accessors::get_inbox_instance_id(db, inbox_id).await? {
            debug!(instance_id, "instance found through the inbox");
            return Ok(Some(instance_id));
        }
    }
    match conversation.workspace_id.as_deref() {
        Some(workspace_id) => accessors::get_connected_instance_id(db, workspace_id).await,
        None => Ok(None),
    }
}

/// Send `text` into a conversation and store it.
pub async fn deliver(
    context: &PescaleadContext,
    conversation_id: &str,
    text: &str,
) -> Result<SendAiMessageResponse, Error> {
    let db = &context.db;
    let conversation = accessors::get_conversation_entry(db, conversation_id)
        .await?
        .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;
    let phone = whatsapp::digits_only(conversation.contact_phone.as_deref().unwrap_or_default());

    let instance_id = reply_instance(context, &conversation)
        .await?
        .ok_or_else(|| Error::BadRequest("No WhatsApp instance found".to_string()))?;
    let instance = accessors::get_instance_entry(db, &instance_id)
        .await?
        .ok_or_else(|| failure("Instance not found"))?;
    let status = instance.status.as_deref().unwrap_or_default();
    if status != "connected" {
        return Err(Error::BadRequest(format!(
            "Instance \"{}\" not connected. Status: {status}",
            instance.name
        )));
    }

    let resolved = context
        .token_cache
        .resolve_instance_token(
            db,
            &instance_id,
            context.settings.whatsapp.evolution_api_key.as_deref(),
        )
        .await?
        .ok_or_else(|| failure("No API token configured"))?;
    info!(provider = %resolved.provider, instance = instance.name, "sending through provider");

    let provider_response = context
        .whatsapp
        .send_text(resolved.provider, &instance.name, &resolved.token, &phone, text)
        .await?;
    let provider_message_id = whatsapp::provider_message_id(&provider_response);

    let now = now_rfc3339();
    let message_id = accessors::add_message_entry(
        db,
        &NewMessageEntry {
            conversation_id,
            message_type: "sent",
            content_type: "text",
            text_content: text,
            provider_message_id: provider_message_id.as_deref(),
            is_read: Some(true),
            created_at: Some(&now),
            sent_by: Some(None),
            ..Default::default()
        },
    )
    .await
    .map_err(|error| {
        warn!(%error, "message sent but not stored");
        failure("Message sent but failed to save")
    })?;

    let preview = truncate_chars(text, PREVIEW_CHARS);
    let update = ConversationPreviewUpdate {
        last_message: preview,
        last_message_at: &now,
        updated_at: Some(&now),
        unread_count: None,
    };
    if let Err(error) = accessors::set_conversation_preview(db, conversation_id, &update).await {
        warn!(%error, conversation_id, "failed to update conversation preview");
    }

    if let Some(lead_id) = conversation.lead_id.as_deref() {
        let description = activity_description(text);
        let activity = NewLeadActivityEntry {
            lead_id,
            description: &description,
            activity_type: "system",
        };
        if let Err(error) = accessors::add_lead_activity(db, &activity).await {
            warn!(%error, lead_id, "failed to log lead activity");
        }
    }

    Ok(SendAiMessageResponse {
        success: true,
        message: SentMessage {
            id: message_id,
            conversation_id: conversation_id.to_string(),
            message_type: "sent".to_string(),
            content_type: "text".to_string(),
            text_content: text.to_string(),
            is_read: true,
            provider_message_id,
            created_at: now,
        },
        provider_response,
    })
}
