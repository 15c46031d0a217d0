//! Handler for messages sent on behalf of the AI agent.
use tracing::{debug, instrument};
use warp::http::StatusCode;
use warp::reply::{json, with_status, Reply};

use crate::api::models::messaging::{SendAiMessageRequestBody, SendAiMessageResponse};
use crate::auth;
use crate::common::error::Error;
use crate::context::PescaleadContext;
use crate::messaging;

/// Send AI message handler.
#[utoipa::path(
    post,
    operation_id = "sendAiMessage",
    path = "/internal-send-ai-message",
    params(
        ("X-Service-Role-Key" = String, Header, description = "Service key."),
    ),
    tag = "messaging",
    request_body = SendAiMessageRequestBody,
    responses(
        (status = 200, description = "Message sent and stored", body = SendAiMessageResponse),
        (status = 400, description = "Missing fields or no usable instance", body = ErrorResponse),
        (status = 401, description = "Wrong service key", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
        (status = 502, description = "The provider refused the message", body = ErrorResponse)
    )
)]
#[instrument(skip(context, service_key, body))]
pub async fn send_ai_message(
    context: PescaleadContext,
    service_key: Option<String>,
    body: SendAiMessageRequestBody,
) -> impl warp::reply::Reply {
    debug!("In send ai message");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        service_key: Option<String>,
        body: SendAiMessageRequestBody,
    ) -> Result<impl warp::reply::Reply, Error> {
        auth::verify_service_key(&context, service_key.as_deref())?;

        let text = body.text.as_deref().map(str::trim).unwrap_or_default();
        let conversation_id = body
            .conversation_id
            .as_deref()
            .filter(|id| !id.is_empty() && !text.is_empty())
            .ok_or_else(|| Error::BadRequest("conversationId and text required".to_string()))?;
        debug!(conversation_id, length = text.chars().count(), "sending ai message");

        let response: SendAiMessageResponse =
            messaging::deliver(&context, conversation_id, text).await?;
        Ok(with_status(json(&response), StatusCode::OK))
    }

    // Handle and respond.
    handler(context, service_key, body)
        .await
        .map_or_else(Reply::into_response, Reply::into_response)
}
