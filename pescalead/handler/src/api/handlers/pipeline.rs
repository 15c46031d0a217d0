//! Handlers for the AI reply pipeline: the webhook receiver and the queue
//! processor.
//!
//! Both endpoints answer with a `status` field instead of the usual error
//! body, since their callers are webhooks and schedulers that only log it.
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{json, with_status, Reply, Response};

use crate::api::models::pipeline::{
    PipelineStatusResponse, QueueEmptyResponse, QueueRunResponse, ReceiverQueuedResponse,
    WebhookPayload,
};
use crate::common::error::Error;
use crate::common::now_rfc3339;
use crate::context::PescaleadContext;
use crate::database::accessors;
use crate::database::entries::messaging::{ConversationPreviewUpdate, NewMessageEntry};
use crate::database::entries::pipeline::{DebouncerStatusUpdate, QueueMessageEntry};
use crate::pipeline;
use crate::rate_limit::RateLimitDecision;

fn status_reply(status: &str, reason: &str) -> Response {
    json(&PipelineStatusResponse::reason(status, reason)).into_response()
}

/// Reply for a failed pipeline call.
fn pipeline_error(error: Error) -> Response {
    let (status, body) = match error {
        Error::Unauthorized(_) => (
            StatusCode::UNAUTHORIZED,
            PipelineStatusResponse::reason("error", "unauthorized"),
        ),
        Error::BadRequest(reason) => (
            StatusCode::BAD_REQUEST,
            PipelineStatusResponse::reason("error", reason),
        ),
        other => {
            error!(error = %other, "pipeline call failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                PipelineStatusResponse::message("error", other.error_message()),
            )
        }
    };
    with_status(json(&body), status).into_response()
}

/// Webhook receiver handler.
#[utoipa::path(
    post,
    operation_id = "receiveWebhook",
    path = "/ai-webhook-receiver",
    params(
        ("x-webhook-secret" = Option<String>, Header, description = "Shared webhook secret."),
    ),
    tag = "pipeline",
    request_body = WebhookPayload,
    responses(
        (status = 200, description = "Message queued, ignored or skipped", body = ReceiverQueuedResponse),
        (status = 400, description = "Missing message or conversation", body = PipelineStatusResponse),
        (status = 401, description = "Wrong webhook secret", body = PipelineStatusResponse),
        (status = 429, description = "Too many requests"),
        (status = 500, description = "Processing failed", body = PipelineStatusResponse)
    )
)]
#[instrument(skip(context, decision, secret, body))]
pub async fn receive_webhook(
    context: PescaleadContext,
    decision: RateLimitDecision,
    secret: Option<String>,
    body: Bytes,
) -> impl warp::reply::Reply {
    debug!("In receive webhook");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(
        context: PescaleadContext,
        secret: Option<String>,
        body: Bytes,
    ) -> Result<Response, Error> {
        let started = Instant::now();
        let settings = &context.settings.pipeline;
        if let Some(expected) = &settings.webhook_secret {
            if secret.as_deref() != Some(expected.as_str()) {
                warn!("invalid webhook secret");
                return Err(Error::Unauthorized("unauthorized".to_string()));
            }
        }

        let payload: WebhookPayload = serde_json::from_slice(&body)
            .map_err(|_| Error::BadRequest("invalid JSON body".to_string()))?;
        let event = payload.event.as_deref().unwrap_or_default();
        debug!(event, "webhook event");
        if !pipeline::MESSAGE_EVENTS.contains(&event) {
            return Ok(status_reply("ignored", "not a message event"));
        }
        let (Some(message), Some(conversation_id)) = (
            payload.message,
            payload.conversation_id.filter(|id| !id.is_empty()),
        ) else {
            return Err(Error::BadRequest(
                "missing message or conversation_id".to_string(),
            ));
        };

        let db = &context.db;
        if !accessors::should_ai_handle_conversation(db, &conversation_id).await? {
            info!(conversation_id, "conversation not handled by AI");
            return Ok(status_reply("skipped", "conversation not handled by AI"));
        }

        let conversation = accessors::get_conversation_entry(db, &conversation_id)
            .await?
            .ok_or_else(|| {
                Error::HttpRequest(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Conversation not found".to_string(),
                )
            })?;

        let agent_id =
            match accessors::get_active_agent_for_inbox(db, conversation.inbox_id.as_deref()).await {
                Ok(Some(agent_id)) => agent_id,
                Ok(None) => {
                    info!(inbox_id = ?conversation.inbox_id, "no active agent for inbox");
                    return Ok(status_reply("skipped", "no active agent for inbox"));
                }
                Err(error) => {
                    warn!(%error, "active agent lookup failed");
                    return Ok(status_reply("skipped", "no active agent for inbox"));
                }
            };
        let agent = accessors::get_agent_entry(db, &agent_id)
            .await?
            .ok_or_else(|| {
                Error::HttpRequest(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Agent config not found".to_string(),
                )
            })?;
        let debounce_seconds = agent
            .debounce_seconds()
            .unwrap_or(settings.default_debounce_seconds);

        let kind = message.kind.as_deref();
        let content_type = pipeline::content_type(kind);
        let text = pipeline::message_text(&message);
        let media_url = message.media_url.as_deref().filter(|url| !url.is_empty());
        let message_id = accessors::add_message_entry(
            db,
            &NewMessageEntry {
                conversation_id: &conversation_id,
                message_type: "received",
                content_type,
                text_content: text,
                media_url,
                provider_message_id: message.id.as_deref(),
                transcription_status: Some(pipeline::transcription_status(kind)),
                payload: message.payload.as_ref(),
                ..Default::default()
            },
        )
        .await?;
        debug!(message_id, "message saved");

        let transcription = pipeline::transcription_kind(kind, media_url);
        if let (Some(transcription), Some(media_url)) = (transcription, media_url) {
            match accessors::queue_transcription(db, &message_id, media_url, transcription).await {
                Ok(()) => debug!(message_id, transcription, "transcription queued"),
                Err(error) => warn!(%error, message_id, "failed to queue transcription"),
            }
        }

        let debouncer_id = accessors::add_to_debouncer(
            db,
            &conversation_id,
            &message_id,
            &agent_id,
            debounce_seconds,
        )
        .await?;
        debug!(%debouncer_id, "added to debouncer");

        let preview = pipeline::preview(text, content_type);
        let now = now_rfc3339();
        let update = ConversationPreviewUpdate {
            last_message: &preview,
            last_message_at: &now,
            updated_at: None,
            unread_count: Some(conversation.unread_count.unwrap_or_default() + 1),
        };
        if let Err(error) = accessors::set_conversation_preview(db, &conversation_id, &update).await {
            warn!(%error, conversation_id, "failed to update conversation preview");
        }

        let response = ReceiverQueuedResponse {
            status: "success".to_string(),
            message_id,
            debouncer_id,
            will_transcribe: transcription.is_some(),
            debounce_seconds,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(duration_ms = response.duration_ms, "webhook message queued");
        Ok(json(&response).into_response())
    }

    // Handle and respond.
    let reply = handler(context, secret, body)
        .await
        .unwrap_or_else(pipeline_error);
    decision.apply(reply)
}

/// Queue processor handler.
#[utoipa::path(
    post,
    operation_id = "processQueue",
    path = "/ai-process-queue",
    tag = "pipeline",
    responses(
        (status = 200, description = "Queue run finished or nothing to do", body = QueueRunResponse),
        (status = 500, description = "The queue could not be read", body = PipelineStatusResponse)
    )
)]
#[instrument(skip(context))]
pub async fn process_queue(context: PescaleadContext) -> impl warp::reply::Reply {
    debug!("In process queue");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(context: PescaleadContext) -> Result<Response, Error> {
        let started = Instant::now();
        let db = &context.db;
        let settings = &context.settings.pipeline;

        let debouncer_moved = match accessors::debouncer_to_queue(db).await {
            Ok(moved) => {
                if moved > 0 {
                    info!(moved, "debouncer entries moved to the queue");
                }
                moved
            }
            Err(error) => {
                warn!(%error, "failed to move debouncer entries to the queue");
                0
            }
        };

        let messages = accessors::read_queue(
            db,
            &settings.queue_name,
            settings.visibility_timeout_secs.into(),
            settings.batch_size.into(),
        )
        .await?;
        if messages.is_empty() {
            let response = QueueEmptyResponse {
                status: "empty".to_string(),
                message: "No messages in queue".to_string(),
                debouncer_moved,
            };
            return Ok(json(&response).into_response());
        }

        info!(count = messages.len(), "processing queued conversations");
        let (mut processed, mut errors) = (0, 0);
        for message in &messages {
            match process_message(&context, message).await {
                Ok(()) => processed += 1,
                Err(error) => {
                    record_failure(&context, message, &error).await;
                    errors += 1;
                }
            }
        }

        let response = QueueRunResponse {
            status: "success".to_string(),
            processed,
            errors,
            debouncer_moved,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            processed,
            errors,
            duration_ms = response.duration_ms,
            "queue run finished"
        );
        Ok(json(&response).into_response())
    }

    // Handle and respond.
    handler(context).await.unwrap_or_else(pipeline_error)
}

async fn process_message(
    context: &PescaleadContext,
    message: &QueueMessageEntry,
) -> Result<(), Error> {
    let db = &context.db;
    let job = &message.message;
    debug!(conversation_id = ?job.conversation_id, msg_id = message.msg_id, "processing job");

    if let Some(debouncer_id) = &job.debouncer_id {
        let update = DebouncerStatusUpdate {
            status: "processing",
            last_error: None,
            retry_count: None,
        };
        if let Err(error) = accessors::set_debouncer_status(db, debouncer_id, &update).await {
            warn!(%error, "failed to mark debouncer entry as processing");
        }
    }

    pipeline::process_conversation(
        &context.http,
        db.base_url(),
        &context.settings.supabase.service_role_key,
        job,
    )
    .await?;

    let queue = &context.settings.pipeline.queue_name;
    if let Err(error) = accessors::delete_queue_message(db, queue, message.msg_id).await {
        warn!(%error, msg_id = message.msg_id, "failed to delete processed queue message");
    }
    Ok(())
}

async fn record_failure(context: &PescaleadContext, message: &QueueMessageEntry, failure: &Error) {
    let db = &context.db;
    let settings = &context.settings.pipeline;
    let job = &message.message;
    warn!(
        error = %failure,
        conversation_id = ?job.conversation_id,
        read_ct = ?message.read_ct,
        "job failed"
    );

    if let Some(debouncer_id) = &job.debouncer_id {
        let reason = failure.error_message();
        let update = DebouncerStatusUpdate {
            status: "failed",
            last_error: Some(&reason),
            retry_count: Some(pipeline::retry_count(message.read_ct)),
        };
        if let Err(error) = accessors::set_debouncer_status(db, debouncer_id, &update).await {
            warn!(%error, "failed to mark debouncer entry as failed");
        }
    }

    if pipeline::should_archive(message.read_ct, settings.max_retries) {
        info!(msg_id = message.msg_id, "max retries reached, archiving");
        if let Err(error) =
            accessors::archive_queue_message(db, &settings.queue_name, message.msg_id).await
        {
            warn!(%error, msg_id = message.msg_id, "failed to archive queue message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn errors_use_the_status_shape() {
        let unauthorized = pipeline_error(Error::Unauthorized("x".to_string()));
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_of(unauthorized).await,
            serde_json::json!({"status": "error", "reason": "unauthorized"})
        );

        let failed = pipeline_error(Error::InternalServer);
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_of(failed).await,
            serde_json::json!({"status": "error", "message": "Internal server error"})
        );
    }
}
