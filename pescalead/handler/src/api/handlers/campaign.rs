//! Handler for the campaign queue processor.
//!
//! Each run locks a batch of due campaign messages, writes an opener for
//! every lead with the workspace's model, optionally splits it into several
//! WhatsApp messages and sends it. Runs pause when their end time passes or
//! their instance disconnects; failed messages are retried with a backoff.
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::join_all;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{json, with_status, Reply, Response};

use crate::api::models::campaign::{
    CampaignQueueEmptyResponse, CampaignQueueErrorResponse, CampaignQueueRequest,
    CampaignQueueResponse,
};
use crate::campaign::{self, RetryPlan, SplitterSettings};
use crate::common::error::Error;
use crate::context::PescaleadContext;
use crate::database::accessors::{self, CampaignCompletion};
use crate::database::entries::campaign::{
    CampaignMessageEntry, CampaignMessageStatus, CampaignMessageUpdate, CampaignRunStatus,
    InstanceStatusEntry, NewConversationEntry,
};
use crate::messaging;

/// Per message outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Failed,
    Paused,
    Skipped,
    Retrying,
}

/// Lookups shared by the messages of a run.
#[derive(Debug, Default)]
struct RunCache {
    instances: Mutex<HashMap<String, InstanceStatusEntry>>,
    models: Mutex<HashMap<String, Option<String>>>,
    contexts: HashMap<String, serde_json::Value>,
}

fn rfc3339_in(delay: Duration) -> String {
    (OffsetDateTime::now_utc() + delay)
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn rfc3339_ago(age: Duration) -> String {
    (OffsetDateTime::now_utc() - age)
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Reply for a run that could not start.
fn fatal_error(error: Error) -> Response {
    error!(%error, "campaign queue run failed");
    let body = CampaignQueueErrorResponse {
        error: error.error_message(),
        error_code: "FATAL_ERROR".to_string(),
    };
    with_status(json(&body), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

/// Campaign queue processor handler.
#[utoipa::path(
    post,
    operation_id = "processCampaignQueue",
    path = "/campaign-process-queue",
    tag = "campaign",
    request_body = Option<CampaignQueueRequest>,
    responses(
        (status = 200, description = "Run finished", body = CampaignQueueResponse),
        (status = 500, description = "The run could not start", body = CampaignQueueErrorResponse)
    )
)]
#[instrument(skip(context, body))]
pub async fn process_campaign_queue(context: PescaleadContext, body: Bytes) -> impl warp::reply::Reply {
    debug!("In process campaign queue");
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(context: PescaleadContext, body: Bytes) -> Result<Response, Error> {
        let db = &context.db;
        let settings = &context.settings.campaign;

        let request: CampaignQueueRequest = serde_json::from_slice(&body).unwrap_or_default();
        let batch_size = campaign::batch_size(request.batch_size.as_ref(), settings);
        info!(batch_size, "processing campaign batch");

        let api_key = match context.openrouter.configured_key() {
            Some(key) => key.to_string(),
            None => accessors::get_vault_secret(db, campaign::OPENROUTER_SECRET)
                .await?
                .ok_or_else(|| Error::Provider("OpenRouter API key not configured".to_string()))?,
        };

        let stale_before = rfc3339_ago(settings.stale_after);
        let messages = accessors::lock_campaign_messages(db, batch_size, &stale_before).await;
        match accessors::skip_stale_campaign_messages(db, &stale_before).await {
            Ok(skipped) if skipped > 0 => info!(skipped, "stale campaign messages skipped"),
            Ok(_) => {}
            Err(error) => warn!(%error, "failed to skip stale campaign messages"),
        }
        let messages = messages?;
        if messages.is_empty() {
            debug!("no campaign message ready");
            return Ok(json(&CampaignQueueEmptyResponse { processed: 0 }).into_response());
        }

        let lookups = messages.iter().map(|message| async move {
            let context = accessors::get_lead_full_context(db, &message.lead_id).await;
            (message.lead_id.clone(), context)
        });
        let mut contexts = HashMap::new();
        for (lead_id, context) in join_all(lookups).await {
            match context {
                Ok(Some(context)) => {
                    contexts.insert(lead_id, context);
                }
                Ok(None) => {}
                Err(error) => warn!(%error, lead_id, "failed to load lead context"),
            }
        }
        debug!(loaded = contexts.len(), total = messages.len(), "lead contexts loaded");

        let cache = RunCache { contexts, ..Default::default() };
        let mut response = CampaignQueueResponse { success: true, ..Default::default() };
        for chunk in messages.chunks(settings.concurrency) {
            let outcomes = chunk
                .iter()
                .map(|message| process_message(&context, &cache, &api_key, message));
            for outcome in join_all(outcomes).await {
                match outcome {
                    Ok(Outcome::Sent) => response.processed += 1,
                    Ok(Outcome::Failed) => response.failed += 1,
                    Ok(Outcome::Paused) => response.paused += 1,
                    Ok(Outcome::Skipped | Outcome::Retrying) => {}
                    Err(error) => {
                        warn!(%error, "campaign message processing failed");
                        response.failed += 1;
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        for message in &messages {
            let run_id = &message.campaign_runs.id;
            if seen.insert(run_id.as_str()) {
                finalize_run(&context, run_id).await;
            }
        }

        info!(
            processed = response.processed,
            failed = response.failed,
            paused = response.paused,
            "campaign batch finished"
        );
        Ok(json(&response).into_response())
    }

    // Handle and respond.
    handler(context, body).await.unwrap_or_else(fatal_error)
}

async fn finalize_run(context: &PescaleadContext, run_id: &str) {
    let db = &context.db;
    let finalized = match accessors::finalize_campaign_run(db, run_id).await {
        Ok(finalized) => finalized,
        Err(error) => {
            warn!(%error, run_id, "failed to finalize campaign run");
            return;
        }
    };
    let Some(run) = finalized.filter(|run| run.finalized == Some(true)) else {
        return;
    };

    let processed = run.leads_processed.unwrap_or_default();
    info!(run_id, processed, "campaign run completed");
    let message = format!("🎉 Campanha concluída! {processed} leads processados");
    let details = serde_json::json!({ "total": run.leads_total, "processed": run.leads_processed });
    if let Err(error) =
        accessors::log_campaign_step(db, run_id, "FINALIZAÇÃO", "success", &message, &details).await
    {
        warn!(%error, run_id, "failed to log campaign completion");
    }
}

async fn update_message(context: &PescaleadContext, message_id: &str, update: CampaignMessageUpdate<'_>) {
    if let Err(error) = accessors::set_campaign_message(&context.db, message_id, &update).await {
        warn!(%error, message_id, "failed to update campaign message");
    }
}

async fn count_on_run(context: &PescaleadContext, run_id: &str, failed: u32, skipped: u32) {
    if let Err(error) =
        accessors::increment_campaign_run_metrics(&context.db, run_id, 0, failed, skipped).await
    {
        warn!(%error, run_id, "failed to count campaign message");
    }
}

async fn pause(context: &PescaleadContext, run_id: &str, reason: &str) -> Outcome {
    info!(run_id, reason, "pausing campaign run");
    if let Err(error) = accessors::pause_campaign_run(&context.db, run_id, reason).await {
        warn!(%error, run_id, "failed to pause campaign run");
    }
    Outcome::Paused
}

#[instrument(skip_all, fields(message_id = %message.id, run_id = %message.campaign_runs.id))]
async fn process_message(
    context: &PescaleadContext,
    cache: &RunCache,
    api_key: &str,
    message: &CampaignMessageEntry,
) -> Result<Outcome, Error> {
    let run_id = &message.campaign_runs.id;
    let config = &message.campaign_runs.campaign_configs;

    let status = accessors::get_campaign_run_status(&context.db, run_id).await?;
    if status.as_deref() != Some(CampaignRunStatus::Running.as_str()) {
        let reason = campaign::stopped_run_reason(status.as_deref());
        let update = CampaignMessageUpdate {
            status: Some(CampaignMessageStatus::Skipped),
            error_message: Some(&reason),
            ..Default::default()
        };
        update_message(context, &message.id, update).await;
        return Ok(match status.as_deref() {
            Some(status) if status == CampaignRunStatus::Paused.as_str() => Outcome::Paused,
            _ => Outcome::Skipped,
        });
    }

    if let Some(end_time) = config.end_time.as_deref().filter(|end| !end.is_empty()) {
        let timezone = campaign::campaign_timezone(
            config.timezone.as_deref(),
            &context.settings.campaign.default_timezone,
        );
        if campaign::end_time_passed(end_time, timezone, chrono::Utc::now()) {
            let reason = format!("Horário limite ({end_time}) atingido");
            return Ok(pause(context, run_id, &reason).await);
        }
    }

    match send_opener(context, cache, api_key, message).await {
        Ok(outcome) => Ok(outcome),
        Err(error) => Ok(record_failure(context, message, &error).await),
    }
}

async fn instance_status(
    context: &PescaleadContext,
    inbox_id: Option<&str>,
) -> Result<InstanceStatusEntry, Error> {
    match inbox_id {
        Some(inbox_id) => accessors::check_campaign_instance(&context.db, inbox_id).await,
        None => Ok(InstanceStatusEntry::default()),
    }
}

async fn cached_instance_status(
    context: &PescaleadContext,
    cache: &RunCache,
    inbox_id: Option<&str>,
) -> Result<InstanceStatusEntry, Error> {
    let key = inbox_id.unwrap_or_default().to_string();
    let cached = cache
        .instances
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
        .cloned();
    if let Some(status) = cached {
        return Ok(status);
    }
    let status = instance_status(context, inbox_id).await?;
    cache
        .instances
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, status.clone());
    Ok(status)
}

async fn cached_model(
    context: &PescaleadContext,
    cache: &RunCache,
    workspace_id: Option<&str>,
) -> Result<Option<String>, Error> {
    let Some(workspace_id) = workspace_id else {
        return Ok(None);
    };
    let cached = cache
        .models
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(workspace_id)
        .cloned();
    if let Some(model) = cached {
        return Ok(model);
    }
    let model = accessors::get_workspace_ai_model(&context.db, workspace_id).await?;
    cache
        .models
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(workspace_id.to_string(), model.clone());
    Ok(model)
}

/// Parts to send for `opener`, with the pause between them. Never fails:
/// any problem sends the opener whole.
async fn split_opener(
    context: &PescaleadContext,
    api_key: &str,
    model: &str,
    opener: &str,
    max_parts: usize,
) -> (Vec<String>, u64, u64) {
    let whole = || vec![opener.to_string()];
    let settings = match accessors::get_splitter_config(&context.db).await {
        Ok(entry) => SplitterSettings::from(entry),
        Err(error) => {
            warn!(%error, "failed to load splitter settings");
            SplitterSettings::default()
        }
    };
    if opener.chars().count() < settings.min_chars {
        return (whole(), 0, settings.delay_ms);
    }

    debug!(model, max_parts, "splitting opener");
    let request = campaign::split_request(model, opener, max_parts, &settings);
    let completion = match context
        .openrouter
        .complete(api_key, campaign::SPLIT_TITLE, &request)
        .await
    {
        Ok(completion) => completion,
        Err(error) => {
            warn!(%error, "split failed, sending the opener whole");
            return (whole(), 0, settings.delay_ms);
        }
    };
    let tokens = completion.usage.prompt_tokens + completion.usage.completion_tokens;
    let parts = campaign::parse_split_response(&completion.content, max_parts).unwrap_or_else(|error| {
        warn!(error, "unusable split answer, sending the opener whole");
        whole()
    });
    (parts, tokens, settings.delay_ms)
}

async fn conversation_for(
    context: &PescaleadContext,
    message: &CampaignMessageEntry,
    lead_context: &serde_json::Value,
) -> Result<String, Error> {
    let db = &context.db;
    let config = &message.campaign_runs.campaign_configs;
    if let Some(id) = accessors::get_lead_conversation_id(db, &message.lead_id).await? {
        return Ok(id);
    }

    let workspace_id = config.workspace_id.as_deref().unwrap_or_default();
    let phone = message.phone_normalized.as_deref().unwrap_or_default();
    if let Some(id) = accessors::get_phone_conversation_id(db, workspace_id, phone).await? {
        if let Err(error) = accessors::link_conversation_lead(db, &id, &message.lead_id).await {
            warn!(%error, conversation_id = id, "failed to link conversation to lead");
        }
        return Ok(id);
    }

    let contact_name = lead_context
        .get("client_name")
        .and_then(serde_json::Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(phone);
    let entry = NewConversationEntry {
        workspace_id,
        contact_phone: phone,
        contact_name,
        channel: "whatsapp",
        status: "waiting",
        lead_id: &message.lead_id,
        inbox_id: config.inbox_id.as_deref(),
    };
    accessors::add_conversation_entry(db, &entry).await
}

async fn send_opener(
    context: &PescaleadContext,
    cache: &RunCache,
    api_key: &str,
    message: &CampaignMessageEntry,
) -> Result<Outcome, Error> {
    let db = &context.db;
    let run_id = &message.campaign_runs.id;
    let config = &message.campaign_runs.campaign_configs;
    let inbox_id = config.inbox_id.as_deref();

    let instance = cached_instance_status(context, cache, inbox_id).await?;
    if !instance.is_connected() {
        let name = instance.instance_name.as_deref().unwrap_or("desconhecida");
        return Ok(pause(context, run_id, &format!("Instância desconectada: {name}")).await);
    }

    let Some(model) = cached_model(context, cache, config.workspace_id.as_deref()).await? else {
        let update = CampaignMessageUpdate {
            status: Some(CampaignMessageStatus::Failed),
            error_message: Some("Nenhum modelo de IA configurado no ai_agents para este workspace."),
            ..Default::default()
        };
        update_message(context, &message.id, update).await;
        count_on_run(context, run_id, 1, 0).await;
        return Ok(Outcome::Failed);
    };

    if accessors::get_lead_name(db, &message.lead_id).await?.is_none() {
        let update = CampaignMessageUpdate {
            status: Some(CampaignMessageStatus::Skipped),
            error_message: Some("Lead foi deletado antes do processamento"),
            ..Default::default()
        };
        update_message(context, &message.id, update).await;
        count_on_run(context, run_id, 0, 1).await;
        return Ok(Outcome::Skipped);
    }

    let lead_context = match cache.contexts.get(&message.lead_id) {
        Some(lead_context) => lead_context.clone(),
        None => accessors::get_lead_full_context(db, &message.lead_id)
            .await?
            .ok_or_else(|| Error::NotFound("Lead context not found".to_string()))?,
    };

    let system_prompt = config
        .ai_instructions
        .as_deref()
        .filter(|prompt| !prompt.trim().is_empty())
        .unwrap_or(campaign::DEFAULT_SYSTEM_PROMPT);
    let summary = campaign::format_lead_context(&lead_context);
    let request = campaign::generation_request(&model, system_prompt, &summary);
    let started = Instant::now();
    let completion = context
        .openrouter
        .complete(api_key, campaign::GENERATION_TITLE, &request)
        .await?;
    let generation_ms = started.elapsed().as_millis() as u64;

    let opener = completion.content;
    let length = opener.chars().count();
    if length < campaign::MIN_MESSAGE_CHARS {
        return Err(Error::Provider(format!(
            "AI generated invalid message (length: {length}, min: {})",
            campaign::MIN_MESSAGE_CHARS
        )));
    }
    let update = CampaignMessageUpdate {
        ai_tokens_used: Some(completion.usage.total_tokens),
        ai_generation_time_ms: Some(generation_ms),
        ..Default::default()
    };
    update_message(context, &message.id, update).await;

    let (parts, delay_ms) = if config.split_messages == Some(true) {
        let max_parts = campaign::split_parts(config.max_split_parts);
        let (parts, tokens, delay_ms) = split_opener(context, api_key, &model, &opener, max_parts).await;
        debug!(parts = parts.len(), tokens, "opener split");
        (parts, delay_ms)
    } else {
        (vec![opener.clone()], SplitterSettings::default().delay_ms)
    };

    let update = CampaignMessageUpdate {
        status: Some(CampaignMessageStatus::Sending),
        generated_message: Some(&opener),
        ..Default::default()
    };
    update_message(context, &message.id, update).await;

    if !instance_status(context, inbox_id).await?.is_connected() {
        return Ok(pause(context, run_id, "Instância desconectou durante processamento").await);
    }

    let conversation_id = conversation_for(context, message, &lead_context).await?;
    let mut provider_message_id = None;
    for (index, part) in parts.iter().enumerate() {
        let sent = messaging::deliver(context, &conversation_id, part)
            .await
            .map_err(|error| {
                warn!(%error, part = index + 1, "failed to send opener part");
                Error::Provider("Failed to send one or more message parts".to_string())
            })?;
        provider_message_id = sent.message.provider_message_id;
        if index + 1 < parts.len() && delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    let completion = CampaignCompletion {
        message_id: &message.id,
        run_id,
        lead_id: &message.lead_id,
        target_column_id: config.target_column_id.as_deref(),
        conversation_id: Some(&conversation_id),
        provider_message_id: provider_message_id.as_deref(),
        success: true,
    };
    let result = accessors::complete_campaign_message(db, &completion).await?;
    if result.success != Some(true) {
        return Err(Error::Provider(format!(
            "Atomic completion failed: {}",
            result.error.unwrap_or_default()
        )));
    }
    info!(conversation_id, parts = parts.len(), "campaign opener sent");
    Ok(Outcome::Sent)
}

async fn record_failure(
    context: &PescaleadContext,
    message: &CampaignMessageEntry,
    failure: &Error,
) -> Outcome {
    let settings = &context.settings.campaign;
    let reason = failure.error_message();
    warn!(error = %failure, retry_count = ?message.retry_count, "campaign message failed");

    match campaign::retry_plan(message.retry_count, settings) {
        RetryPlan::Retry { attempt, delay_minutes } => {
            let scheduled_at = rfc3339_in(Duration::from_secs(delay_minutes * 60));
            let error_message = campaign::retry_message(attempt, settings.max_retries, &reason);
            let update = CampaignMessageUpdate {
                status: Some(CampaignMessageStatus::Pending),
                scheduled_at: Some(&scheduled_at),
                error_message: Some(&error_message),
                retry_count: Some(attempt),
                ..Default::default()
            };
            update_message(context, &message.id, update).await;
            Outcome::Retrying
        }
        RetryPlan::GiveUp { attempt } => {
            let completion = CampaignCompletion {
                message_id: &message.id,
                run_id: &message.campaign_runs.id,
                lead_id: &message.lead_id,
                target_column_id: message.campaign_runs.campaign_configs.target_column_id.as_deref(),
                conversation_id: None,
                provider_message_id: None,
                success: false,
            };
            if let Err(error) = accessors::complete_campaign_message(&context.db, &completion).await {
                warn!(%error, "failed to record failed campaign message");
            }
            let error_message = campaign::give_up_message(settings.max_retries, &reason);
            let update = CampaignMessageUpdate {
                error_message: Some(&error_message),
                retry_count: Some(attempt),
                ..Default::default()
            };
            update_message(context, &message.id, update).await;
            Outcome::Failed
        }
    }
}
