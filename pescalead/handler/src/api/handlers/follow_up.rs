//! Handler for the follow-up queue processor.
//!
//! Jobs whose wait elapsed get the next template of their category. A job
//! without a category has one picked by a model from the recent
//! conversation; categories limited to business hours wait for the next
//! one.
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use warp::http::StatusCode;
use warp::reply::{json, with_status, Reply, Response};

use crate::api::models::follow_up::{
    FollowUpJobResult, FollowUpJobStatus, FollowUpQueueEmptyResponse, FollowUpQueueErrorResponse,
    FollowUpQueueResponse,
};
use crate::campaign::OPENROUTER_SECRET;
use crate::common::error::Error;
use crate::common::now_rfc3339;
use crate::context::PescaleadContext;
use crate::database::accessors;
use crate::database::entries::follow_up::{
    Availability, FollowUpJobEntry, FollowUpJobUpdate, NewFollowUpHistoryEntry,
};
use crate::follow_up::{self, PickerSettings};
use crate::messaging;

/// Picker settings and key, loaded once per run.
#[derive(Debug, Default)]
struct Picker {
    settings: Option<PickerSettings>,
    api_key: Option<Option<String>>,
}

impl Picker {
    async fn settings(&mut self, context: &PescaleadContext) -> PickerSettings {
        if let Some(settings) = &self.settings {
            return settings.clone();
        }
        let entry = accessors::get_follow_up_ai_config(&context.db)
            .await
            .unwrap_or_else(|error| {
                warn!(%error, "failed to load follow-up picker settings, using defaults");
                None
            });
        let settings = PickerSettings::from(entry);
        debug!(model = settings.model, "follow-up picker settings loaded");
        self.settings = Some(settings.clone());
        settings
    }

    async fn api_key(&mut self, context: &PescaleadContext) -> Option<String> {
        if let Some(key) = &self.api_key {
            return key.clone();
        }
        let key = match context.openrouter.configured_key() {
            Some(key) => Some(key.to_string()),
            None => match accessors::get_secret(&context.db, OPENROUTER_SECRET).await {
                Ok(key) => key,
                Err(error) => {
                    debug!(%error, "secret procedure failed, reading the vault");
                    accessors::get_vault_secret(&context.db, OPENROUTER_SECRET)
                        .await
                        .unwrap_or_else(|error| {
                            warn!(%error, "OpenRouter key unavailable");
                            None
                        })
                }
            },
        };
        self.api_key = Some(key.clone());
        key
    }
}

fn fatal_error(error: Error, started: Instant) -> Response {
    error!(%error, "follow-up queue run failed");
    let body = FollowUpQueueErrorResponse {
        error: error.error_message(),
        duration_ms: started.elapsed().as_millis() as u64,
    };
    with_status(json(&body), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

/// Follow-up queue processor handler.
#[utoipa::path(
    post,
    operation_id = "processFollowUpQueue",
    path = "/process-follow-up-queue",
    tag = "follow-up",
    responses(
        (status = 200, description = "Run finished", body = FollowUpQueueResponse),
        (status = 500, description = "The jobs could not be read", body = FollowUpQueueErrorResponse)
    )
)]
#[instrument(skip(context))]
pub async fn process_follow_up_queue(context: PescaleadContext) -> impl warp::reply::Reply {
    debug!("In process follow-up queue");
    let started = Instant::now();
    // Internal handler so `?` can be used correctly while still returning a reply.
    async fn handler(context: PescaleadContext, started: Instant) -> Result<Response, Error> {
        let settings = &context.settings.follow_up;
        let jobs = accessors::get_ready_follow_up_jobs(&context.db, settings.batch_size).await?;
        if jobs.is_empty() {
            debug!("no follow-up job ready");
            let response = FollowUpQueueEmptyResponse {
                processed: 0,
                message: "No jobs ready".to_string(),
                duration_ms: started.elapsed().as_millis() as u64,
            };
            return Ok(json(&response).into_response());
        }

        info!(count = jobs.len(), "processing follow-up jobs");
        let mut picker = Picker::default();
        let mut results = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let result = process_job(&context, &mut picker, job)
                .await
                .unwrap_or_else(|error| {
                    warn!(%error, job_id = job.job_id, "follow-up job failed");
                    FollowUpJobResult::error(&job.job_id, error.error_message())
                });
            results.push(result);
        }

        let response =
            FollowUpQueueResponse::summarize(results, started.elapsed().as_millis() as u64);
        info!(
            processed = response.processed,
            sent = response.sent,
            skipped = response.skipped,
            errors = response.errors,
            duration_ms = response.duration_ms,
            "follow-up run finished"
        );
        Ok(json(&response).into_response())
    }

    // Handle and respond.
    handler(context, started)
        .await
        .unwrap_or_else(|error| fatal_error(error, started))
}

async fn set_job(context: &PescaleadContext, job_id: &str, update: FollowUpJobUpdate<'_>) {
    if let Err(error) = accessors::set_follow_up_job(&context.db, job_id, &update).await {
        warn!(%error, job_id, "failed to update follow-up job");
    }
}

#[instrument(skip_all, fields(job_id = %job.job_id, workspace_id = %job.workspace_id))]
async fn process_job(
    context: &PescaleadContext,
    picker: &mut Picker,
    job: &FollowUpJobEntry,
) -> Result<FollowUpJobResult, Error> {
    let db = &context.db;
    let validation = accessors::validate_follow_up_execution(db, &job.job_id).await?;
    if !validation.valid {
        debug!(reason = ?validation.reason, "follow-up job skipped");
        return Ok(FollowUpJobResult {
            reason: validation.reason,
            ..FollowUpJobResult::new(&job.job_id, FollowUpJobStatus::Skipped)
        });
    }

    let (category_id, ai_decision) = match job.category_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => (id.to_string(), None),
        None => {
            let (category_id, log) = choose_category(context, picker, job).await;
            let Some(category_id) = category_id else {
                return Ok(FollowUpJobResult::error(
                    &job.job_id,
                    "No category available for this workspace",
                ));
            };
            let now = now_rfc3339();
            let update = FollowUpJobUpdate {
                category_id: Some(&category_id),
                ai_decision_log: Some(&log),
                updated_at: &now,
                ..Default::default()
            };
            set_job(context, &job.job_id, update).await;
            (category_id, Some(log))
        }
    };

    let Some(category) = accessors::get_category_entry(db, &category_id, &job.workspace_id).await?
    else {
        return Ok(FollowUpJobResult::error(
            &job.job_id,
            "Category not found for this workspace",
        ));
    };

    if category.availability == Some(Availability::BusinessHours)
        && !accessors::is_business_hours(db).await?
    {
        let next = accessors::next_business_hour(db).await?;
        let now = now_rfc3339();
        let update = FollowUpJobUpdate {
            next_execution_at: Some(&next),
            updated_at: &now,
            ..Default::default()
        };
        set_job(context, &job.job_id, update).await;
        info!(next_execution = %next, "follow-up moved to business hours");
        return Ok(FollowUpJobResult {
            reason: Some("outside_business_hours".to_string()),
            category: Some(category.name),
            next_execution: Some(next),
            ..FollowUpJobResult::new(&job.job_id, FollowUpJobStatus::Rescheduled)
        });
    }

    let Some(template) = accessors::get_next_follow_up_model(
        db,
        &category_id,
        job.current_model_index,
        &job.workspace_id,
    )
    .await?
    else {
        let now = now_rfc3339();
        let update = FollowUpJobUpdate {
            status: Some("completed"),
            completed_at: Some(&now),
            cancel_reason: Some(follow_up::ALL_TEMPLATES_SENT),
            updated_at: &now,
            ..Default::default()
        };
        set_job(context, &job.job_id, update).await;
        info!("follow-up job completed, no template left");
        return Ok(FollowUpJobResult {
            reason: Some("no_more_models".to_string()),
            category: Some(category.name),
            ..FollowUpJobResult::new(&job.job_id, FollowUpJobStatus::Completed)
        });
    };

    debug!(template = template.model_name, wait_seconds = template.wait_seconds, "sending follow-up");
    let text = follow_up::sanitize_template_message(&template.message);
    let sent = match messaging::deliver(context, &job.conversation_id, &text).await {
        Ok(sent) => sent,
        Err(error) => {
            warn!(%error, "follow-up send failed");
            return Ok(FollowUpJobResult {
                error: Some(error.error_message()),
                model: Some(template.model_name),
                ..FollowUpJobResult::new(&job.job_id, FollowUpJobStatus::SendFailed)
            });
        }
    };
    let message_id = sent.message.id;
    let sequence = job.current_model_index + 1;

    let history = NewFollowUpHistoryEntry {
        job_id: &job.job_id,
        model_id: &template.model_id,
        category_id: &category_id,
        conversation_id: &job.conversation_id,
        message_sent: &text,
        message_id: &message_id,
        sequence_number: sequence,
        status: "sent",
    };
    if let Err(error) = accessors::add_follow_up_history(db, &history).await {
        warn!(%error, "failed to record follow-up history");
    }
    if let Err(error) = accessors::record_follow_up_send(db, &job.job_id, &message_id, &template).await {
        warn!(%error, "failed to advance follow-up job");
    }

    let status = if template.is_last {
        FollowUpJobStatus::Completed
    } else {
        FollowUpJobStatus::Sent
    };
    info!(message_id, sequence, is_last = template.is_last, "follow-up sent");
    Ok(FollowUpJobResult {
        category: Some(category.name),
        model: Some(template.model_name),
        message_id: Some(message_id),
        sequence: Some(sequence),
        is_last: Some(template.is_last),
        next_wait_seconds: (!template.is_last).then_some(template.wait_seconds),
        ai_decision,
        ..FollowUpJobResult::new(&job.job_id, status)
    })
}

/// Category for a job without one, with the log of how it was chosen.
/// When picking fails the first published category is used, if any.
async fn choose_category(
    context: &PescaleadContext,
    picker: &mut Picker,
    job: &FollowUpJobEntry,
) -> (Option<String>, serde_json::Value) {
    match pick_category(context, picker, job).await {
        Ok((category_id, log)) => (Some(category_id), log),
        Err(error) => {
            warn!(%error, "category selection failed");
            let first = accessors::get_published_categories(&context.db, &job.workspace_id)
                .await
                .ok()
                .and_then(|categories| categories.into_iter().next());
            let log = follow_up::failed_log(
                &error.error_message(),
                first.as_ref(),
                &job.workspace_id,
                &now_rfc3339(),
            );
            (first.map(|category| category.id), log)
        }
    }
}

async fn pick_category(
    context: &PescaleadContext,
    picker: &mut Picker,
    job: &FollowUpJobEntry,
) -> Result<(String, serde_json::Value), Error> {
    let db = &context.db;
    let settings = picker.settings(context).await;
    let limit = context.settings.follow_up.context_messages;
    let messages = accessors::get_recent_messages(db, &job.conversation_id, limit)
        .await
        .unwrap_or_else(|error| {
            warn!(%error, "failed to load recent messages");
            Vec::new()
        });

    let categories = accessors::get_published_categories(db, &job.workspace_id).await?;
    let Some(first) = categories.first() else {
        return Err(Error::NotFound(
            "No published categories found for this workspace".to_string(),
        ));
    };
    if categories.len() == 1 {
        debug!(category = first.name, "single published category");
        let log = follow_up::unasked_log("single_category", first, &job.workspace_id, &now_rfc3339());
        return Ok((first.id.clone(), log));
    }

    let prompt = follow_up::render_prompt(
        &settings.prompt_template,
        &follow_up::render_transcript(&messages),
        &follow_up::render_categories(&categories),
    );
    let Some(api_key) = picker.api_key(context).await else {
        warn!("no OpenRouter key, using the first category");
        let log = follow_up::unasked_log("no_api_key", first, &job.workspace_id, &now_rfc3339());
        return Ok((first.id.clone(), log));
    };

    let started = Instant::now();
    let request = follow_up::picker_request(&settings, prompt);
    let completion = match context
        .openrouter
        .complete(&api_key, follow_up::PICKER_TITLE, &request)
        .await
    {
        Ok(completion) => completion,
        Err(error) => {
            warn!(%error, "category model failed, using the first category");
            let log = follow_up::failed_log(
                &error.error_message(),
                Some(first),
                &job.workspace_id,
                &now_rfc3339(),
            );
            return Ok((first.id.clone(), log));
        }
    };
    let duration_ms = started.elapsed().as_millis() as u64;
    let answer = completion.content;

    match follow_up::match_category(&categories, &answer) {
        Some(category) => {
            info!(category = category.name, duration_ms, "category picked");
            let log = follow_up::chosen_log(
                &settings,
                &answer,
                category,
                &job.workspace_id,
                duration_ms,
                completion.usage.total_tokens,
                &now_rfc3339(),
            );
            Ok((category.id.clone(), log))
        }
        None => {
            warn!(answer, fallback = first.name, "unknown category answered");
            let log = follow_up::unmatched_log(
                &settings,
                &answer,
                first,
                &job.workspace_id,
                duration_ms,
                &now_rfc3339(),
            );
            Ok((first.id.clone(), log))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fatal_errors_report_the_duration() {
        let response = fatal_error(
            Error::Database { code: None, message: "relation missing".to_string() },
            Instant::now(),
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "relation missing");
        assert!(body["duration_ms"].is_u64());
    }
}
