use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Outcome of one follow-up job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpJobStatus {
    /// A template was sent and more remain.
    Sent,
    /// The last template was sent, or none was left.
    Completed,
    /// The job should not run, e.g. the contact answered.
    Skipped,
    /// Moved to the next business hour.
    Rescheduled,
    /// The provider refused the message.
    SendFailed,
    /// The job could not be processed.
    Error,
}

/// Result of one follow-up job. Only the fields relevant to the status are
/// set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FollowUpJobResult {
    /// Job id.
    pub job_id: String,
    /// Outcome.
    pub status: FollowUpJobStatus,
    /// Why the job was skipped, rescheduled or completed early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// What failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Category name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Template name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Stored message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// One based position of the template sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    /// Whether the template sent was the last one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_last: Option<bool>,
    /// Wait before the next template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_wait_seconds: Option<i64>,
    /// Next run of a rescheduled job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub next_execution: Option<Value>,
    /// How the category was picked in this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub ai_decision: Option<Value>,
}

impl FollowUpJobResult {
    /// A result with only the job and its status.
    pub fn new(job_id: &str, status: FollowUpJobStatus) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            reason: None,
            error: None,
            category: None,
            model: None,
            message_id: None,
            sequence: None,
            is_last: None,
            next_wait_seconds: None,
            next_execution: None,
            ai_decision: None,
        }
    }

    /// A failed job.
    pub fn error(job_id: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(job_id, FollowUpJobStatus::Error)
        }
    }
}

/// Answer when no job was ready.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FollowUpQueueEmptyResponse {
    /// Always zero.
    pub processed: usize,
    /// Always `No jobs ready`.
    pub message: String,
    /// Time spent.
    pub duration_ms: u64,
}

/// Answer of a follow-up queue run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FollowUpQueueResponse {
    /// Jobs looked at.
    pub processed: usize,
    /// Jobs that sent a template or completed.
    pub sent: usize,
    /// Jobs skipped or rescheduled.
    pub skipped: usize,
    /// Jobs that failed.
    pub errors: usize,
    /// Time spent.
    pub duration_ms: u64,
    /// Per job outcomes.
    pub results: Vec<FollowUpJobResult>,
}

impl FollowUpQueueResponse {
    /// Totals over `results`.
    pub fn summarize(results: Vec<FollowUpJobResult>, duration_ms: u64) -> Self {
        let count = |wanted: &[FollowUpJobStatus]| {
            results
                .iter()
                .filter(|result| wanted.contains(&result.status))
                .count()
        };
        Self {
            processed: results.len(),
            sent: count(&[FollowUpJobStatus::Sent, FollowUpJobStatus::Completed]),
            skipped: count(&[FollowUpJobStatus::Skipped, FollowUpJobStatus::Rescheduled]),
            errors: count(&[FollowUpJobStatus::Error, FollowUpJobStatus::SendFailed]),
            duration_ms,
            results,
        }
    }
}

/// Answer when the run could not start.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FollowUpQueueErrorResponse {
    /// What went wrong.
    pub error: String,
    /// Time spent.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn totals_group_statuses() {
        let results = vec![
            FollowUpJobResult::new("j1", FollowUpJobStatus::Sent),
            FollowUpJobResult::new("j2", FollowUpJobStatus::Completed),
            FollowUpJobResult::new("j3", FollowUpJobStatus::Rescheduled),
            FollowUpJobResult::new("j4", FollowUpJobStatus::SendFailed),
            FollowUpJobResult::error("j5", "boom"),
        ];
        let response = FollowUpQueueResponse::summarize(results, 12);
        assert_eq!(
            (response.processed, response.sent, response.skipped, response.errors),
            (5, 2, 1, 2)
        );
    }

    #[test]
    fn results_only_carry_set_fields() {
        let result = FollowUpJobResult {
            reason: Some("no_more_models".to_string()),
            category: Some("Orçamento".to_string()),
            ..FollowUpJobResult::new("j1", FollowUpJobStatus::Completed)
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "job_id": "j1",
                "status": "completed",
                "reason": "no_more_models",
                "category": "Orçamento"
            })
        );
    }
}
