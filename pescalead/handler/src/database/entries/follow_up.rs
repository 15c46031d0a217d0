//! Follow-up rows: ready jobs, categories, message templates and history.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::numeric;

/// A follow-up job ready to run.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FollowUpJobEntry {
    /// Job id.
    pub job_id: String,
    /// Conversation to follow up.
    pub conversation_id: String,
    /// Owning workspace.
    pub workspace_id: String,
    /// Message that started the silence.
    pub trigger_message_id: Option<String>,
    /// Category, once chosen.
    pub category_id: Option<String>,
    /// Templates of the category already sent.
    pub current_model_index: i64,
}

/// Answer of `validate_follow_up_execution`.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ValidationEntry {
    /// Whether the job should run now.
    pub valid: bool,
    /// Why not.
    pub reason: Option<String>,
}

/// When a category may send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Only inside business hours.
    BusinessHours,
    /// Any time.
    #[serde(other)]
    Always,
}

/// A published follow-up category.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CategoryEntry {
    /// Category id.
    pub id: String,
    /// Name the model answers with.
    pub name: String,
    /// When to pick this category.
    #[serde(default)]
    pub ai_instructions: Option<String>,
    /// When it may send.
    #[serde(default)]
    pub availability: Option<Availability>,
}

/// Answer of `get_next_follow_up_model`.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FollowUpModelEntry {
    /// Template id.
    pub model_id: String,
    /// Template name.
    pub model_name: String,
    /// Text to send.
    pub message: String,
    /// Wait before the next template, in seconds.
    pub wait_seconds: i64,
    /// Index of the next template.
    pub next_index: i64,
    /// Whether this is the last template.
    pub is_last: bool,
}

/// Active category picker settings.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FollowUpAiConfigEntry {
    /// OpenRouter model slug.
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(deserialize_with = "numeric")]
    pub temperature: Option<f64>,
    /// Completion budget.
    pub max_tokens: Option<u32>,
    /// System prompt.
    pub system_prompt: Option<String>,
    /// User prompt with `{{conversation}}` and `{{categories}}`.
    pub prompt_template: Option<String>,
}

/// A recent message of a conversation.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TranscriptEntry {
    /// Text, absent for media.
    pub text_content: Option<String>,
    /// `sent` or `received`.
    pub message_type: Option<String>,
}

/// Column changes of a follow-up job.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FollowUpJobUpdate<'a> {
    /// Chosen category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<&'a str>,
    /// How the category was chosen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_decision_log: Option<&'a Value>,
    /// Next run, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_execution_at: Option<&'a Value>,
    /// `completed` when no template is left.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'a str>,
    /// Completion time, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<&'a str>,
    /// Why the job ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<&'a str>,
    /// Row update time, RFC 3339.
    pub updated_at: &'a str,
}

/// A sent follow-up, for the history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewFollowUpHistoryEntry<'a> {
    /// Job.
    pub job_id: &'a str,
    /// Template sent.
    pub model_id: &'a str,
    /// Category of the template.
    pub category_id: &'a str,
    /// Conversation.
    pub conversation_id: &'a str,
    /// Text as sent.
    pub message_sent: &'a str,
    /// Stored message.
    pub message_id: &'a str,
    /// One based position of the template.
    pub sequence_number: i64,
    /// Always `sent`.
    pub status: &'a str,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_availability_means_always() {
        let category: CategoryEntry = serde_json::from_value(json!({
            "id": "c1",
            "name": "Orçamento",
            "availability": "weekends"
        }))
        .unwrap();
        assert_eq!(category.availability, Some(Availability::Always));

        let category: CategoryEntry = serde_json::from_value(json!({
            "id": "c2",
            "name": "Retorno",
            "availability": "business_hours"
        }))
        .unwrap();
        assert_eq!(category.availability, Some(Availability::BusinessHours));
    }

    #[test]
    fn job_updates_always_stamp_the_row() {
        let update = FollowUpJobUpdate {
            status: Some("completed"),
            updated_at: "2024-01-01T00:00:00Z",
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"status": "completed", "updated_at": "2024-01-01T00:00:00Z"})
        );
    }
}
