//! Campaign rows: locked messages, runs and the stored procedure answers
//! the campaign queue works with.

use serde::{Deserialize, Serialize};

use super::numeric;

/// Status of a campaign message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignMessageStatus {
    /// Waiting for its schedule.
    Pending,
    /// Scheduled.
    Queued,
    /// The opener is being written.
    Generating,
    /// The opener is being sent.
    Sending,
    /// Delivered.
    Sent,
    /// Given up.
    Failed,
    /// Not sent: the run stopped, the lead is gone or it got stale.
    Skipped,
    /// The lead answered.
    Replied,
}

impl CampaignMessageStatus {
    /// Lowercase name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignMessageStatus::Pending => "pending",
            CampaignMessageStatus::Queued => "queued",
            CampaignMessageStatus::Generating => "generating",
            CampaignMessageStatus::Sending => "sending",
            CampaignMessageStatus::Sent => "sent",
            CampaignMessageStatus::Failed => "failed",
            CampaignMessageStatus::Skipped => "skipped",
            CampaignMessageStatus::Replied => "replied",
        }
    }
}

impl std::fmt::Display for CampaignMessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a campaign run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignRunStatus {
    /// Sending.
    Running,
    /// Every lead processed.
    Completed,
    /// Stopped on an error.
    Failed,
    /// Stopped by a user.
    Cancelled,
    /// Stopped until resumed.
    Paused,
}

impl CampaignRunStatus {
    /// Lowercase name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignRunStatus::Running => "running",
            CampaignRunStatus::Completed => "completed",
            CampaignRunStatus::Failed => "failed",
            CampaignRunStatus::Cancelled => "cancelled",
            CampaignRunStatus::Paused => "paused",
        }
    }
}

/// Messages a paused run leaves unsent.
pub const UNSENT_STATUSES: [CampaignMessageStatus; 4] = [
    CampaignMessageStatus::Pending,
    CampaignMessageStatus::Queued,
    CampaignMessageStatus::Generating,
    CampaignMessageStatus::Sending,
];

/// Settings of the campaign a message belongs to.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CampaignSettingsEntry {
    /// Inbox the campaign sends from.
    pub inbox_id: Option<String>,
    /// Owning workspace.
    pub workspace_id: Option<String>,
    /// Split the opener into several messages.
    pub split_messages: Option<bool>,
    /// Most parts a split may produce.
    pub max_split_parts: Option<i64>,
    /// Time of day after which the run pauses, `HH:MM[:SS]`.
    pub end_time: Option<String>,
    /// IANA time zone of `end_time`.
    pub timezone: Option<String>,
    /// Prompt for the opener.
    pub ai_instructions: Option<String>,
    /// Column leads move to once contacted.
    pub target_column_id: Option<String>,
}

/// The run a message belongs to.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CampaignRunRef {
    /// Run id.
    pub id: String,
    /// Campaign settings.
    pub campaign_configs: CampaignSettingsEntry,
}

/// A campaign message locked for sending.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CampaignMessageEntry {
    /// Message id.
    pub id: String,
    /// Lead to contact.
    pub lead_id: String,
    /// Lead phone, digits only.
    pub phone_normalized: Option<String>,
    /// Failed attempts so far.
    pub retry_count: Option<u32>,
    /// Run and campaign.
    pub campaign_runs: CampaignRunRef,
}

/// Status column of a run.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct RunStatusEntry {
    /// Raw status; runs may carry statuses this service does not know.
    #[serde(default)]
    pub status: Option<String>,
}

/// Answer of `check_campaign_instance_status`.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstanceStatusEntry {
    /// Whether the instance can send.
    pub connected: Option<bool>,
    /// Provider status.
    pub status: Option<String>,
    /// Instance name.
    pub instance_name: Option<String>,
}

impl InstanceStatusEntry {
    /// Connected, with anything unclear counting as not.
    pub fn is_connected(&self) -> bool {
        self.connected == Some(true)
    }
}

/// The model of a workspace's agent.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct AgentModelEntry {
    /// OpenRouter model slug.
    #[serde(default)]
    pub model: Option<String>,
}

/// Active splitter settings.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SplitterConfigEntry {
    /// Shorter openers are sent whole.
    pub min_chars_to_split: Option<usize>,
    /// Pause between parts, in milliseconds.
    pub delay_between_messages: Option<u64>,
    /// Sampling temperature.
    #[serde(deserialize_with = "numeric")]
    pub temperature: Option<f64>,
    /// Completion budget.
    pub max_tokens: Option<u32>,
}

/// A vault secret.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct SecretEntry {
    /// Plain text value.
    #[serde(default)]
    pub decrypted_secret: Option<String>,
}

/// Name column of a lead.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
pub struct LeadNameEntry {
    /// Lead name.
    #[serde(default)]
    pub client_name: Option<String>,
}

/// Column changes of a campaign message.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CampaignMessageUpdate<'a> {
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CampaignMessageStatus>,
    /// Failure or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<&'a str>,
    /// The opener.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_message: Option<&'a str>,
    /// Tokens spent on the opener.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_tokens_used: Option<u64>,
    /// Time spent on the opener.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_generation_time_ms: Option<u64>,
    /// Next attempt, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<&'a str>,
    /// Failed attempts so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

/// Column changes of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CampaignRunUpdate<'a> {
    /// New status.
    pub status: CampaignRunStatus,
    /// Reason shown to the user.
    pub error_message: &'a str,
}

/// A conversation opened by a campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewConversationEntry<'a> {
    /// Owning workspace.
    pub workspace_id: &'a str,
    /// Contact phone.
    pub contact_phone: &'a str,
    /// Contact name.
    pub contact_name: &'a str,
    /// Always `whatsapp`.
    pub channel: &'a str,
    /// Always `waiting`.
    pub status: &'a str,
    /// Linked lead.
    pub lead_id: &'a str,
    /// Inbox the campaign sends from.
    pub inbox_id: Option<&'a str>,
}

/// Answer of `complete_campaign_message_atomic`.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompletionResultEntry {
    /// Whether every write landed.
    pub success: Option<bool>,
    /// Reason when not.
    pub error: Option<String>,
}

/// Answer of `finalize_campaign_run_if_complete`.
#[derive(Clone, Default, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FinalizedRunEntry {
    /// Whether this call completed the run.
    pub finalized: Option<bool>,
    /// Leads processed.
    pub leads_processed: Option<i64>,
    /// Leads in the run.
    pub leads_total: Option<i64>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn locked_messages_decode_with_their_campaign() {
        let entry: CampaignMessageEntry = serde_json::from_value(json!({
            "id": "m1",
            "lead_id": "l1",
            "phone_normalized": "5583999990000",
            "retry_count": null,
            "campaign_runs": {
                "id": "r1",
                "campaign_configs": {
                    "inbox_id": "i1",
                    "workspace_id": "w1",
                    "split_messages": true,
                    "end_time": "18:00:00",
                    "unknown_column": 1
                }
            }
        }))
        .unwrap();

        assert_eq!(entry.campaign_runs.id, "r1");
        assert_eq!(entry.campaign_runs.campaign_configs.split_messages, Some(true));
        assert_eq!(entry.campaign_runs.campaign_configs.end_time.as_deref(), Some("18:00:00"));
        assert_eq!(entry.retry_count, None);
    }

    #[test]
    fn message_updates_only_carry_set_columns() {
        let update = CampaignMessageUpdate {
            status: Some(CampaignMessageStatus::Skipped),
            error_message: Some("Lead foi deletado antes do processamento"),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({
                "status": "skipped",
                "error_message": "Lead foi deletado antes do processamento"
            })
        );
    }

    #[test]
    fn splitter_temperature_may_be_a_string() {
        let entry: SplitterConfigEntry =
            serde_json::from_value(json!({"temperature": "0.2", "max_tokens": 800})).unwrap();
        assert_eq!(entry.temperature, Some(0.2));
        assert_eq!(entry.max_tokens, Some(800));
    }
}
