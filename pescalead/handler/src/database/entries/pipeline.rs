//! AI pipeline rows: agents, debouncer entries and queue messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An AI agent with its behavior settings.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
pub struct AgentEntry {
    /// Agent id.
    pub id: String,
    /// Free form behavior settings; `timing.debounce_seconds` is read here.
    #[serde(default)]
    pub behavior_config: Option<Value>,
}

impl AgentEntry {
    /// Configured debounce, when set to a positive number of seconds.
    pub fn debounce_seconds(&self) -> Option<i64> {
        self.behavior_config
            .as_ref()?
            .pointer("/timing/debounce_seconds")?
            .as_f64()
            .filter(|seconds| *seconds > 0.0)
            .map(|seconds| seconds.round() as i64)
    }
}

/// The job a queue message carries.
#[derive(Clone, Default, Debug, PartialEq, Deserialize, Serialize)]
pub struct QueueJob {
    /// Conversation to process.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Agent answering it.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Messages gathered by the debouncer.
    #[serde(default)]
    pub message_ids: Option<Value>,
    /// Debouncer entry the job came from.
    #[serde(default)]
    pub debouncer_id: Option<Value>,
}

/// A message read from the processing queue.
#[derive(Clone, Default, Debug, PartialEq, Deserialize)]
pub struct QueueMessageEntry {
    /// Queue message id.
    pub msg_id: i64,
    /// How many times the message was read, this read included.
    #[serde(default)]
    pub read_ct: Option<i64>,
    /// The job.
    #[serde(default)]
    pub message: QueueJob,
}

/// Status change of a debouncer entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DebouncerStatusUpdate<'a> {
    /// `processing` or `failed`.
    pub status: &'a str,
    /// Failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<&'a str>,
    /// Reads so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<i64>,
}
