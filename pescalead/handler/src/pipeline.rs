//! AI reply pipeline.
//!
//! Incoming WhatsApp messages are stored, handed to a per-conversation
//! debouncer and, once the conversation goes quiet, moved by the database
//! into a message queue. The queue processor then calls the conversation
//! processor once per debounced batch.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::api::models::pipeline::WebhookMessage;
use crate::common::error::Error;
use crate::common::truncate_chars;
use crate::database::entries::pipeline::QueueJob;

/// Webhook events carrying an incoming message.
pub const MESSAGE_EVENTS: [&str; 2] = ["message.received", "messages.upsert"];

/// Characters of a message kept in the conversation preview.
pub const PREVIEW_CHARS: usize = 100;

/// Path of the conversation processor, relative to the project URL.
pub const PROCESS_CONVERSATION_PATH: &str = "functions/v1/ai-process-conversation";

/// Stored content type of a WhatsApp message type. Unknown types are text.
pub fn content_type(kind: Option<&str>) -> &'static str {
    match kind {
        Some("audio" | "ptt") => "audio",
        Some("video") => "video",
        Some("image" | "sticker") => "image",
        Some("document") => "document",
        Some("location") => "location",
        Some("contacts") => "contact",
        _ => "text",
    }
}

/// Transcription status a new message starts in.
pub fn transcription_status(kind: Option<&str>) -> &'static str {
    match kind {
        Some("audio" | "video" | "ptt") => "pending",
        _ => "none",
    }
}

/// Kind of transcription to queue for a message, if any: images are
/// described, voice and video are transcribed. Media without a URL is
/// skipped.
pub fn transcription_kind(kind: Option<&str>, media_url: Option<&str>) -> Option<&'static str> {
    media_url.filter(|url| !url.is_empty())?;
    match kind {
        Some("image") => Some("image"),
        Some("audio" | "video" | "ptt") => Some("audio"),
        _ => None,
    }
}

/// Text of a message: its content, else its caption, else its body.
pub fn message_text(message: &WebhookMessage) -> &str {
    [&message.content, &message.caption, &message.body]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// Conversation preview of a message.
pub fn preview(text: &str, content_type: &str) -> String {
    let text = truncate_chars(text, PREVIEW_CHARS);
    if text.is_empty() {
        format!("[{content_type}]")
    } else {
        text.to_string()
    }
}

/// Retry counter stored on a failed debouncer entry.
pub fn retry_count(read_ct: Option<i64>) -> i64 {
    read_ct.filter(|count| *count > 0).unwrap_or(1)
}

/// Whether a failing queue message has been read often enough to archive.
pub fn should_archive(read_ct: Option<i64>, max_retries: i64) -> bool {
    read_ct.unwrap_or_default() >= max_retries
}

/// Ask the conversation processor to answer a debounced batch.
pub async fn process_conversation(
    http: &Client,
    base_url: &Url,
    service_key: &str,
    job: &QueueJob,
) -> Result<Value, Error> {
    let url = base_url
        .join(PROCESS_CONVERSATION_PATH)
        .map_err(|error| Error::InvalidEndpoint(error.to_string()))?;
    let body = json!({
        "conversation_id": job.conversation_id,
        "agent_id": job.agent_id,
        "message_ids": job.message_ids,
        "debouncer_id": job.debouncer_id,
    });

    let response = http.post(url).bearer_auth(service_key).json(&body).send().await?;
    if !response.status().is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(Error::Provider(format!("Process conversation failed: {text}")));
    }
    let result: Value = response.json().await.map_err(|error| {
        Error::Provider(format!("Process conversation returned an invalid body: {error}"))
    })?;
    debug!(conversation_id = ?job.conversation_id, %result, "conversation processed");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use test_case::test_case;

    use super::*;

    #[test_case(Some("text"), "text")]
    #[test_case(Some("ptt"), "audio")]
    #[test_case(Some("sticker"), "image")]
    #[test_case(Some("contacts"), "contact")]
    #[test_case(Some("reaction"), "text")]
    #[test_case(None, "text")]
    fn content_types(kind: Option<&str>, expected: &str) {
        assert_eq!(content_type(kind), expected);
    }

    #[test_case(Some("image"), Some("https://cdn/x.jpg"), Some("image"); "image is described")]
    #[test_case(Some("ptt"), Some("https://cdn/x.ogg"), Some("audio"); "voice is transcribed")]
    #[test_case(Some("video"), Some("https://cdn/x.mp4"), Some("audio"); "video is transcribed")]
    #[test_case(Some("audio"), None, None; "no url")]
    #[test_case(Some("audio"), Some(""), None; "empty url")]
    #[test_case(Some("document"), Some("https://cdn/x.pdf"), None; "documents are not")]
    fn transcriptions(kind: Option<&str>, url: Option<&str>, expected: Option<&str>) {
        assert_eq!(transcription_kind(kind, url), expected);
    }

    #[test]
    fn text_falls_back_to_caption_then_body() {
        let message = WebhookMessage {
            content: Some(String::new()),
            caption: Some("legenda".to_string()),
            body: Some("corpo".to_string()),
            ..Default::default()
        };
        assert_eq!(message_text(&message), "legenda");
        assert_eq!(message_text(&WebhookMessage::default()), "");
    }

    #[test]
    fn previews_are_truncated_or_typed() {
        assert_eq!(preview(&"a".repeat(150), "text").chars().count(), 100);
        assert_eq!(preview("", "audio"), "[audio]");
    }

    #[test_case(None, 3, false, 1)]
    #[test_case(Some(0), 3, false, 1)]
    #[test_case(Some(2), 3, false, 2)]
    #[test_case(Some(3), 3, true, 3)]
    fn retries(read_ct: Option<i64>, max: i64, archive: bool, count: i64) {
        assert_eq!(should_archive(read_ct, max), archive);
        assert_eq!(retry_count(read_ct), count);
    }

    #[tokio::test]
    async fn processor_failures_carry_the_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/functions/v1/ai-process-conversation")
            .match_header("authorization", "Bearer key")
            .match_body(Matcher::PartialJson(json!({"conversation_id": "c1"})))
            .with_status(500)
            .with_body("agent offline")
            .create_async()
            .await;

        let job = QueueJob {
            conversation_id: Some("c1".to_string()),
            ..Default::default()
        };
        let base: Url = server.url().parse().unwrap();
        let error = process_conversation(&Client::new(), &base, "key", &job)
            .await
            .unwrap_err();
        assert_eq!(error.error_message(), "Process conversation failed: agent offline");
    }

    #[tokio::test]
    async fn processor_answers_must_be_json() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/functions/v1/ai-process-conversation")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let base: Url = server.url().parse().unwrap();
        let error = process_conversation(&Client::new(), &base, "key", &QueueJob::default())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Provider(_)));
        assert!(error
            .error_message()
            .starts_with("Process conversation returned an invalid body"));
    }

    #[tokio::test]
    async fn processor_answers_are_returned() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/functions/v1/ai-process-conversation")
            .with_status(200)
            .with_body(r#"{"replied":true}"#)
            .create_async()
            .await;

        let base: Url = server.url().parse().unwrap();
        let result = process_conversation(&Client::new(), &base, "key", &QueueJob::default())
            .await
            .unwrap();
        assert_eq!(result, json!({"replied": true}));
    }
}
