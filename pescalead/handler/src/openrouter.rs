//! Chat completions through OpenRouter.
//!
//! Used to write campaign openers, to split them into several WhatsApp
//! messages and to pick the follow-up category of a conversation. A `429`
//! is retried after the `Retry-After` the service asks for.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::common::error::Error;
use crate::config::OpenRouterConfig;

/// Longest wait honored from a `Retry-After` header.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Wait used when a `429` carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// One message of a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// `system` or `user`.
    pub role: &'static str,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Instructions for the model.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    /// The question.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

/// A chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model slug, e.g. `x-ai/grok-4-fast`.
    pub model: String,
    /// The conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Completion budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Token accounting of a completion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Both.
    #[serde(default)]
    pub total_tokens: u64,
}

/// The first choice of a completion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Trimmed text of the first choice; empty when the model sent nothing.
    pub content: String,
    /// Token accounting.
    pub usage: Usage,
}

/// OpenRouter client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: Client,
    url: Url,
    api_key: Option<String>,
    referer: String,
    timeout: Duration,
    max_attempts: u32,
}

impl OpenRouterClient {
    /// Create a client from the configuration.
    pub fn new(http: Client, config: &OpenRouterConfig) -> Self {
        Self {
            http,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            referer: config.referer.clone(),
            timeout: config.timeout,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Key from the settings, when one is configured there.
    pub fn configured_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Run a completion with `api_key`, tagging the request with `title`.
    pub async fn complete(
        &self,
        api_key: &str,
        title: &str,
        request: &ChatRequest,
    ) -> Result<Completion, Error> {
        let mut attempt = 1;
        loop {
            debug!(model = request.model, attempt, "chat completion");
            let response = self
                .http
                .post(self.url.clone())
                .bearer_auth(api_key)
                .header("HTTP-Referer", &self.referer)
                .header("X-Title", title)
                .timeout(self.timeout)
                .json(request)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.max_attempts {
                    return Err(Error::Provider(format!(
                        "Rate limit exceeded after {} attempts",
                        self.max_attempts
                    )));
                }
                let wait = retry_after(
                    response
                        .headers()
                        .get("retry-after")
                        .and_then(|value| value.to_str().ok()),
                );
                warn!(?wait, attempt, "openrouter rate limited, retrying");
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(Error::Provider(format!(
                    "OpenRouter error: {} - {text}",
                    status.as_u16()
                )));
            }

            let bytes = response.bytes().await?;
            let body: CompletionBody =
                serde_json::from_slice(&bytes).map_err(Error::upstream_decode)?;
            let content = body
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message)
                .and_then(|message| message.content)
                .unwrap_or_default()
                .trim()
                .to_string();
            return Ok(Completion {
                content,
                usage: body.usage.unwrap_or_default(),
            });
        }
    }
}

/// Wait asked for by a `Retry-After` header, in seconds, capped at a
/// minute.
pub fn retry_after(header: Option<&str>) -> Duration {
    header
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
        .min(MAX_RETRY_AFTER)
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn client(server: &Server) -> OpenRouterClient {
        let config = OpenRouterConfig {
            url: format!("{}/api/v1/chat/completions", server.url()).parse().unwrap(),
            api_key: None,
            referer: "https://pescalead.com".to_string(),
            timeout: Duration::from_secs(5),
            max_attempts: 2,
        };
        OpenRouterClient::new(Client::new(), &config)
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "x-ai/grok-4-fast".to_string(),
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("oi")],
            max_tokens: 50,
            temperature: 0.3,
        }
    }

    #[test_case(Some("5"), 5; "seconds")]
    #[test_case(Some("600"), 60; "capped")]
    #[test_case(Some("soon"), 60; "unparsable")]
    #[test_case(None, 60; "missing")]
    fn retry_waits(header: Option<&str>, seconds: u64) {
        assert_eq!(retry_after(header), Duration::from_secs(seconds));
    }

    #[tokio::test]
    async fn first_choice_is_trimmed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/chat/completions")
            .match_header("authorization", "Bearer or-key")
            .match_header("x-title", "PescaLead Campaign")
            .match_body(Matcher::PartialJson(json!({"model": "x-ai/grok-4-fast", "max_tokens": 50})))
            .with_status(200)
            .with_body(
                json!({
                    "choices": [{"message": {"content": "  Olá, tudo bem?  "}}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let completion = client(&server)
            .complete("or-key", "PescaLead Campaign", &request())
            .await
            .unwrap();

        assert_eq!(completion.content, "Olá, tudo bem?");
        assert_eq!(completion.usage.total_tokens, 15);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limits_are_retried() {
        let mut server = Server::new_async().await;
        let limited = server
            .mock("POST", "/api/v1/chat/completions")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(2)
            .create_async()
            .await;

        let error = client(&server)
            .complete("or-key", "PescaLead Campaign", &request())
            .await
            .unwrap_err();

        assert_eq!(error.error_message(), "Rate limit exceeded after 2 attempts");
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn failures_carry_status_and_body() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/chat/completions")
            .with_status(402)
            .with_body("insufficient credits")
            .create_async()
            .await;

        let error = client(&server)
            .complete("or-key", "PescaLead Campaign", &request())
            .await
            .unwrap_err();

        assert_eq!(error.error_message(), "OpenRouter error: 402 - insufficient credits");
    }
}
