//! Outbound text messages through the WhatsApp providers.
//!
//! Two providers are supported. Evolution is addressed by instance name and
//! authenticates with an `apikey` header; Uazapi is addressed by its
//! instance token alone.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::common::error::Error;
use crate::config::WhatsappConfig;

/// WhatsApp provider backing an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Evolution API.
    Evolution,
    /// Uazapi.
    Uazapi,
}

impl Provider {
    /// Provider from an `instances.provider_type` value. Anything that is
    /// not Uazapi, including a missing value, is served by Evolution.
    pub fn from_type(provider_type: Option<&str>) -> Self {
        match provider_type.map(str::trim) {
            Some(kind) if kind.eq_ignore_ascii_case("uazapi") => Provider::Uazapi,
            _ => Provider::Evolution,
        }
    }

    /// Lowercase name of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Evolution => "evolution",
            Provider::Uazapi => "uazapi",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keep only the digits of a phone number.
pub fn digits_only(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Uazapi wants numbers with the country code; local Brazilian numbers (10
/// or 11 digits) get `55` in front.
pub fn uazapi_number(phone: &str) -> String {
    let digits = digits_only(phone);
    match digits.len() {
        10 | 11 => format!("55{digits}"),
        _ => digits,
    }
}

/// Message id assigned by the provider, looked up in `key.id`,
/// `message.key.id` and `id`, in that order.
pub fn provider_message_id(response: &Value) -> Option<String> {
    [
        response.pointer("/key/id"),
        response.pointer("/message/key/id"),
        response.get("id"),
    ]
    .into_iter()
    .flatten()
    .find_map(|value| match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

/// Sends text messages through whichever provider backs an instance.
#[derive(Debug, Clone)]
pub struct WhatsappClient {
    http: Client,
    evolution_url: Option<Url>,
    uazapi_url: Url,
    delay_ms: u64,
}

impl WhatsappClient {
    /// Create a client from the configuration.
    pub fn new(http: Client, config: &WhatsappConfig) -> Self {
        Self {
            http,
            evolution_url: config.evolution_api_url.clone(),
            uazapi_url: config.uazapi_default_url.clone(),
            delay_ms: config.send_delay_ms,
        }
    }

    /// Send `text` to `number` and return the provider's response body.
    pub async fn send_text(
        &self,
        provider: Provider,
        instance_name: &str,
        token: &str,
        number: &str,
        text: &str,
    ) -> Result<Value, Error> {
        debug!(%provider, instance_name, "sending text message");
        match provider {
            Provider::Evolution => self.send_evolution(instance_name, token, number, text).await,
            Provider::Uazapi => self.send_uazapi(token, number, text).await,
        }
    }

    async fn send_evolution(
        &self,
        instance_name: &str,
        token: &str,
        number: &str,
        text: &str,
    ) -> Result<Value, Error> {
        let base = self.evolution_url.as_ref().ok_or_else(|| {
            Error::HttpRequest(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Evolution API URL not configured".to_string(),
            )
        })?;
        let url = join_segments(base, &["message", "sendText", instance_name])?;

        let body = json!({
            "number": number,
            "text": text,
            "delay": self.delay_ms,
            "linkPreview": true,
        });
        let response = self
            .http
            .post(url)
            .header("apikey", token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("message").and_then(error_text))
                .unwrap_or_else(|| format!("Evolution API error: {}", status.as_u16()));
            warn!(%status, message, "evolution send failed");
            return Err(Error::Provider(message));
        }

        Ok(response.json().await?)
    }

    async fn send_uazapi(&self, token: &str, number: &str, text: &str) -> Result<Value, Error> {
        let url = join_segments(&self.uazapi_url, &["send", "text"])?;

        let body = json!({
            "number": uazapi_number(number),
            "text": text,
            "delay": self.delay_ms,
            "readchat": true,
            "readmessages": true,
        });
        let response = self
            .http
            .post(url)
            .header("token", token)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, text, "uazapi send failed");
            return Err(Error::Provider(format!("Uazapi API error: {text}")));
        }

        Ok(response.json().await?)
    }
}

/// Evolution puts either a string or a list of strings in `message`.
fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(items) => items.iter().find_map(error_text),
        _ => None,
    }
}

fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, Error> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::InvalidEndpoint(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use test_case::test_case;

    use super::*;

    fn client(server_url: &str) -> WhatsappClient {
        WhatsappClient::new(
            Client::new(),
            &WhatsappConfig {
                evolution_api_url: Some(format!("{server_url}/evo/").parse().unwrap()),
                evolution_api_key: None,
                uazapi_default_url: server_url.parse().unwrap(),
                send_delay_ms: 1200,
            },
        )
    }

    #[test_case(None, Provider::Evolution; "missing")]
    #[test_case(Some("evolution"), Provider::Evolution; "evolution")]
    #[test_case(Some("Uazapi"), Provider::Uazapi; "uazapi")]
    #[test_case(Some("zapi"), Provider::Evolution; "unknown")]
    fn provider_types(kind: Option<&str>, expected: Provider) {
        assert_eq!(Provider::from_type(kind), expected);
    }

    #[test_case("(83) 99999-1234", "5583999991234"; "mobile")]
    #[test_case("8333221100", "558333221100"; "landline")]
    #[test_case("+55 83 99999-1234", "5583999991234"; "already international")]
    fn uazapi_numbers(input: &str, expected: &str) {
        assert_eq!(uazapi_number(input), expected);
    }

    #[test]
    fn message_id_lookup_order() {
        assert_eq!(
            provider_message_id(&json!({"key": {"id": "A"}, "id": "C"})),
            Some("A".to_string())
        );
        assert_eq!(
            provider_message_id(&json!({"message": {"key": {"id": "B"}}})),
            Some("B".to_string())
        );
        assert_eq!(provider_message_id(&json!({"id": "C"})), Some("C".to_string()));
        assert_eq!(provider_message_id(&json!({"status": "ok"})), None);
    }

    #[tokio::test]
    async fn evolution_send_encodes_instance_name() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/evo/message/sendText/Loja%20Centro")
            .match_header("apikey", "evo-token")
            .match_body(Matcher::PartialJson(json!({
                "number": "5583999991234",
                "text": "Olá",
                "delay": 1200,
                "linkPreview": true,
            })))
            .with_status(201)
            .with_body(r#"{"key": {"id": "MSG1"}}"#)
            .expect(1)
            .create_async()
            .await;

        let response = client(&server.url())
            .send_text(Provider::Evolution, "Loja Centro", "evo-token", "5583999991234", "Olá")
            .await
            .unwrap();

        assert_eq!(provider_message_id(&response), Some("MSG1".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn evolution_errors_forward_the_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/evo/message/sendText/inst")
            .with_status(400)
            .with_body(r#"{"status": 400, "message": ["number not on whatsapp"]}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .send_text(Provider::Evolution, "inst", "t", "1", "x")
            .await
            .unwrap_err();

        assert_eq!(err.error_message(), "number not on whatsapp");
    }

    #[tokio::test]
    async fn evolution_errors_without_body_use_the_status() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/evo/message/sendText/inst")
            .with_status(503)
            .create_async()
            .await;

        let err = client(&server.url())
            .send_text(Provider::Evolution, "inst", "t", "1", "x")
            .await
            .unwrap_err();

        assert_eq!(err.error_message(), "Evolution API error: 503");
    }

    #[tokio::test]
    async fn uazapi_send_uses_token_header_and_country_code() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/send/text")
            .match_header("token", "uaz-token")
            .match_body(Matcher::PartialJson(json!({
                "number": "5583999991234",
                "readchat": true,
                "readmessages": true,
            })))
            .with_status(200)
            .with_body(r#"{"id": "UAZ1"}"#)
            .create_async()
            .await;

        let response = client(&server.url())
            .send_text(Provider::Uazapi, "ignored", "uaz-token", "83999991234", "oi")
            .await
            .unwrap();

        assert_eq!(provider_message_id(&response), Some("UAZ1".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn uazapi_errors_carry_the_body_text() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/send/text")
            .with_status(401)
            .with_body("invalid token")
            .create_async()
            .await;

        let err = client(&server.url())
            .send_text(Provider::Uazapi, "i", "bad", "1", "x")
            .await
            .unwrap_err();

        assert_eq!(err.error_message(), "Uazapi API error: invalid token");
    }
}
