//! Follow-ups for conversations that went quiet: picking the category of a
//! conversation with a model, and cleaning up stored templates before they
//! are sent.

use serde_json::{json, Value};

use crate::database::entries::follow_up::{CategoryEntry, FollowUpAiConfigEntry, TranscriptEntry};
use crate::openrouter::{ChatMessage, ChatRequest};

/// Title of category requests.
pub const PICKER_TITLE: &str = "PescaLead Follow-up";

/// Reason stored on jobs that ran out of templates.
pub const ALL_TEMPLATES_SENT: &str = "Todos os modelos enviados";

const DEFAULT_MODEL: &str = "x-ai/grok-4-fast";
const DEFAULT_TEMPERATURE: f64 = 0.3;
const DEFAULT_MAX_TOKENS: u32 = 50;
const DEFAULT_SYSTEM_PROMPT: &str = "Você é um assistente que analisa conversas e seleciona a categoria de follow-up mais apropriada.";
const DEFAULT_PROMPT_TEMPLATE: &str = "Analise a conversa abaixo e escolha a categoria de follow-up mais apropriada.\n\nCONVERSA:\n{{conversation}}\n\nCATEGORIAS DISPONÍVEIS:\n{{categories}}\n\nResponda APENAS com o nome exato da categoria escolhida, sem explicações.";

/// How the category picker calls the model.
#[derive(Debug, Clone, PartialEq)]
pub struct PickerSettings {
    /// OpenRouter model slug.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion budget.
    pub max_tokens: u32,
    /// System prompt.
    pub system_prompt: String,
    /// User prompt with `{{conversation}}` and `{{categories}}`.
    pub prompt_template: String,
}

impl Default for PickerSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl From<Option<FollowUpAiConfigEntry>> for PickerSettings {
    fn from(entry: Option<FollowUpAiConfigEntry>) -> Self {
        let defaults = Self::default();
        let Some(entry) = entry else {
            return defaults;
        };
        let text = |value: Option<String>, default: String| {
            value.filter(|value| !value.trim().is_empty()).unwrap_or(default)
        };
        Self {
            model: text(entry.model, defaults.model),
            temperature: entry
                .temperature
                .filter(|t| *t != 0.0)
                .unwrap_or(defaults.temperature),
            max_tokens: entry.max_tokens.filter(|n| *n > 0).unwrap_or(defaults.max_tokens),
            system_prompt: text(entry.system_prompt, defaults.system_prompt),
            prompt_template: text(entry.prompt_template, defaults.prompt_template),
        }
    }
}

/// Recent messages, given newest first, as an oldest first transcript.
pub fn render_transcript(messages: &[TranscriptEntry]) -> String {
    if messages.is_empty() {
        return "Sem mensagens".to_string();
    }
    messages
        .iter()
        .rev()
        .map(|message| {
            let speaker = match message.message_type.as_deref() {
                Some("sent") => "Atendente",
                _ => "Cliente",
            };
            let text = message
                .text_content
                .as_deref()
                .filter(|text| !text.is_empty())
                .unwrap_or("[mídia]");
            format!("{speaker}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per category with its instructions.
pub fn render_categories(categories: &[CategoryEntry]) -> String {
    categories
        .iter()
        .map(|category| {
            format!(
                "- {}: {}",
                category.name,
                category.ai_instructions.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The picker prompt: the first `{{conversation}}` and `{{categories}}` of
/// the template filled in.
pub fn render_prompt(template: &str, conversation: &str, categories: &str) -> String {
    template
        .replacen("{{conversation}}", conversation, 1)
        .replacen("{{categories}}", categories, 1)
}

/// Request for the category of a conversation.
pub fn picker_request(settings: &PickerSettings, prompt: String) -> ChatRequest {
    ChatRequest {
        model: settings.model.clone(),
        messages: vec![
            ChatMessage::system(settings.system_prompt.clone()),
            ChatMessage::user(prompt),
        ],
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    }
}

/// Category named by the model, ignoring case.
pub fn match_category<'a>(categories: &'a [CategoryEntry], answer: &str) -> Option<&'a CategoryEntry> {
    let answer = answer.trim().to_lowercase();
    categories
        .iter()
        .find(|category| category.name.to_lowercase() == answer)
}

/// Decision log when no model was asked, e.g. `single_category` or
/// `no_api_key`.
pub fn unasked_log(reason: &str, category: &CategoryEntry, workspace_id: &str, at: &str) -> Value {
    json!({
        "skipped": true,
        "reason": reason,
        "category_name": category.name,
        "workspace_id": workspace_id,
        "selected_at": at,
    })
}

/// Decision log when the model named a category.
pub fn chosen_log(
    settings: &PickerSettings,
    answer: &str,
    category: &CategoryEntry,
    workspace_id: &str,
    duration_ms: u64,
    tokens_used: u64,
    at: &str,
) -> Value {
    json!({
        "model": settings.model,
        "temperature": settings.temperature,
        "selected_name": answer,
        "category_id": category.id,
        "workspace_id": workspace_id,
        "duration_ms": duration_ms,
        "tokens_used": tokens_used,
        "selected_at": at,
    })
}

/// Decision log when the model answered with an unknown category.
pub fn unmatched_log(
    settings: &PickerSettings,
    answer: &str,
    fallback: &CategoryEntry,
    workspace_id: &str,
    duration_ms: u64,
    at: &str,
) -> Value {
    json!({
        "model": settings.model,
        "ai_response": answer,
        "fallback": true,
        "fallback_category": fallback.name,
        "workspace_id": workspace_id,
        "duration_ms": duration_ms,
        "selected_at": at,
    })
}

/// Decision log when picking failed and the first category was used.
pub fn failed_log(error: &str, fallback: Option<&CategoryEntry>, workspace_id: &str, at: &str) -> Value {
    json!({
        "error": true,
        "error_message": error,
        "fallback_category": fallback.map(|category| category.name.as_str()),
        "workspace_id": workspace_id,
        "selected_at": at,
    })
}

/// A stored template as it should be sent: wrapping quotes removed and
/// escaped quotes and backslashes unescaped.
pub fn sanitize_template_message(message: &str) -> String {
    let mut text = message.trim();
    for quote in ['"', '\''] {
        if text.starts_with(quote) && text.ends_with(quote) {
            text = text.get(1..text.len() - 1).unwrap_or_default();
        }
    }

    let mut collapsed = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '"' && collapsed.ends_with('"') {
            continue;
        }
        collapsed.push(c);
    }

    collapsed
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
        .trim()
        .to_string()
}
