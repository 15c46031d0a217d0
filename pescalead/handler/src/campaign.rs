//! Campaign openers: the lead summary the model writes from, the prompts for
//! writing and splitting the opener, and the retry schedule of failed
//! messages.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;

use crate::common::truncate_chars;
use crate::config::CampaignConfig;
use crate::database::entries::campaign::SplitterConfigEntry;
use crate::openrouter::{ChatMessage, ChatRequest};

/// Vault secret holding the OpenRouter key.
pub const OPENROUTER_SECRET: &str = "OPENROUTER_API_KEY";

/// Title of opener requests.
pub const GENERATION_TITLE: &str = "PescaLead Campaign";

/// Title of split requests.
pub const SPLIT_TITLE: &str = "PescaLead Campaign Splitter";

/// Prompt used when a campaign has no instructions.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Você é um assistente de vendas. Gere uma mensagem de primeiro contato profissional e personalizada.";

/// Openers shorter than this are rejected.
pub const MIN_MESSAGE_CHARS: usize = 10;

/// Longest part accepted from the splitter.
pub const MAX_PART_CHARS: usize = 1000;

/// Characters of a failure kept in the message row.
pub const ERROR_CHARS: usize = 200;

const MAX_SPLIT_PARTS: i64 = 5;
const DEFAULT_SPLIT_PARTS: usize = 3;
const GENERATION_MAX_TOKENS: u32 = 500;
const GENERATION_TEMPERATURE: f64 = 0.7;

/// Custom fields shown first, in this order.
const PRIORITY_FIELDS: [&str; 13] = [
    "Categoria",
    "CNAE Principal",
    "Porte da Empresa",
    "Razão Social",
    "Rating",
    "Avaliações",
    "Endereço",
    "Cidade/UF",
    "Website Principal",
    "Email",
    "WHOIS Responsável",
    "Capital Social",
    "Data Abertura",
];

/// Other custom fields considered, at most.
const OTHER_FIELDS: usize = 10;

/// Other custom fields this long or longer are left out.
const OTHER_FIELD_CHARS: usize = 200;

/// Batch size for a caller supplied value; anything outside
/// `1..=max_batch_size` falls back to the default.
pub fn batch_size(requested: Option<&Value>, config: &CampaignConfig) -> u32 {
    requested
        .and_then(Value::as_i64)
        .filter(|size| (1..=i64::from(config.max_batch_size)).contains(size))
        .and_then(|size| u32::try_from(size).ok())
        .unwrap_or(config.default_batch_size)
}

/// Parts an opener may be split into: the campaign setting when within
/// `1..=5`, else three.
pub fn split_parts(max_split_parts: Option<i64>) -> usize {
    max_split_parts
        .filter(|parts| (1..=MAX_SPLIT_PARTS).contains(parts))
        .and_then(|parts| usize::try_from(parts).ok())
        .unwrap_or(DEFAULT_SPLIT_PARTS)
}

/// Time zone of a campaign, falling back to `default` when unset or
/// unknown.
pub fn campaign_timezone(configured: Option<&str>, default: &str) -> Tz {
    configured
        .and_then(|name| name.parse::<Tz>().ok())
        .or_else(|| default.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::America::Sao_Paulo)
}

/// Whether the local time in `timezone` is past `end_time` (`HH:MM` or
/// `HH:MM:SS`). An unreadable end time never stops a run.
pub fn end_time_passed(end_time: &str, timezone: Tz, now: DateTime<Utc>) -> bool {
    let end_time = end_time.trim();
    let Ok(end) = NaiveTime::parse_from_str(end_time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(end_time, "%H:%M"))
    else {
        return false;
    };
    now.with_timezone(&timezone).time() > end
}

/// Why a message of a run that stopped is skipped.
pub fn stopped_run_reason(status: Option<&str>) -> String {
    format!(
        "Campanha {} - mensagem cancelada antes do envio",
        status.unwrap_or("não encontrada")
    )
}

/// A number the way Brazilians write it, up to three decimals.
pub fn pt_br_number(value: f64) -> String {
    let text = format!("{:.3}", value.abs());
    let (integer, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');

    let mut grouped = String::new();
    if value < 0.0 && (integer != "0" || !fraction.is_empty()) {
        grouped.push('-');
    }
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    if !fraction.is_empty() {
        grouped.push(',');
        grouped.push_str(fraction);
    }
    grouped
}

/// Text of a value worth showing; empty strings, zeros, `false` and nulls
/// are not.
fn shown(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) if number.as_f64() != Some(0.0) => Some(number.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        _ => None,
    }
}

fn field(context: &Value, name: &str) -> Option<String> {
    context.get(name).and_then(shown)
}

/// Plain text summary of a lead, in sections, for the opener prompt.
pub fn format_lead_context(context: &Value) -> String {
    if context.is_null() {
        return "Dados do lead não disponíveis.".to_string();
    }

    let mut lines = vec!["📋 DADOS BÁSICOS:".to_string()];
    if let Some(name) = field(context, "client_name") {
        lines.push(format!("- Nome: {name}"));
    }
    if let Some(company) = field(context, "company") {
        lines.push(format!("- Empresa: {company}"));
    }
    match context.get("deal_value") {
        Some(Value::Number(value)) => {
            if let Some(value) = value.as_f64().filter(|value| *value != 0.0) {
                lines.push(format!("- Valor potencial: R$ {}", pt_br_number(value)));
            }
        }
        Some(value) => {
            if let Some(value) = shown(value) {
                lines.push(format!("- Valor potencial: R$ {value}"));
            }
        }
        None => {}
    }
    if let Some(priority) = field(context, "priority") {
        lines.push(format!("- Prioridade: {priority}"));
    }
    if let Some(Value::Array(tags)) = context.get("tags") {
        if !tags.is_empty() {
            let tags: Vec<String> = tags
                .iter()
                .map(|tag| match tag {
                    Value::String(tag) => tag.clone(),
                    other => other.to_string(),
                })
                .collect();
            lines.push(format!("- Tags: {}", tags.join(", ")));
        }
    }

    if let Some(name) = field(context, "whatsapp_name") {
        lines.push(String::new());
        lines.push("📱 WHATSAPP:".to_string());
        lines.push(format!("- Nome no WhatsApp: {name}"));
    }

    let funnel = field(context, "funnel_name");
    let column = field(context, "column_name");
    if funnel.is_some() || column.is_some() {
        lines.push(String::new());
        lines.push("📊 LOCALIZAÇÃO NO CRM:".to_string());
        if let Some(funnel) = funnel {
            lines.push(format!("- Funil: {funnel}"));
        }
        if let Some(column) = column {
            lines.push(format!("- Etapa: {column}"));
        }
    }

    let Some(custom) = context.get("custom_fields").and_then(Value::as_object) else {
        return lines.join("\n");
    };

    let priority: Vec<String> = PRIORITY_FIELDS
        .iter()
        .filter_map(|name| {
            custom
                .get(*name)
                .and_then(shown)
                .map(|value| format!("- {name}: {value}"))
        })
        .collect();
    if !priority.is_empty() {
        lines.push(String::new());
        lines.push("🔧 INFORMAÇÕES ADICIONAIS:".to_string());
        lines.extend(priority);
    }

    let others: Vec<String> = custom
        .iter()
        .filter(|(name, _)| !PRIORITY_FIELDS.contains(&name.as_str()))
        .take(OTHER_FIELDS)
        .filter_map(|(name, value)| match value {
            Value::String(text)
                if text.chars().count() < OTHER_FIELD_CHARS && !text.starts_with("[{") =>
            {
                Some(format!("- {name}: {text}"))
            }
            _ => None,
        })
        .collect();
    if !others.is_empty() {
        lines.push(String::new());
        lines.push("📝 OUTROS DADOS:".to_string());
        lines.extend(others);
    }

    lines.join("\n")
}

/// Request for the opener of a lead.
pub fn generation_request(model: &str, system_prompt: &str, lead_context: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(format!(
                "Gere uma mensagem de primeiro contato para este lead:\n\n{lead_context}\n\nRetorne APENAS a mensagem, sem explicações."
            )),
        ],
        max_tokens: GENERATION_MAX_TOKENS,
        temperature: GENERATION_TEMPERATURE,
    }
}

/// Splitter behavior, from the active settings row or the defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitterSettings {
    /// Shorter openers are sent whole.
    pub min_chars: usize,
    /// Pause between parts, in milliseconds.
    pub delay_ms: u64,
    /// Completion budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for SplitterSettings {
    fn default() -> Self {
        Self {
            min_chars: 150,
            delay_ms: 500,
            max_tokens: 1000,
            temperature: 0.1,
        }
    }
}

impl From<Option<SplitterConfigEntry>> for SplitterSettings {
    fn from(entry: Option<SplitterConfigEntry>) -> Self {
        let defaults = Self::default();
        let Some(entry) = entry else {
            return defaults;
        };
        Self {
            min_chars: entry.min_chars_to_split.filter(|n| *n > 0).unwrap_or(defaults.min_chars),
            delay_ms: entry
                .delay_between_messages
                .filter(|n| *n > 0)
                .unwrap_or(defaults.delay_ms),
            max_tokens: entry.max_tokens.filter(|n| *n > 0).unwrap_or(defaults.max_tokens),
            temperature: entry
                .temperature
                .filter(|t| *t != 0.0)
                .unwrap_or(defaults.temperature),
        }
    }
}

/// Instructions for the splitter, allowing at most `max_parts` parts.
pub fn splitter_prompt(max_parts: usize) -> String {
    format!(
        "Você é um SEPARADOR DE TEXTO especializado. Sua única função é dividir mensagens em partes menores.

### REGRAS ###
1. Divida o texto em NO MÁXIMO {max_parts} partes
2. Se o texto for curto, use MENOS partes (pode ser apenas 1)
3. Use pontos finais (.) como pontos de divisão
4. NUNCA divida listas - mantenha-as na mesma parte
5. PRESERVE exatamente o texto original, sem alterar nada
6. Cada parte deve ser uma unidade coerente

### FORMATO DE SAÍDA ###
Responda APENAS com JSON:
{{\"messages\": [\"parte1\", \"parte2\"]}}

IMPORTANTE: Máximo de {max_parts} partes!"
    )
}

/// Request splitting `message` into at most `max_parts` parts.
pub fn split_request(
    model: &str,
    message: &str,
    max_parts: usize,
    settings: &SplitterSettings,
) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(splitter_prompt(max_parts)),
            ChatMessage::user(message),
        ],
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    }
}

#[derive(Deserialize)]
struct SplitAnswer {
    messages: Option<Vec<Value>>,
}

/// Parts from a splitter answer: a `{"messages": [...]}` object, possibly
/// inside a markdown fence. Blank and overlong parts are dropped and at most
/// `max_parts` kept. The error explains why nothing usable came back.
pub fn parse_split_response(text: &str, max_parts: usize) -> Result<Vec<String>, String> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let answer: SplitAnswer = serde_json::from_str(cleaned.trim())
        .map_err(|error| format!("Parse error: {error}"))?;
    let Some(messages) = answer.messages else {
        return Err("Invalid response format: messages array not found".to_string());
    };

    let parts: Vec<String> = messages
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|part| !part.is_empty() && part.chars().count() <= MAX_PART_CHARS)
        .take(max_parts)
        .map(str::to_string)
        .collect();
    if parts.is_empty() {
        return Err("No valid messages found in response".to_string());
    }
    Ok(parts)
}

/// What to do with a message whose attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPlan {
    /// Try again after `delay_minutes`.
    Retry {
        /// Failed attempts so far.
        attempt: u32,
        /// Wait before the next attempt.
        delay_minutes: u64,
    },
    /// Fail the message for good.
    GiveUp {
        /// Failed attempts so far.
        attempt: u32,
    },
}

/// Plan for a message that already failed `retry_count` times.
pub fn retry_plan(retry_count: Option<u32>, config: &CampaignConfig) -> RetryPlan {
    let attempt = retry_count.unwrap_or_default().saturating_add(1);
    if attempt >= config.max_retries {
        return RetryPlan::GiveUp { attempt };
    }
    let index = usize::try_from(attempt - 1).unwrap_or(usize::MAX);
    let delay_minutes = config
        .retry_backoff_minutes
        .get(index)
        .or(config.retry_backoff_minutes.last())
        .copied()
        .unwrap_or_default();
    RetryPlan::Retry { attempt, delay_minutes }
}

/// Error kept on a message that will be retried.
pub fn retry_message(attempt: u32, max_retries: u32, error: &str) -> String {
    format!("Retry {attempt}/{max_retries}: {}", truncate_chars(error, ERROR_CHARS))
}

/// Error kept on a message that failed for good.
pub fn give_up_message(max_retries: u32, error: &str) -> String {
    format!(
        "Max retries ({max_retries}) exceeded: {}",
        truncate_chars(error, ERROR_CHARS)
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::config::Settings;

    fn config() -> CampaignConfig {
        Settings::new_from_default_config().unwrap().campaign
    }

    #[test_case(None, 5; "missing")]
    #[test_case(Some(json!(20)), 20; "in range")]
    #[test_case(Some(json!(100)), 100; "upper bound")]
    #[test_case(Some(json!(0)), 5; "zero")]
    #[test_case(Some(json!(101)), 5; "too large")]
    #[test_case(Some(json!("10")), 5; "not a number")]
    fn batch_sizes(requested: Option<Value>, expected: u32) {
        assert_eq!(batch_size(requested.as_ref(), &config()), expected);
    }

    #[test_case(None, 3; "unset")]
    #[test_case(Some(1), 1; "one")]
    #[test_case(Some(5), 5; "five")]
    #[test_case(Some(0), 3; "zero")]
    #[test_case(Some(6), 3; "six")]
    fn split_part_limits(configured: Option<i64>, expected: usize) {
        assert_eq!(split_parts(configured), expected);
    }

    #[test]
    fn end_time_is_local_to_the_campaign() {
        // 21:30 UTC is 18:30 in São Paulo.
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 21, 30, 0).unwrap();
        let sao_paulo = campaign_timezone(None, "America/Sao_Paulo");

        assert!(end_time_passed("18:00", sao_paulo, now));
        assert!(end_time_passed("18:29:59", sao_paulo, now));
        assert!(!end_time_passed("19:00:00", sao_paulo, now));
        assert!(!end_time_passed("end of day", sao_paulo, now));

        let utc = campaign_timezone(Some("UTC"), "America/Sao_Paulo");
        assert!(!end_time_passed("22:00", utc, now));
    }

    #[test]
    fn unknown_timezones_use_the_default() {
        assert_eq!(
            campaign_timezone(Some("Mars/Olympus"), "America/Manaus"),
            chrono_tz::America::Manaus
        );
    }

    #[test_case(1500.0, "1.500"; "thousands")]
    #[test_case(1234567.891, "1.234.567,891"; "millions with decimals")]
    #[test_case(99.5, "99,5"; "decimals")]
    #[test_case(-2500.25, "-2.500,25"; "negative")]
    fn brazilian_numbers(value: f64, expected: &str) {
        assert_eq!(pt_br_number(value), expected);
    }

    #[test]
    fn lead_context_has_sections() {
        let context = json!({
            "client_name": "Padaria Pão Bom",
            "company": "Pão Bom LTDA",
            "deal_value": 15000,
            "priority": "high",
            "tags": ["padaria", "centro"],
            "whatsapp_name": "Seu Zé",
            "funnel_name": "Vendas",
            "column_name": "Novo",
            "custom_fields": {
                "Cidade/UF": "Recife/PE",
                "Categoria": "Padaria",
                "Horário": "6h às 20h",
                "Sócios": "[{\"nome\":\"José\"}]",
                "Observação": "x".repeat(200),
                "Funcionários": 12
            }
        });

        let expected = "📋 DADOS BÁSICOS:
- Nome: Padaria Pão Bom
- Empresa: Pão Bom LTDA
- Valor potencial: R$ 15.000
- Prioridade: high
- Tags: padaria, centro

📱 WHATSAPP:
- Nome no WhatsApp: Seu Zé

📊 LOCALIZAÇÃO NO CRM:
- Funil: Vendas
- Etapa: Novo

🔧 INFORMAÇÕES ADICIONAIS:
- Categoria: Padaria
- Cidade/UF: Recife/PE

📝 OUTROS DADOS:
- Horário: 6h às 20h";
        assert_eq!(format_lead_context(&context), expected);
    }

    #[test]
    fn sparse_leads_only_get_the_header() {
        assert_eq!(
            format_lead_context(&json!({"client_name": "", "deal_value": 0})),
            "📋 DADOS BÁSICOS:"
        );
        assert_eq!(format_lead_context(&Value::Null), "Dados do lead não disponíveis.");
    }

    #[test]
    fn generation_asks_for_the_message_only() {
        let request = generation_request("openai/gpt-4o-mini", DEFAULT_SYSTEM_PROMPT, "ctx");
        assert_eq!(request.max_tokens, 500);
        assert_eq!(request.messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert!(request.messages[1].content.contains("\n\nctx\n\n"));
        assert!(request.messages[1].content.ends_with("sem explicações."));
    }

    #[test]
    fn splitter_prompt_states_the_part_limit() {
        let prompt = splitter_prompt(2);
        assert!(prompt.contains("NO MÁXIMO 2 partes"));
        assert!(prompt.contains("{\"messages\": [\"parte1\", \"parte2\"]}"));
        assert!(prompt.ends_with("Máximo de 2 partes!"));
    }

    #[test]
    fn splitter_settings_fill_gaps_with_defaults() {
        let settings = SplitterSettings::from(Some(SplitterConfigEntry {
            min_chars_to_split: Some(80),
            delay_between_messages: Some(0),
            temperature: None,
            max_tokens: Some(600),
        }));
        assert_eq!(
            settings,
            SplitterSettings {
                min_chars: 80,
                delay_ms: 500,
                max_tokens: 600,
                temperature: 0.1,
            }
        );
        assert_eq!(SplitterSettings::from(None), SplitterSettings::default());
    }

    #[test]
    fn fenced_split_answers_are_read() {
        let text = "```json\n{\"messages\": [\" Oi, tudo bem? \", \"\", 3, \"Vi sua loja.\", \"Posso ajudar?\"]}\n```";
        assert_eq!(
            parse_split_response(text, 2).unwrap(),
            vec!["Oi, tudo bem?".to_string(), "Vi sua loja.".to_string()]
        );
    }

    #[test]
    fn overlong_parts_are_dropped() {
        let long = "a".repeat(MAX_PART_CHARS + 1);
        let text = json!({"messages": [long, "curta"]}).to_string();
        assert_eq!(parse_split_response(&text, 5).unwrap(), vec!["curta".to_string()]);
    }

    #[test_case("not json", "Parse error"; "not json")]
    #[test_case("{\"parts\": []}", "Invalid response format: messages array not found"; "no messages")]
    #[test_case("{\"messages\": [\"  \"]}", "No valid messages found in response"; "only blanks")]
    fn unusable_split_answers(text: &str, error: &str) {
        assert!(parse_split_response(text, 3).unwrap_err().starts_with(error));
    }

    #[test]
    fn retries_back_off_then_give_up() {
        let config = config();
        assert_eq!(
            retry_plan(None, &config),
            RetryPlan::Retry { attempt: 1, delay_minutes: 5 }
        );
        assert_eq!(
            retry_plan(Some(1), &config),
            RetryPlan::Retry { attempt: 2, delay_minutes: 15 }
        );
        assert_eq!(retry_plan(Some(2), &config), RetryPlan::GiveUp { attempt: 3 });
    }

    #[test]
    fn short_backoff_lists_repeat_their_last_value() {
        let config = CampaignConfig {
            max_retries: 5,
            retry_backoff_minutes: vec![1, 2],
            ..config()
        };
        assert_eq!(
            retry_plan(Some(3), &config),
            RetryPlan::Retry { attempt: 4, delay_minutes: 2 }
        );
    }

    #[test]
    fn failure_messages_are_cut() {
        let error = "e".repeat(300);
        assert_eq!(retry_message(1, 3, &error), format!("Retry 1/3: {}", "e".repeat(200)));
        assert_eq!(give_up_message(3, "boom"), "Max retries (3) exceeded: boom");
        assert_eq!(
            stopped_run_reason(Some("paused")),
            "Campanha paused - mensagem cancelada antes do envio"
        );
        assert_eq!(
            stopped_run_reason(None),
            "Campanha não encontrada - mensagem cancelada antes do envio"
        );
    }
}
