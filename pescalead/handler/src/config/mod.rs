//! Configuration management for the PescaLead handlers.
use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::config::error::PescaleadConfigError;
use crate::config::serialization::duration_seconds_deserializer;
use crate::config::serialization::non_empty_string;
use crate::config::serialization::url_deserializer_optional;
use crate::config::serialization::url_deserializer_single;
use crate::logging;

mod error;
mod serialization;

/// Path of the default configuration file, relative to the crate root.
pub const DEFAULT_CONFIG_PATH: &str = "./src/config/default.toml";

/// Trait for validating configuration values.
trait Validatable {
    /// Validate the configuration values.
    fn validate(&self, cfg: &Settings) -> Result<(), ConfigError>;
}

/// Top-level configuration for the handlers.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Settings {
    /// Local server and logging settings.
    pub server: ServerConfig,
    /// Managed database (PostgREST + auth) settings.
    pub supabase: SupabaseConfig,
    /// Direct connection to the CNPJ registry mirror. The CNPJ endpoints
    /// answer 503 when this is missing.
    #[serde(default)]
    pub cnpj_database: CnpjDatabaseConfig,
    /// In-memory rate limiter settings.
    pub rate_limit: RateLimitConfig,
    /// Provider token cache settings.
    pub token_cache: TokenCacheConfig,
    /// WhatsApp provider settings.
    pub whatsapp: WhatsappConfig,
    /// AI message pipeline settings.
    pub pipeline: PipelineConfig,
    /// Chat completion settings.
    pub openrouter: OpenRouterConfig,
    /// Campaign queue settings.
    pub campaign: CampaignConfig,
    /// Follow-up queue settings.
    pub follow_up: FollowUpConfig,
    /// CORS origin whitelists.
    pub cors: CorsConfig,
}

/// Local server and logging settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ServerConfig {
    /// Host the local server binds to.
    pub host: String,
    /// Port the local server binds to.
    pub port: u16,
    /// Use the human readable log format instead of JSON.
    pub pretty_logs: bool,
    /// Default tracing directives, overridden by `RUST_LOG`.
    pub log_directives: String,
}

/// Managed database settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SupabaseConfig {
    /// Project URL; REST lives under `/rest/v1`, auth under `/auth/v1`.
    #[serde(deserialize_with = "url_deserializer_single")]
    pub url: Url,
    /// Service role key, bypasses row level security.
    #[serde(skip_serializing)]
    pub service_role_key: String,
    /// Anonymous key used with user tokens so that row level security
    /// applies.
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing)]
    pub anon_key: Option<String>,
}

impl Validatable for SupabaseConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if !["http", "https"].contains(&self.url.scheme()) {
            let err = PescaleadConfigError::InvalidHttpScheme(
                "supabase.url",
                self.url.scheme().to_string(),
            );
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.service_role_key.trim().is_empty() {
            let err = PescaleadConfigError::EmptyValue("supabase.service_role_key");
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// CNPJ registry database settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CnpjDatabaseConfig {
    /// The postgres database endpoint.
    #[serde(default, deserialize_with = "url_deserializer_optional", skip_serializing)]
    pub endpoint: Option<Url>,
    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for CnpjDatabaseConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Validatable for CnpjDatabaseConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        // Only PostgreSQL is supported; the rest of the URI is left to the
        // driver, which fails fast on connect.
        if let Some(endpoint) = &self.endpoint {
            if !["postgres", "postgresql"].contains(&endpoint.scheme()) {
                let err =
                    PescaleadConfigError::UnsupportedDatabaseDriver(endpoint.scheme().to_string());
                return Err(ConfigError::Message(err.to_string()));
            }
        }
        if self.max_connections == 0 {
            let err = PescaleadConfigError::ZeroValueForbidden("cnpj_database.max_connections");
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// Rate limiter settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RateLimitConfig {
    /// Requests allowed per client per window.
    pub max_requests: u32,
    /// Length of the window, in seconds.
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub window: Duration,
    /// How often expired entries are swept, in seconds.
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub sweep_interval: Duration,
}

impl Validatable for RateLimitConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            let err = PescaleadConfigError::ZeroValueForbidden("rate_limit.max_requests");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.window.is_zero() {
            let err = PescaleadConfigError::ZeroDurationForbidden("rate_limit.window");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.sweep_interval.is_zero() {
            let err = PescaleadConfigError::ZeroDurationForbidden("rate_limit.sweep_interval");
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// Token cache settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TokenCacheConfig {
    /// How long a resolved token stays valid, in seconds.
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub ttl: Duration,
    /// How often expired entries are swept, in seconds.
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub sweep_interval: Duration,
}

impl Validatable for TokenCacheConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            let err = PescaleadConfigError::ZeroDurationForbidden("token_cache.ttl");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.sweep_interval.is_zero() {
            let err = PescaleadConfigError::ZeroDurationForbidden("token_cache.sweep_interval");
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// WhatsApp provider settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct WhatsappConfig {
    /// Evolution API base URL. Evolution instances cannot send without it.
    #[serde(default, deserialize_with = "url_deserializer_optional")]
    pub evolution_api_url: Option<Url>,
    /// Global Evolution API key, used when an instance has no key of its own.
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing)]
    pub evolution_api_key: Option<String>,
    /// Uazapi base URL used when an instance has none.
    #[serde(deserialize_with = "url_deserializer_single")]
    pub uazapi_default_url: Url,
    /// Typing delay passed to the providers, in milliseconds.
    pub send_delay_ms: u64,
}

impl Validatable for WhatsappConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if let Some(url) = &self.evolution_api_url {
            if !["http", "https"].contains(&url.scheme()) {
                let err = PescaleadConfigError::InvalidHttpScheme(
                    "whatsapp.evolution_api_url",
                    url.scheme().to_string(),
                );
                return Err(ConfigError::Message(err.to_string()));
            }
        }
        if !["http", "https"].contains(&self.uazapi_default_url.scheme()) {
            let err = PescaleadConfigError::InvalidHttpScheme(
                "whatsapp.uazapi_default_url",
                self.uazapi_default_url.scheme().to_string(),
            );
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// AI message pipeline settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PipelineConfig {
    /// Name of the message queue the debouncer feeds.
    pub queue_name: String,
    /// Visibility timeout for read queue messages, in seconds.
    pub visibility_timeout_secs: u32,
    /// Messages read per run.
    pub batch_size: u32,
    /// Reads after which a failing message is archived.
    pub max_retries: i64,
    /// Debounce used when the agent does not configure one.
    pub default_debounce_seconds: i64,
    /// Shared secret expected in `x-webhook-secret`. No check when unset.
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing)]
    pub webhook_secret: Option<String>,
}

impl Validatable for PipelineConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.queue_name.trim().is_empty() {
            let err = PescaleadConfigError::EmptyValue("pipeline.queue_name");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.batch_size == 0 {
            let err = PescaleadConfigError::ZeroValueForbidden("pipeline.batch_size");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.visibility_timeout_secs == 0 {
            let err = PescaleadConfigError::ZeroDurationForbidden("pipeline.visibility_timeout_secs");
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// Chat completion settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct OpenRouterConfig {
    /// Chat completions endpoint.
    #[serde(deserialize_with = "url_deserializer_single")]
    pub url: Url,
    /// API key. When unset the key is read from the database vault.
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing)]
    pub api_key: Option<String>,
    /// Value of the `HTTP-Referer` header.
    pub referer: String,
    /// Timeout of one completion, in seconds.
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub timeout: Duration,
    /// Attempts before a rate limited completion fails.
    pub max_attempts: u32,
}

impl Validatable for OpenRouterConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if !["http", "https"].contains(&self.url.scheme()) {
            let err =
                PescaleadConfigError::InvalidHttpScheme("openrouter.url", self.url.scheme().to_string());
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.timeout.is_zero() {
            let err = PescaleadConfigError::ZeroDurationForbidden("openrouter.timeout");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.max_attempts == 0 {
            let err = PescaleadConfigError::ZeroValueForbidden("openrouter.max_attempts");
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// Campaign queue settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CampaignConfig {
    /// Messages locked per run when the caller does not ask for a number.
    pub default_batch_size: u32,
    /// Largest batch a caller may ask for.
    pub max_batch_size: u32,
    /// Messages processed at the same time.
    pub concurrency: usize,
    /// Attempts before a message is failed for good.
    pub max_retries: u32,
    /// Minutes to wait before each retry; the last value repeats.
    pub retry_backoff_minutes: Vec<u64>,
    /// Messages still pending after this long are skipped, in seconds.
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub stale_after: Duration,
    /// Time zone of campaigns that do not set one.
    pub default_timezone: String,
}

impl Validatable for CampaignConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.default_batch_size == 0 {
            let err = PescaleadConfigError::ZeroValueForbidden("campaign.default_batch_size");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.max_batch_size < self.default_batch_size {
            let err = PescaleadConfigError::BelowDefault("campaign.max_batch_size");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.concurrency == 0 {
            let err = PescaleadConfigError::ZeroValueForbidden("campaign.concurrency");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.max_retries == 0 {
            let err = PescaleadConfigError::ZeroValueForbidden("campaign.max_retries");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.retry_backoff_minutes.is_empty() {
            let err = PescaleadConfigError::EmptyValue("campaign.retry_backoff_minutes");
            return Err(ConfigError::Message(err.to_string()));
        }
        if self.default_timezone.parse::<chrono_tz::Tz>().is_err() {
            let err = PescaleadConfigError::InvalidTimezone(
                "campaign.default_timezone",
                self.default_timezone.clone(),
            );
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// Follow-up queue settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct FollowUpConfig {
    /// Jobs processed per run.
    pub batch_size: u32,
    /// Recent messages shown to the model when it picks a category.
    pub context_messages: u64,
}

impl Validatable for FollowUpConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            let err = PescaleadConfigError::ZeroValueForbidden("follow_up.batch_size");
            return Err(ConfigError::Message(err.to_string()));
        }
        Ok(())
    }
}

/// CORS whitelists.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CorsConfig {
    /// Origins allowed on authenticated endpoints.
    pub allowed_origins: Vec<String>,
    /// Origins allowed on admin endpoints.
    pub admin_origins: Vec<String>,
}

impl Validatable for CorsConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        let origins = self.allowed_origins.iter().map(|origin| ("cors.allowed_origins", origin));
        let admin = self.admin_origins.iter().map(|origin| ("cors.admin_origins", origin));
        for (key, origin) in origins.chain(admin) {
            // An origin is a scheme and an authority, nothing else.
            let valid = Url::parse(origin).is_ok_and(|url| {
                ["http", "https"].contains(&url.scheme())
                    && url.host_str().is_some()
                    && url.path() == "/"
                    && !origin.ends_with('/')
                    && url.query().is_none()
            });
            if !valid {
                let err = PescaleadConfigError::InvalidOrigin(key, origin.clone());
                return Err(ConfigError::Message(err.to_string()));
            }
        }
        Ok(())
    }
}

impl Settings {
    /// Initializing the global config first with default values and then with
    /// provided/overwritten environment variables. The explicit separator with
    /// double underscores is needed to correctly parse the nested config structure.
    ///
    /// The environment variables are prefixed with `PESCALEAD_` and the nested
    /// fields are separated with double underscores. For example, the path
    /// `supabase.service_role_key` is set with
    /// `PESCALEAD_SUPABASE__SERVICE_ROLE_KEY`.
    pub fn new(config_path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        let env = Environment::with_prefix("PESCALEAD")
            .separator("__")
            .list_separator(",")
            .try_parsing(true)
            .with_list_parse_key("cors.allowed_origins")
            .with_list_parse_key("cors.admin_origins")
            .with_list_parse_key("campaign.retry_backoff_minutes")
            .prefix_separator("_");

        let mut cfg_builder = Config::builder();

        cfg_builder = cfg_builder.set_default("server.host", "127.0.0.1")?;
        cfg_builder = cfg_builder.set_default("server.port", 3031)?;
        cfg_builder = cfg_builder.set_default("server.pretty_logs", false)?;
        cfg_builder =
            cfg_builder.set_default("server.log_directives", logging::DEFAULT_DIRECTIVES)?;
        cfg_builder = cfg_builder.set_default("rate_limit.max_requests", 60)?;
        cfg_builder = cfg_builder.set_default("rate_limit.window", 60)?;
        cfg_builder = cfg_builder.set_default("rate_limit.sweep_interval", 60)?;
        cfg_builder = cfg_builder.set_default("token_cache.ttl", 300)?;
        cfg_builder = cfg_builder.set_default("token_cache.sweep_interval", 120)?;
        cfg_builder = cfg_builder.set_default("whatsapp.uazapi_default_url", "https://free.uazapi.com")?;
        cfg_builder = cfg_builder.set_default("whatsapp.send_delay_ms", 1200)?;
        cfg_builder = cfg_builder.set_default("pipeline.queue_name", "ai_processing_queue")?;
        cfg_builder = cfg_builder.set_default("pipeline.visibility_timeout_secs", 120)?;
        cfg_builder = cfg_builder.set_default("pipeline.batch_size", 3)?;
        cfg_builder = cfg_builder.set_default("pipeline.max_retries", 3)?;
        cfg_builder = cfg_builder.set_default("pipeline.default_debounce_seconds", 15)?;
        cfg_builder = cfg_builder
            .set_default("openrouter.url", "https://openrouter.ai/api/v1/chat/completions")?;
        cfg_builder = cfg_builder.set_default("openrouter.referer", "https://pescalead.com")?;
        cfg_builder = cfg_builder.set_default("openrouter.timeout", 30)?;
        cfg_builder = cfg_builder.set_default("openrouter.max_attempts", 3)?;
        cfg_builder = cfg_builder.set_default("campaign.default_batch_size", 5)?;
        cfg_builder = cfg_builder.set_default("campaign.max_batch_size", 100)?;
        cfg_builder = cfg_builder.set_default("campaign.concurrency", 5)?;
        cfg_builder = cfg_builder.set_default("campaign.max_retries", 3)?;
        cfg_builder = cfg_builder.set_default("campaign.retry_backoff_minutes", vec![5, 15, 30])?;
        cfg_builder = cfg_builder.set_default("campaign.stale_after", 3600)?;
        cfg_builder = cfg_builder.set_default("campaign.default_timezone", "America/Sao_Paulo")?;
        cfg_builder = cfg_builder.set_default("follow_up.batch_size", 10)?;
        cfg_builder = cfg_builder.set_default("follow_up.context_messages", 10)?;
        cfg_builder = cfg_builder.set_default("cors.allowed_origins", Vec::<String>::new())?;
        cfg_builder = cfg_builder.set_default("cors.admin_origins", Vec::<String>::new())?;

        if let Some(path) = config_path {
            cfg_builder = cfg_builder.add_source(File::from(path.as_ref()));
        }
        cfg_builder = cfg_builder.add_source(env);

        let cfg = cfg_builder.build()?;

        let settings: Settings = cfg.try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    /// Load the settings from the default configuration file.
    pub fn new_from_default_config() -> Result<Self, ConfigError> {
        Self::new(Some(DEFAULT_CONFIG_PATH))
    }

    /// Perform validation on the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.supabase.validate(self)?;
        self.cnpj_database.validate(self)?;
        self.rate_limit.validate(self)?;
        self.token_cache.validate(self)?;
        self.whatsapp.validate(self)?;
        self.pipeline.validate(self)?;
        self.openrouter.validate(self)?;
        self.campaign.validate(self)?;
        self.follow_up.validate(self)?;
        self.cors.validate(self)?;

        Ok(())
    }
}
