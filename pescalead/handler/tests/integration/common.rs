//! Common module for useful test functions.

use std::time::Duration;

use pescalead_handler::api;
use pescalead_handler::config::{
    CampaignConfig, CnpjDatabaseConfig, CorsConfig, FollowUpConfig, OpenRouterConfig,
    PipelineConfig, RateLimitConfig, ServerConfig, Settings, SupabaseConfig, TokenCacheConfig,
    WhatsappConfig,
};
use pescalead_handler::context::PescaleadContext;
use url::Url;
use warp::http::Response;
use warp::hyper::body::Bytes;
use warp::Filter;

/// Service key the test settings carry.
pub const SERVICE_KEY: &str = "integration-service-key";

/// A workspace id in the expected format.
pub const WORKSPACE_ID: &str = "0c6f1a52-8d7e-4b1a-9f3e-5a2b7c9d1e4f";

/// Settings whose backends all live at `base`.
pub fn settings(base: &str) -> Settings {
    let base: Url = base.parse().expect("mock server url");
    Settings {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3031,
            pretty_logs: false,
            log_directives: "info".to_string(),
        },
        supabase: SupabaseConfig {
            url: base.clone(),
            service_role_key: SERVICE_KEY.to_string(),
            anon_key: None,
        },
        cnpj_database: CnpjDatabaseConfig {
            endpoint: None,
            max_connections: 1,
        },
        rate_limit: RateLimitConfig {
            max_requests: 1000,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        },
        token_cache: TokenCacheConfig {
            ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(120),
        },
        whatsapp: WhatsappConfig {
            evolution_api_url: Some(base.clone()),
            evolution_api_key: Some("evolution-key".to_string()),
            uazapi_default_url: base.clone(),
            send_delay_ms: 0,
        },
        pipeline: PipelineConfig {
            queue_name: "ai_processing_queue".to_string(),
            visibility_timeout_secs: 120,
            batch_size: 3,
            max_retries: 3,
            default_debounce_seconds: 15,
            webhook_secret: None,
        },
        openrouter: OpenRouterConfig {
            url: base.join("api/v1/chat/completions").expect("openrouter url"),
            api_key: Some("openrouter-key".to_string()),
            referer: "https://pescalead.com".to_string(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
        },
        campaign: CampaignConfig {
            default_batch_size: 5,
            max_batch_size: 100,
            concurrency: 5,
            max_retries: 3,
            retry_backoff_minutes: vec![5, 15, 30],
            stale_after: Duration::from_secs(3600),
            default_timezone: "America/Sao_Paulo".to_string(),
        },
        follow_up: FollowUpConfig {
            batch_size: 10,
            context_messages: 10,
        },
        cors: CorsConfig {
            allowed_origins: vec!["https://app.pescalead.com.br".to_string()],
            admin_origins: vec!["https://app.pescalead.com.br".to_string()],
        },
    }
}

/// Send a request through the full route tree, rejections included.
pub async fn send(base: &str, request: warp::test::RequestBuilder) -> Response<Bytes> {
    let context = PescaleadContext::from_settings(settings(base)).expect("context");
    let routes = api::routes::routes(context).recover(api::handlers::handle_rejection);
    request.reply(&routes).await
}

/// Parse a JSON body.
pub fn body_json(response: &Response<Bytes>) -> serde_json::Value {
    serde_json::from_slice(response.body()).expect("json body")
}
