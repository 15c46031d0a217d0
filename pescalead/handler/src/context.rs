//! Context.
//!
//! Everything a handler needs, built once per process and cloned into every
//! route. The token cache and the rate limiter are shared by all clones.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::common::error::Error;
use crate::config::Settings;
use crate::database::cnpj::CnpjStore;
use crate::database::postgrest::PostgrestClient;
use crate::openrouter::OpenRouterClient;
use crate::rate_limit::RateLimiter;
use crate::token_cache::TokenCache;
use crate::whatsapp::WhatsappClient;

/// Handler context.
#[derive(Clone, Debug, Serialize)]
pub struct PescaleadContext {
    /// Settings.
    pub settings: Settings,
    /// Outbound HTTP client.
    #[serde(skip_serializing)]
    pub http: Client,
    /// Managed database acting with the service role.
    #[serde(skip_serializing)]
    pub db: PostgrestClient,
    /// Company registry, when configured.
    #[serde(skip_serializing)]
    pub cnpj: Option<CnpjStore>,
    /// WhatsApp providers.
    #[serde(skip_serializing)]
    pub whatsapp: WhatsappClient,
    /// Chat completions.
    #[serde(skip_serializing)]
    pub openrouter: OpenRouterClient,
    /// Per IP request counters.
    #[serde(skip_serializing)]
    pub rate_limiter: Arc<RateLimiter>,
    /// Provider credentials per instance.
    #[serde(skip_serializing)]
    pub token_cache: Arc<TokenCache>,
}

// Implementations -------------------------------------------------------------

impl PescaleadContext {
    /// Create the context from loaded settings. The registry pool connects
    /// lazily so a missing or unreachable registry only affects its routes.
    pub fn from_settings(settings: Settings) -> Result<Self, Error> {
        let http = Client::builder().build()?;
        let db = PostgrestClient::service(http.clone(), &settings.supabase);
        let cnpj = match CnpjStore::connect_lazy(&settings.cnpj_database) {
            Ok(store) => store,
            Err(error) => {
                warn!(%error, "company registry unavailable");
                None
            }
        };
        if cnpj.is_none() {
            info!("company registry endpoints will answer as unavailable");
        }
        let whatsapp = WhatsappClient::new(http.clone(), &settings.whatsapp);
        let openrouter = OpenRouterClient::new(http.clone(), &settings.openrouter);
        let rate_limiter = Arc::new(RateLimiter::new(&settings.rate_limit));
        let token_cache = Arc::new(TokenCache::new(&settings.token_cache));

        Ok(Self {
            settings,
            http,
            db,
            cnpj,
            whatsapp,
            openrouter,
            rate_limiter,
            token_cache,
        })
    }

    /// Managed database acting as the owner of `access_token`.
    pub fn user_db(&self, access_token: &str) -> PostgrestClient {
        PostgrestClient::for_user(self.http.clone(), &self.settings.supabase, access_token)
    }

    /// Start the periodic sweeps of the rate limiter and the token cache.
    pub fn spawn_sweepers(&self) {
        self.rate_limiter
            .spawn_sweeper(self.settings.rate_limit.sweep_interval);
        self.token_cache
            .spawn_sweeper(self.settings.token_cache.sweep_interval);
    }
}
