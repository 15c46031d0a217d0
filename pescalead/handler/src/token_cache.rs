//! In-memory cache of WhatsApp instance credentials.
//!
//! Entries expire after a fixed TTL; there is no size bound and no other
//! eviction. The cache is per process and best effort.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::common::error::Error;
use crate::config::TokenCacheConfig;
use crate::database::postgrest::{PostgrestClient, Query};
use crate::whatsapp::Provider;

/// A credential and the provider it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    /// Provider API token.
    pub token: String,
    /// Provider the token is valid for.
    pub provider: Provider,
}

#[derive(Debug, Clone)]
struct CachedToken {
    resolved: ResolvedToken,
    cached_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CachedToken>,
    hits: u64,
    misses: u64,
}

/// Cache counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries currently held, expired ones included until swept.
    pub size: usize,
    /// `hits / (hits + misses)` as a percentage with two decimals.
    pub hit_rate: String,
}

/// The row of `instances` needed to pick a credential.
#[derive(Debug, Deserialize)]
struct InstanceCredentials {
    provider_type: Option<String>,
    api_key: Option<String>,
}

/// TTL map from instance id to its provider credential.
#[derive(Debug)]
pub struct TokenCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl TokenCache {
    /// Create an empty cache.
    pub fn new(config: &TokenCacheConfig) -> Self {
        Self::with_ttl(config.ttl)
    }

    /// Create an empty cache with the given TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up an instance. Expired entries are dropped and count as misses.
    pub fn get(&self, instance_id: &str) -> Option<ResolvedToken> {
        self.get_at(instance_id, Instant::now())
    }

    fn get_at(&self, instance_id: &str, now: Instant) -> Option<ResolvedToken> {
        let mut state = self.state();

        let age = match state.entries.get(instance_id) {
            None => {
                state.misses += 1;
                debug!(instance_id, "token cache miss");
                return None;
            }
            Some(cached) => now.saturating_duration_since(cached.cached_at),
        };

        if age > self.ttl {
            state.misses += 1;
            state.entries.remove(instance_id);
            debug!(instance_id, age_secs = age.as_secs(), "token cache entry expired");
            return None;
        }

        state.hits += 1;
        state
            .entries
            .get(instance_id)
            .map(|cached| cached.resolved.clone())
    }

    /// Store a credential for an instance.
    pub fn set(&self, instance_id: &str, token: impl Into<String>, provider: Provider) {
        self.set_at(instance_id, token.into(), provider, Instant::now())
    }

    fn set_at(&self, instance_id: &str, token: String, provider: Provider, now: Instant) {
        let resolved = ResolvedToken { token, provider };
        self.state().entries.insert(
            instance_id.to_string(),
            CachedToken { resolved, cached_at: now },
        );
        debug!(instance_id, %provider, "token cached");
    }

    /// Forget an instance, e.g. after it was deleted.
    pub fn invalidate(&self, instance_id: &str) {
        if self.state().entries.remove(instance_id).is_some() {
            debug!(instance_id, "token invalidated");
        }
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let mut state = self.state();
        let size = state.entries.len();
        *state = CacheState::default();
        debug!(size, "token cache cleared");
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        let total = state.hits + state.misses;
        let rate = if total > 0 {
            state.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            hit_rate: format!("{rate:.2}%"),
        }
    }

    /// Remove expired entries; returns how many were removed.
    pub fn clean_expired(&self) -> usize {
        self.clean_expired_at(Instant::now())
    }

    fn clean_expired_at(&self, now: Instant) -> usize {
        let mut state = self.state();
        let before = state.entries.len();
        let ttl = self.ttl;
        state
            .entries
            .retain(|_, cached| now.saturating_duration_since(cached.cached_at) <= ttl);
        before - state.entries.len()
    }

    /// Sweep expired entries every `interval` until the runtime shuts down.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = cache.clean_expired();
                if removed > 0 {
                    debug!(removed, "swept expired tokens");
                }
            }
        })
    }

    /// Credential for an instance: the cache first, then the instance row,
    /// then the global Evolution key for Evolution instances. Whatever is
    /// found is cached.
    pub async fn resolve_instance_token(
        &self,
        db: &PostgrestClient,
        instance_id: &str,
        evolution_api_key: Option<&str>,
    ) -> Result<Option<ResolvedToken>, Error> {
        if let Some(cached) = self.get(instance_id) {
            return Ok(Some(cached));
        }

        let query = Query::new()
            .select("provider_type,api_key")
            .eq("id", instance_id)
            .limit(1);
        let instance: Option<InstanceCredentials> = db.maybe_single("instances", &query).await?;

        let Some(instance) = instance else {
            warn!(instance_id, "instance not found, falling back to the global evolution key");
            let resolved = evolution_api_key.map(|token| ResolvedToken {
                token: token.to_string(),
                provider: Provider::Evolution,
            });
            if let Some(resolved) = &resolved {
                self.set(instance_id, resolved.token.clone(), resolved.provider);
            }
            return Ok(resolved);
        };

        let provider = Provider::from_type(instance.provider_type.as_deref());
        let own_key = instance.api_key.filter(|key| !key.trim().is_empty());

        // Uazapi only accepts the instance's own token.
        let token = match (own_key, provider) {
            (Some(key), _) => Some(key),
            (None, Provider::Evolution) => evolution_api_key.map(str::to_string),
            (None, Provider::Uazapi) => None,
        };

        let resolved = token.map(|token| ResolvedToken { token, provider });
        if let Some(resolved) = &resolved {
            self.set(instance_id, resolved.token.clone(), resolved.provider);
        }
        Ok(resolved)
    }
}
