//! JWKS cache.
//!
//! Keys are fetched from the identity provider on first use and whenever a
//! token names a `kid` the current set does not contain (or, when a TTL is
//! configured, the set has aged out). A refresh always replaces the whole set.
//!
//! Refreshes are single-flight: concurrent misses queue on `refresh_lock`,
//! and a caller that waited while another caller refreshed re-checks the new
//! set instead of fetching again.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::Jwk;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::AuthError;

#[derive(Debug)]
struct CachedKeySet {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
    // bumped on every successful refresh
    generation: u64,
}

// Parsed leniently so one unsupported key does not poison the whole set.
#[derive(Deserialize)]
struct RawJwkSet {
    keys: Vec<serde_json::Value>,
}

#[derive(Debug)]
pub struct JwksCache {
    http: reqwest::Client,
    jwks_url: Url,
    ttl: Option<Duration>,
    state: RwLock<Option<CachedKeySet>>,
    refresh_lock: Mutex<()>,
}

impl JwksCache {
    pub fn new(http: reqwest::Client, jwks_url: Url, ttl: Option<Duration>) -> Self {
        Self {
            http,
            jwks_url,
            ttl,
            state: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns the key for `kid`, fetching the key set on a miss.
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, AuthError> {
        let seen_generation = {
            let state = self.state.read().await;
            match state.as_ref() {
                Some(set) if !self.is_stale(set) => {
                    if let Some(jwk) = set.keys.get(kid) {
                        return Ok(jwk.clone());
                    }
                    Some(set.generation)
                }
                Some(set) => Some(set.generation),
                None => None,
            }
        };

        let _refresh = self.refresh_lock.lock().await;

        {
            let state = self.state.read().await;
            if let Some(set) = state.as_ref()
                && Some(set.generation) != seen_generation
            {
                tracing::debug!(kid, "jwks refreshed by a concurrent caller");
                return set.keys.get(kid).cloned().ok_or_else(|| unknown_kid(kid));
            }
        }

        let keys = self.fetch().await?;
        let found = keys.get(kid).cloned();

        let mut state = self.state.write().await;
        let generation = state.as_ref().map_or(0, |s| s.generation) + 1;
        tracing::info!(keys = keys.len(), generation, "jwks refreshed");
        *state = Some(CachedKeySet {
            keys,
            fetched_at: Instant::now(),
            generation,
        });

        found.ok_or_else(|| unknown_kid(kid))
    }

    /// Number of keys currently cached.
    pub async fn len(&self) -> usize {
        self.state.read().await.as_ref().map_or(0, |s| s.keys.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn is_stale(&self, set: &CachedKeySet) -> bool {
        self.ttl.is_some_and(|ttl| set.fetched_at.elapsed() >= ttl)
    }

    async fn fetch(&self) -> Result<HashMap<String, Jwk>, AuthError> {
        tracing::debug!(url = %self.jwks_url, "fetching jwks");

        let response = self
            .http
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::JwksFetch("request timed out".into())
                } else {
                    AuthError::JwksFetch(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::JwksFetch(format!("unexpected status {status}")));
        }

        let raw: RawJwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetch(format!("malformed key set: {e}")))?;

        let mut keys = HashMap::with_capacity(raw.keys.len());
        for value in raw.keys {
            let jwk: Jwk = match serde_json::from_value(value) {
                Ok(jwk) => jwk,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unsupported jwk");
                    continue;
                }
            };
            match jwk.common.key_id.clone() {
                Some(kid) => {
                    keys.insert(kid, jwk);
                }
                None => tracing::debug!("skipping jwk without kid"),
            }
        }

        Ok(keys)
    }
}

fn unknown_kid(kid: &str) -> AuthError {
    AuthError::JwksFetch(format!("no signing key matches kid {kid}"))
}
