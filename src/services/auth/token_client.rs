//! Client-credentials token client for outbound, service-to-service calls.
//!
//! One `CachedServiceToken` per client. The cache mutex is held across the
//! token-endpoint call, so concurrent callers wait for a single fetch and
//! then reuse its result.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use super::AuthError;
use crate::config::AuthConfig;
use crate::services::clock::{Clock, SystemClock};

const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;

#[derive(Clone)]
struct CachedServiceToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Snapshot of the cache state, safe to print (no token material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub cached: bool,
    pub valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub seconds_until_expiry: Option<i64>,
}

pub struct TokenClient {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    audience: String,
    margin: Duration,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedServiceToken>>,
}

impl std::fmt::Debug for TokenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print client_secret / token
        f.debug_struct("TokenClient")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("audience", &self.audience)
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

impl TokenClient {
    pub fn new(config: &AuthConfig, http: reqwest::Client) -> Self {
        Self::with_clock(config, http, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AuthConfig, http: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        let margin = Duration::from_std(config.token_expiry_margin).unwrap_or(Duration::minutes(1));

        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            audience: config.audience.clone(),
            margin,
            clock,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached token while it is outside the safety margin,
    /// otherwise fetches a new one.
    pub async fn get_access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && self.is_usable(token)
        {
            return Ok(token.access_token.clone());
        }

        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drops the cached token and fetches a new one.
    pub async fn refresh_access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        *cached = None;

        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    pub async fn clear_cache(&self) {
        *self.cached.lock().await = None;
        tracing::debug!("service token cache cleared");
    }

    pub async fn token_info(&self) -> TokenInfo {
        let cached = self.cached.lock().await;
        match cached.as_ref() {
            Some(token) => TokenInfo {
                cached: true,
                valid: self.is_usable(token),
                expires_at: Some(token.expires_at),
                seconds_until_expiry: Some((token.expires_at - self.clock.now()).num_seconds()),
            },
            None => TokenInfo {
                cached: false,
                valid: false,
                expires_at: None,
                seconds_until_expiry: None,
            },
        }
    }

    fn is_usable(&self, token: &CachedServiceToken) -> bool {
        self.clock.now() < token.expires_at - self.margin
    }

    async fn request_token(&self) -> Result<CachedServiceToken, AuthError> {
        tracing::debug!(url = %self.token_url, client_id = %self.client_id, "requesting service token");

        let body = TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            audience: &self.audience,
        };

        let response = self
            .http
            .post(self.token_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Authentication("token endpoint timed out".into())
                } else {
                    AuthError::Authentication(format!("token request failed: {e}"))
                }
            })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED => {
                return Err(AuthError::Authentication("invalid client credentials".into()));
            }
            StatusCode::FORBIDDEN => {
                return Err(AuthError::Authentication(
                    "client not authorized for audience".into(),
                ));
            }
            status => {
                return Err(AuthError::Authentication(format!(
                    "token endpoint returned {status}"
                )));
            }
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|_| AuthError::Authentication("malformed token response".into()))?;

        if token.access_token.is_empty() {
            return Err(AuthError::Authentication("token response has empty access_token".into()));
        }
        if let Some(kind) = token.token_type.as_deref()
            && !kind.eq_ignore_ascii_case("bearer")
        {
            tracing::warn!(token_type = kind, "unexpected token_type from token endpoint");
        }

        let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .ok_or_else(|| AuthError::Authentication("expires_in out of range".into()))?;
        tracing::info!(expires_in, "service token obtained");

        Ok(CachedServiceToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}
