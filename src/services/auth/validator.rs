use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    errors::ErrorKind,
    jwk::{Jwk, PublicKeyUse},
};
use serde::Deserialize;

use super::{AuthError, JwksCache};
use crate::config::AuthConfig;

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(a) => vec![a],
            Audience::Many(many) => many,
        }
    }
}

/// Access token claims. Absent required fields fail deserialization, which
/// surfaces as `InvalidToken`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    // space-separated (RFC 8693)
    #[serde(default)]
    pub scope: Option<String>,
    // Auth0 RBAC
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

/// Result of a successful validation. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentity {
    pub subject: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
    pub audience: Vec<String>,
}

impl ValidatedIdentity {
    pub fn has_scopes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required
            .iter()
            .all(|r| self.scopes.iter().any(|s| s == r.as_ref()))
    }
}

#[derive(Deserialize)]
struct ExpiryOnly {
    exp: Option<serde_json::Value>,
}

/// Verifies inbound bearer tokens against the provider's key set.
pub struct TokenValidator {
    keys: JwksCache,
    allowed_algorithms: Vec<Algorithm>,
    // template; `algorithms` is narrowed to the header alg per call
    validation: Validation,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    pub fn new(config: &AuthConfig, http: reqwest::Client) -> Self {
        let keys = JwksCache::new(http, config.jwks_url.clone(), config.jwks_ttl);
        Self::with_key_set(config, keys)
    }

    pub fn with_key_set(config: &AuthConfig, keys: JwksCache) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        Self {
            keys,
            allowed_algorithms: config.algorithms.clone(),
            validation,
        }
    }

    /// Validates `token` and returns the identity it carries.
    ///
    /// Expiry is checked before the key lookup, so an expired token is
    /// reported as `TokenExpired` whatever its signature.
    pub async fn validate(&self, token: &str) -> Result<ValidatedIdentity, AuthError> {
        let header = decode_header(token)
            .map_err(|e| AuthError::InvalidToken(format!("malformed token header: {e}")))?;

        if !self.allowed_algorithms.contains(&header.alg) {
            return Err(AuthError::InvalidToken(format!(
                "algorithm {:?} is not accepted",
                header.alg
            )));
        }

        let kid = header
            .kid
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AuthError::InvalidToken("token header has no kid".into()))?;

        check_expiry(token, Utc::now().timestamp())?;

        let jwk = self.keys.get_key(kid).await?;
        let decoding_key = decoding_key_for(&jwk, header.alg)?;

        let mut validation = self.validation.clone();
        validation.algorithms = vec![header.alg];

        let claims = decode::<AccessTokenClaims>(token, &decoding_key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidToken("empty sub claim".into()));
        }

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::InvalidToken("exp out of range".into()))?;

        Ok(ValidatedIdentity {
            scopes: collect_scopes(claims.scope.as_deref(), claims.permissions),
            subject: claims.sub,
            expires_at,
            issuer: claims.iss,
            audience: claims.aud.into_vec(),
        })
    }
}

// Reads `exp` from the unverified payload. Signature is not trusted yet; this
// only decides between "expired" and "go on verifying".
fn check_expiry(token: &str, now: i64) -> Result<(), AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::InvalidToken("token is not a compact JWS".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::InvalidToken("payload is not base64url".into()))?;
    let claims: ExpiryOnly = serde_json::from_slice(&bytes)
        .map_err(|_| AuthError::InvalidToken("payload is not a JSON object".into()))?;

    let exp = claims
        .exp
        .ok_or_else(|| AuthError::InvalidToken("missing exp claim".into()))?
        .as_f64()
        .ok_or_else(|| AuthError::InvalidToken("exp is not numeric".into()))?;

    // strictly in the future
    if exp <= now as f64 {
        return Err(AuthError::TokenExpired);
    }
    Ok(())
}

fn decoding_key_for(jwk: &Jwk, alg: Algorithm) -> Result<DecodingKey, AuthError> {
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return Err(AuthError::InvalidToken("key is not a signing key".into()));
    }

    // a JWK that pins its alg must agree with the header
    if let Some(key_alg) = &jwk.common.key_algorithm {
        let declared = serde_json::to_value(key_alg).ok();
        let presented = serde_json::to_value(alg).ok();
        if declared.is_none() || declared != presented {
            return Err(AuthError::InvalidToken(
                "header alg does not match the key".into(),
            ));
        }
    }

    DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidToken(format!("unusable key: {e}")))
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::InvalidToken("signature mismatch".into()),
        ErrorKind::InvalidAudience => AuthError::InvalidToken("audience mismatch".into()),
        ErrorKind::InvalidIssuer => AuthError::InvalidToken("issuer mismatch".into()),
        ErrorKind::ImmatureSignature => AuthError::InvalidToken("token not yet valid".into()),
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::InvalidToken(format!("missing required claim {claim}"))
        }
        ErrorKind::InvalidAlgorithm => {
            AuthError::InvalidToken("algorithm does not match the key".into())
        }
        _ => AuthError::InvalidToken(e.to_string()),
    }
}

fn collect_scopes(scope: Option<&str>, permissions: Option<Vec<String>>) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    let from_scope = scope.unwrap_or_default().split_whitespace().map(str::to_string);
    for s in from_scope.chain(permissions.unwrap_or_default()) {
        if !s.is_empty() && !scopes.contains(&s) {
            scopes.push(s);
        }
    }
    scopes
}
