use thiserror::Error;

/// Failure kinds of the auth subsystem.
///
/// The payload strings are for logs only. They are never rendered to clients
/// (see `AppError::from`).
#[derive(Debug, Error)]
pub enum AuthError {
    /// Generic failure, also used for client-credentials calls that the provider rejects.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("token has expired")]
    TokenExpired,

    /// Malformed token, signature mismatch, or claim mismatch (aud / iss).
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Key set could not be retrieved, parsed, or does not hold the requested kid.
    #[error("jwks fetch failed: {0}")]
    JwksFetch(String),
}
