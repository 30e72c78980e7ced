/*!
 * OAuth2 / JWT subsystem
 *
 * Responsibility:
 * - JWKS の取得とキャッシュ (jwks)
 * - inbound bearer token の検証 (validator)
 * - outbound 用 client-credentials token の取得とキャッシュ (token_client)
 *
 * HTTP への変換はここでは行わない (middleware / error.rs の責務)
 */

mod error;
pub mod jwks;
pub mod token_client;
pub mod validator;

pub use error::AuthError;
pub use jwks::JwksCache;
pub use token_client::{TokenClient, TokenInfo};
pub use validator::{TokenValidator, ValidatedIdentity};
