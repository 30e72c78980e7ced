mod common;

use std::time::Duration;

use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{AUDIENCE, ISSUER, JWKS_PATH, KID};
use mcp_tools_server::services::auth::{AuthError, TokenValidator};
use mcp_tools_server::services::http_client;

async fn validator(server: &MockServer) -> TokenValidator {
    let http = http_client(Duration::from_secs(2)).unwrap();
    TokenValidator::new(&common::auth_config(server), http)
}

#[tokio::test]
async fn valid_token_yields_identity() {
    let server = MockServer::start().await;
    common::mount_jwks(&server, vec![common::jwk(7, KID)]).await;
    let validator = validator(&server).await;

    let mut claims = common::claims("auth0|alice", 120);
    claims["permissions"] = json!(["notes:write", "profile:read"]);
    let token = common::sign(7, KID, &claims);

    let identity = validator.validate(&token).await.unwrap();
    assert_eq!(identity.subject, "auth0|alice");
    assert_eq!(identity.issuer, ISSUER);
    assert_eq!(identity.audience, vec![AUDIENCE.to_string()]);
    assert_eq!(identity.scopes, ["notes:read", "notes:write", "profile:read"]);
    assert!(identity.has_scopes(&["notes:read", "profile:read"]));
    assert!(!identity.has_scopes(&["admin"]));
    assert_eq!(identity.expires_at.timestamp(), claims["exp"].as_i64().unwrap());
}

#[tokio::test]
async fn audience_array_is_accepted_when_it_contains_ours() {
    let server = MockServer::start().await;
    common::mount_jwks(&server, vec![common::jwk(7, KID)]).await;
    let validator = validator(&server).await;

    let mut claims = common::claims("svc", 120);
    claims["aud"] = json!([AUDIENCE, "https://issuer.test/userinfo"]);

    let identity = validator.validate(&common::sign(7, KID, &claims)).await.unwrap();
    assert_eq!(identity.audience.len(), 2);
}

#[tokio::test]
async fn expired_token_is_reported_as_expired_without_key_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": []})))
        .expect(0)
        .mount(&server)
        .await;
    let validator = validator(&server).await;

    // signed by a key the provider does not publish
    let token = common::sign(9, "other-kid", &common::claims("alice", -5));

    assert!(matches!(validator.validate(&token).await, Err(AuthError::TokenExpired)));
}

#[tokio::test]
async fn signature_from_another_key_is_invalid() {
    let server = MockServer::start().await;
    common::mount_jwks(&server, vec![common::jwk(7, KID)]).await;
    let validator = validator(&server).await;

    let forged = common::sign(9, KID, &common::claims("mallory", 120));

    assert!(matches!(validator.validate(&forged).await, Err(AuthError::InvalidToken(_))));
}

#[tokio::test]
async fn any_altered_signature_character_is_invalid() {
    let server = MockServer::start().await;
    common::mount_jwks(&server, vec![common::jwk(7, KID)]).await;
    let validator = validator(&server).await;

    let token = common::token_for("alice");
    let (signed, signature) = token.rsplit_once('.').unwrap();
    validator.validate(&token).await.unwrap();

    for i in 0..signature.len() {
        // 'A' and 'g' differ in the high bits, so even the final
        // partially-used character decodes to different bytes
        let mut altered: Vec<u8> = signature.bytes().collect();
        altered[i] = if altered[i] == b'A' { b'g' } else { b'A' };
        let tampered = format!("{signed}.{}", String::from_utf8(altered).unwrap());

        assert!(
            matches!(validator.validate(&tampered).await, Err(AuthError::InvalidToken(_))),
            "signature character {i} altered"
        );
    }
}

#[tokio::test]
async fn wrong_audience_or_issuer_is_invalid() {
    let server = MockServer::start().await;
    common::mount_jwks(&server, vec![common::jwk(7, KID)]).await;
    let validator = validator(&server).await;

    let mut wrong_aud = common::claims("alice", 120);
    wrong_aud["aud"] = json!("https://someone-else.test");
    let mut wrong_iss = common::claims("alice", 120);
    wrong_iss["iss"] = json!("https://evil.test/");

    for claims in [wrong_aud, wrong_iss] {
        let token = common::sign(7, KID, &claims);
        assert!(matches!(validator.validate(&token).await, Err(AuthError::InvalidToken(_))));
    }
}

#[tokio::test]
async fn unknown_kid_after_refresh_is_a_key_set_error() {
    let server = MockServer::start().await;
    common::mount_jwks(&server, vec![common::jwk(7, KID)]).await;
    let validator = validator(&server).await;

    let token = common::sign(7, "rotated-away", &common::claims("alice", 120));

    assert!(matches!(validator.validate(&token).await, Err(AuthError::JwksFetch(_))));
}

#[tokio::test]
async fn unavailable_key_set_is_a_key_set_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let validator = validator(&server).await;

    let token = common::token_for("alice");

    assert!(matches!(validator.validate(&token).await, Err(AuthError::JwksFetch(_))));
}

#[tokio::test]
async fn algorithm_outside_the_allowlist_is_rejected_before_key_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": []})))
        .expect(0)
        .mount(&server)
        .await;
    let validator = validator(&server).await;

    let mut header = Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = Some(KID.into());
    let token = encode(
        &header,
        &common::claims("alice", 120),
        &EncodingKey::from_secret(b"shared-secret"),
    )
    .unwrap();

    assert!(matches!(validator.validate(&token).await, Err(AuthError::InvalidToken(_))));
}

#[tokio::test]
async fn garbage_is_invalid() {
    let server = MockServer::start().await;
    let validator = validator(&server).await;

    for token in ["", "not-a-jwt", "a.b.c"] {
        assert!(
            matches!(validator.validate(token).await, Err(AuthError::InvalidToken(_))),
            "{token:?}"
        );
    }
}
