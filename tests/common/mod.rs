#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, header};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcp_tools_server::app::{build_router, build_state};
use mcp_tools_server::config::{AuthConfig, Config};
use mcp_tools_server::services::clock::Clock;

pub const ISSUER: &str = "https://issuer.test/";
pub const AUDIENCE: &str = "https://mcp.test/api";
pub const KID: &str = "test-key-1";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";
pub const TOKEN_PATH: &str = "/oauth/token";

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Public JWK for `signing_key(seed)`.
pub fn jwk(seed: u8, kid: &str) -> Value {
    let x = URL_SAFE_NO_PAD.encode(signing_key(seed).verifying_key().to_bytes());
    json!({"kty": "OKP", "crv": "Ed25519", "x": x, "kid": kid, "alg": "EdDSA", "use": "sig"})
}

pub fn sign(seed: u8, kid: &str, claims: &Value) -> String {
    let pem = signing_key(seed)
        .to_pkcs8_pem(LineEnding::LF)
        .expect("encode test key");
    let key = EncodingKey::from_ed_pem(pem.as_bytes()).expect("load test key");

    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &key).expect("sign test token")
}

/// Claims that validate against `ISSUER` / `AUDIENCE`, expiring `ttl_secs` from now.
pub fn claims(sub: &str, ttl_secs: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": sub,
        "iat": now,
        "exp": now + ttl_secs,
        "scope": "notes:read notes:write",
    })
}

pub fn token_for(sub: &str) -> String {
    sign(7, KID, &claims(sub, 300))
}

pub async fn mount_jwks(server: &MockServer, keys: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": keys})))
        .mount(server)
        .await;
}

pub fn auth_env(server: &MockServer) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("OAUTH_ISSUER".into(), ISSUER.into());
    env.insert("OAUTH_AUDIENCE".into(), AUDIENCE.into());
    env.insert("OAUTH_JWKS_URL".into(), format!("{}{JWKS_PATH}", server.uri()));
    env.insert("OAUTH_TOKEN_URL".into(), format!("{}{TOKEN_PATH}", server.uri()));
    env.insert("OAUTH_CLIENT_ID".into(), "svc-client".into());
    env.insert("OAUTH_CLIENT_SECRET".into(), "svc-secret".into());
    env.insert("OAUTH_ALGORITHMS".into(), "EdDSA,RS256".into());
    env.insert("OAUTH_HTTP_TIMEOUT_SECONDS".into(), "2".into());
    env
}

pub fn auth_config(server: &MockServer) -> AuthConfig {
    let env = auth_env(server);
    AuthConfig::from_lookup(&|k: &str| env.get(k).cloned()).expect("auth config")
}

/// Full server config: OAuth + weather against `server`, files under `files_dir`,
/// in-memory SQLite.
pub fn config(server: &MockServer, files_dir: &Path) -> Config {
    let mut env = auth_env(server);
    env.insert("DATABASE_URL".into(), "sqlite::memory:".into());
    env.insert("OPENWEATHER_API_KEY".into(), "weather-key".into());
    env.insert("OPENWEATHER_BASE_URL".into(), server.uri());
    env.insert("OPENWEATHER_TIMEOUT_SECONDS".into(), "1".into());
    env.insert("ALLOWED_FILE_PATHS".into(), files_dir.display().to_string());
    Config::from_lookup(|k| env.get(k).cloned()).expect("server config")
}

pub async fn router(config: &Config) -> Router {
    let state = build_state(config).await.expect("build state");
    build_router(state, config)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("infallible router")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn rpc_request(token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::post("/mcp").header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// `tools/call` and return the JSON-RPC response object.
pub async fn call_tool(app: &Router, token: &str, name: &str, arguments: Value) -> Value {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments},
    });
    body_json(send(app, rpc_request(Some(token), &body)).await).await
}

/// Clock the test moves by hand.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Utc::now())))
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.0.lock().unwrap();
        *now += TimeDelta::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
