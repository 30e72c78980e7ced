//! Bearer token 検証 → AuthCtx を extensions に入れる
//!
//! - exempt path (health / docs) は検証せずにそのまま通す
//! - /stream/ 配下に限り、header が無ければ `?token=` を受け付ける (EventSource は header を付けられない)
//! - 失敗は全て 401。message は失敗の種別だけ (token や upstream の詳細は log のみ)

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, Uri, header},
    middleware::{self, Next},
    response::Response,
};

use crate::api::extractors::AuthCtx;
use crate::error::AppError;
use crate::state::AppState;

const STREAM_PREFIX: &str = "/stream/";

/// Router 全体に認証を掛ける。exempt 判定は middleware 内で行う。
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if is_exempt(req.uri().path(), &state.exempt_paths) {
        return Ok(next.run(req).await);
    }

    // Request<Body> は Sync ではないので、await をまたぐ前に所有する
    let token = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => bearer_token(value)
            .ok_or(AppError::Unauthorized("Invalid Authorization header"))?
            .to_owned(),
        None => query_token(req.uri())
            .ok_or(AppError::Unauthorized("Missing Authorization header"))?,
    };

    let identity = match state.auth.validate(&token).await {
        Ok(identity) => identity,
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %req.uri().path(),
                "access token validation failed"
            );
            return Err(err.into());
        }
    };

    tracing::debug!(subject = %identity.subject, "request authenticated");

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(AuthCtx::from(identity));

    Ok(next.run(req).await)
}

/// Exact match, or the exempt path followed by a `/` segment.
fn is_exempt(path: &str, exempt: &[String]) -> bool {
    exempt.iter().any(|p| {
        let base = p.trim_end_matches('/');
        path == p
            || (!base.is_empty()
                && path
                    .strip_prefix(base)
                    .is_some_and(|rest| rest.starts_with('/')))
    })
}

/// `Bearer <token>`, scheme case-insensitive.
fn bearer_token(value: &HeaderValue) -> Option<&str> {
    let (scheme, token) = value.to_str().ok()?.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// `?token=` on streaming routes only.
fn query_token(uri: &Uri) -> Option<String> {
    if !uri.path().starts_with(STREAM_PREFIX) {
        return None;
    }
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}
