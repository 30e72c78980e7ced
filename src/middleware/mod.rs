/*
 * Responsibility
 * - middleware の公開インターフェース
 * - 適用順は app::build_router で決める (http → cors → security headers → auth → handler)
 */
pub mod auth;
pub mod cors;
pub mod http;
pub mod security_headers;
