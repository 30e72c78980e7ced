/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 * - Clone 前提で持つ (中身は Arc なので clone は安い)
 */
use std::sync::Arc;

use crate::services::auth::TokenValidator;
use crate::services::tools::ToolService;

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: Arc<TokenValidator>,
    pub tools: Arc<ToolService>,
    pub exempt_paths: Arc<[String]>,
}

impl AppState {
    pub fn new(auth: Arc<TokenValidator>, tools: Arc<ToolService>, exempt_paths: Vec<String>) -> Self {
        Self {
            auth,
            tools,
            exempt_paths: exempt_paths.into(),
        }
    }
}
