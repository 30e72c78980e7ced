/*
 * Responsibility
 * - Handler から見える「認証済みコンテキスト」の型
 * - middleware が検証して request extensions に格納し、handler はこの型だけを受け取る
 *
 * Notes
 * - JWT の検証ロジックは services::auth 側の責務
 * - request ごとに生成され、request の終了と共に破棄される (共有しない)
 */

use crate::services::auth::ValidatedIdentity;

/// 認証済みのリクエストに付与されるコンテキスト
///
/// - `subject` は token の `sub` (notes / profile の所有者キー)
/// - `scopes` は `scope` と `permissions` の和集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCtx {
    pub subject: String,
    pub scopes: Vec<String>,
}

impl From<ValidatedIdentity> for AuthCtx {
    fn from(identity: ValidatedIdentity) -> Self {
        Self {
            subject: identity.subject,
            scopes: identity.scopes,
        }
    }
}
