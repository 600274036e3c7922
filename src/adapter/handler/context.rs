use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::error::NotificationError;

pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";
pub const USER_ID_HEADER: &str = "x-user-id";

/// RequestContext は呼び出し元の組織とユーザー。認証済みのゲートウェイが付与するヘッダーから取得する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub org_id: String,
    pub user_id: String,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = NotificationError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            org_id: required_header(parts, ORGANIZATION_ID_HEADER)?,
            user_id: required_header(parts, USER_ID_HEADER)?,
        })
    }
}

fn required_header(parts: &Parts, name: &str) -> Result<String, NotificationError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| NotificationError::validation(name, format!("{name} header is required")))
}
