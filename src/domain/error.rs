use crate::domain::service::membership_oracle::MembershipError;

/// NotificationError は通知ライフサイクル操作のエラーを型安全に表現する。
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    StateConflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dependency error: {0}")]
    Dependency(String),
}

impl NotificationError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// 永続化層・外部サービス起因のエラーに変換する。
    pub fn dependency(err: impl std::fmt::Display) -> Self {
        Self::Dependency(err.to_string())
    }

    /// ディスパッチャーがリトライすべきエラーかどうかを返す。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Dependency(_))
    }
}

impl From<MembershipError> for NotificationError {
    fn from(err: MembershipError) -> Self {
        Self::Dependency(err.to_string())
    }
}
