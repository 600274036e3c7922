use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("push rejected: {0}")]
    Rejected(String),
}

/// PushClient は受信者端末への配信トランスポート。失敗しても状態遷移は取り消さない。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushClient: Send + Sync {
    async fn notify(&self, user_id: &str, notification_id: &Uuid) -> Result<(), PushError>;
}
