use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entity::user_notification::{UserNotification, UserNotificationStatus};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserNotificationRepository: Send + Sync {
    /// (notification_id, user_id) が既に存在する行はスキップし、挿入した件数を返す。
    async fn create_many(&self, rows: &[UserNotification]) -> anyhow::Result<u64>;
    async fn find_by_notification_and_user(
        &self,
        notification_id: &Uuid,
        user_id: &str,
    ) -> anyhow::Result<Option<UserNotification>>;
    async fn find_by_notification(
        &self,
        notification_id: &Uuid,
        status: Option<UserNotificationStatus>,
    ) -> anyhow::Result<Vec<UserNotification>>;
    /// user_id 本人の行だけを更新する。既に同じ状態の行も件数に含める。
    async fn set_status(
        &self,
        user_id: &str,
        notification_ids: &[Uuid],
        status: &UserNotificationStatus,
    ) -> anyhow::Result<u64>;
    /// 未読 (NEW) の行の updated_at を更新する。再配信の記録に使う。
    async fn touch_unread(&self, notification_id: &Uuid, user_ids: &[String]) -> anyhow::Result<u64>;
    /// (status に一致する件数, 総件数) を返す。
    async fn count_by_status(
        &self,
        user_id: &str,
        status: &UserNotificationStatus,
    ) -> anyhow::Result<(i64, i64)>;
}
