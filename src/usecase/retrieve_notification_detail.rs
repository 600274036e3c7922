use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::notification::Notification;
use crate::domain::entity::user_notification::UserNotification;
use crate::domain::error::NotificationError;
use crate::domain::repository::{NotificationRepository, UserNotificationRepository};

#[derive(Debug, Clone)]
pub struct NotificationDetail {
    pub notification: Notification,
    /// 呼び出しユーザーが受信者の場合のみ存在する。
    pub user_notification: Option<UserNotification>,
}

pub struct RetrieveNotificationDetailUseCase {
    notification_repo: Arc<dyn NotificationRepository>,
    user_notification_repo: Arc<dyn UserNotificationRepository>,
}

impl RetrieveNotificationDetailUseCase {
    pub fn new(
        notification_repo: Arc<dyn NotificationRepository>,
        user_notification_repo: Arc<dyn UserNotificationRepository>,
    ) -> Self {
        Self {
            notification_repo,
            user_notification_repo,
        }
    }

    pub async fn execute(
        &self,
        org_id: &str,
        user_id: &str,
        id: &Uuid,
    ) -> Result<NotificationDetail, NotificationError> {
        let notification = self
            .notification_repo
            .find_by_id(org_id, id)
            .await
            .map_err(NotificationError::dependency)?
            .ok_or_else(|| NotificationError::NotFound(format!("notification {id}")))?;
        let user_notification = self
            .user_notification_repo
            .find_by_notification_and_user(id, user_id)
            .await
            .map_err(NotificationError::dependency)?;

        Ok(NotificationDetail {
            notification,
            user_notification,
        })
    }
}
