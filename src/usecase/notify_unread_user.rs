use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::user_notification::UserNotificationStatus;
use crate::domain::error::NotificationError;
use crate::domain::repository::{NotificationRepository, UserNotificationRepository};
use crate::domain::service::lifecycle::{self, LifecycleEvent};
use crate::domain::service::PushClient;
use crate::infrastructure::retry::RetryPolicy;
use crate::usecase::send_notification::push_to;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyUnreadOutput {
    pub notified: usize,
    pub failed: usize,
}

/// NotifyUnreadUserUseCase は送信済み通知を未読 (NEW) の受信者にだけ再配信する。
/// UserNotification の追加や Notification.status の変更は行わない。
pub struct NotifyUnreadUserUseCase {
    notification_repo: Arc<dyn NotificationRepository>,
    user_notification_repo: Arc<dyn UserNotificationRepository>,
    push_client: Arc<dyn PushClient>,
    retry: RetryPolicy,
    push_concurrency: usize,
}

impl NotifyUnreadUserUseCase {
    pub fn new(
        notification_repo: Arc<dyn NotificationRepository>,
        user_notification_repo: Arc<dyn UserNotificationRepository>,
        push_client: Arc<dyn PushClient>,
        retry: RetryPolicy,
        push_concurrency: usize,
    ) -> Self {
        Self {
            notification_repo,
            user_notification_repo,
            push_client,
            retry,
            push_concurrency,
        }
    }

    pub async fn execute(
        &self,
        org_id: &str,
        notification_id: &Uuid,
    ) -> Result<NotifyUnreadOutput, NotificationError> {
        let notification = self
            .notification_repo
            .find_by_id(org_id, notification_id)
            .await
            .map_err(NotificationError::dependency)?
            .ok_or_else(|| NotificationError::NotFound(format!("notification {notification_id}")))?;
        lifecycle::transition(notification.status, LifecycleEvent::NotifyUnread)?;

        let unread: Vec<String> = self
            .user_notification_repo
            .find_by_notification(notification_id, Some(UserNotificationStatus::New))
            .await
            .map_err(NotificationError::dependency)?
            .into_iter()
            .map(|row| row.user_id)
            .collect();
        if unread.is_empty() {
            tracing::info!(notification_id = %notification_id, "no unread recipients to notify");
            return Ok(NotifyUnreadOutput {
                notified: 0,
                failed: 0,
            });
        }

        let failed = push_to(
            self.push_client.as_ref(),
            &self.retry,
            self.push_concurrency,
            *notification_id,
            &unread,
        )
        .await;
        self.user_notification_repo
            .touch_unread(notification_id, &unread)
            .await
            .map_err(NotificationError::dependency)?;

        tracing::info!(
            notification_id = %notification_id,
            unread = unread.len(),
            failed = failed,
            "unread recipients notified"
        );
        Ok(NotifyUnreadOutput {
            notified: unread.len() - failed,
            failed,
        })
    }
}
