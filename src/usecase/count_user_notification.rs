use std::sync::Arc;

use crate::domain::entity::user_notification::UserNotificationStatus;
use crate::domain::error::NotificationError;
use crate::domain::repository::UserNotificationRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotificationCount {
    pub status: UserNotificationStatus,
    pub count: i64,
    pub total: i64,
}

pub struct CountUserNotificationUseCase {
    repo: Arc<dyn UserNotificationRepository>,
}

impl CountUserNotificationUseCase {
    pub fn new(repo: Arc<dyn UserNotificationRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(
        &self,
        user_id: &str,
        status: UserNotificationStatus,
    ) -> Result<UserNotificationCount, NotificationError> {
        let (count, total) = self
            .repo
            .count_by_status(user_id, &status)
            .await
            .map_err(NotificationError::dependency)?;
        Ok(UserNotificationCount {
            status,
            count,
            total,
        })
    }
}
