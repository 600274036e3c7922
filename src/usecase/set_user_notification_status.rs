use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::user_notification::UserNotificationStatus;
use crate::domain::error::NotificationError;
use crate::domain::repository::UserNotificationRepository;

#[derive(Debug, Clone)]
pub struct SetUserNotificationStatusInput {
    pub user_id: String,
    pub notification_ids: Vec<Uuid>,
    pub status: UserNotificationStatus,
}

/// 呼び出しユーザー自身の UserNotification の既読状態を更新する。冪等。
pub struct SetUserNotificationStatusUseCase {
    repo: Arc<dyn UserNotificationRepository>,
}

impl SetUserNotificationStatusUseCase {
    pub fn new(repo: Arc<dyn UserNotificationRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, input: &SetUserNotificationStatusInput) -> Result<u64, NotificationError> {
        if input.notification_ids.is_empty() {
            return Err(NotificationError::validation(
                "notification_ids",
                "at least one notification id is required",
            ));
        }
        let updated = self
            .repo
            .set_status(&input.user_id, &input.notification_ids, &input.status)
            .await
            .map_err(NotificationError::dependency)?;

        tracing::debug!(
            user_id = %input.user_id,
            requested = input.notification_ids.len(),
            updated = updated,
            status = %input.status,
            "user notification status updated"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::user_notification_repository::MockUserNotificationRepository;

    #[tokio::test]
    async fn test_marks_read() {
        let id = Uuid::new_v4();
        let mut repo = MockUserNotificationRepository::new();
        repo.expect_set_status()
            .withf(move |user_id, ids, status| {
                user_id == "u1" && ids == [id] && *status == UserNotificationStatus::Read
            })
            .times(1)
            .returning(|_, _, _| Ok(1));

        let uc = SetUserNotificationStatusUseCase::new(Arc::new(repo));
        let updated = uc
            .execute(&SetUserNotificationStatusInput {
                user_id: "u1".to_string(),
                notification_ids: vec![id],
                status: UserNotificationStatus::Read,
            })
            .await
            .unwrap();
        assert_eq!(updated, 1);
    }

    #[tokio::test]
    async fn test_empty_ids_is_rejected() {
        let mut repo = MockUserNotificationRepository::new();
        repo.expect_set_status().never();

        let uc = SetUserNotificationStatusUseCase::new(Arc::new(repo));
        let err = uc
            .execute(&SetUserNotificationStatusInput {
                user_id: "u1".to_string(),
                notification_ids: vec![],
                status: UserNotificationStatus::Read,
            })
            .await
            .unwrap_err();
        assert!(
            matches!(err, NotificationError::Validation { ref field, .. } if field == "notification_ids")
        );
    }
}
