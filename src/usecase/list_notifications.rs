use std::sync::Arc;

use crate::domain::entity::notification::Notification;
use crate::domain::error::NotificationError;
use crate::domain::repository::notification_repository::NotificationListParams;
use crate::domain::repository::NotificationRepository;

const MAX_PAGE_SIZE: i32 = 100;

#[derive(Debug, Clone)]
pub struct ListNotificationsOutput {
    pub notifications: Vec<Notification>,
    pub total_count: i64,
    pub page: i32,
    pub page_size: i32,
    pub has_next: bool,
}

pub struct ListNotificationsUseCase {
    repo: Arc<dyn NotificationRepository>,
}

impl ListNotificationsUseCase {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(
        &self,
        org_id: &str,
        params: &NotificationListParams,
    ) -> Result<ListNotificationsOutput, NotificationError> {
        if params.page < 1 {
            return Err(NotificationError::validation("page", "page must be >= 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&params.page_size) {
            return Err(NotificationError::validation(
                "page_size",
                format!("page_size must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }

        let (notifications, total_count) = self
            .repo
            .list(org_id, params)
            .await
            .map_err(NotificationError::dependency)?;
        let has_next = i64::from(params.page) * i64::from(params.page_size) < total_count;

        Ok(ListNotificationsOutput {
            notifications,
            total_count,
            page: params.page,
            page_size: params.page_size,
            has_next,
        })
    }
}
