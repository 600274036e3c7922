use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::entity::notification::NotificationStatus;
use crate::domain::error::NotificationError;
use crate::domain::repository::NotificationRepository;

/// ステータスごとの件数と合計。存在しないステータスは 0 で埋める。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationStatusCounts {
    pub counts: Vec<(NotificationStatus, i64)>,
    pub total: i64,
}

pub struct CountNotificationForStatusUseCase {
    repo: Arc<dyn NotificationRepository>,
}

impl CountNotificationForStatusUseCase {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, org_id: &str) -> Result<NotificationStatusCounts, NotificationError> {
        let by_status: HashMap<NotificationStatus, i64> = self
            .repo
            .count_by_status(org_id)
            .await
            .map_err(NotificationError::dependency)?;

        let counts: Vec<(NotificationStatus, i64)> = NotificationStatus::ALL
            .into_iter()
            .map(|status| (status, by_status.get(&status).copied().unwrap_or(0)))
            .collect();
        let total = counts.iter().map(|(_, c)| c).sum();
        Ok(NotificationStatusCounts { counts, total })
    }
}
