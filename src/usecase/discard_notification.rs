use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::error::NotificationError;
use crate::domain::repository::NotificationRepository;
use crate::domain::service::lifecycle;

pub struct DiscardNotificationUseCase {
    repo: Arc<dyn NotificationRepository>,
}

impl DiscardNotificationUseCase {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, org_id: &str, id: &Uuid) -> Result<(), NotificationError> {
        let mut notification = self
            .repo
            .find_by_id(org_id, id)
            .await
            .map_err(NotificationError::dependency)?
            .ok_or_else(|| NotificationError::NotFound(format!("notification {id}")))?;
        let observed = notification.status;
        let observed_version = notification.version;
        notification.discard(Utc::now())?;

        let updated = self
            .repo
            .update_status_if_version(&notification, observed_version)
            .await
            .map_err(NotificationError::dependency)?;
        if !updated {
            let current = self
                .repo
                .find_by_id(org_id, id)
                .await
                .map_err(NotificationError::dependency)?;
            return Err(lifecycle::lost_race(current.map(|n| n.status)));
        }

        tracing::info!(notification_id = %id, org_id = %org_id, from = %observed, "notification discarded");
        Ok(())
    }
}
