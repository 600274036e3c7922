use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entity::notification::{Notification, NotificationStatus};
use crate::domain::entity::user_notification::{UserNotification, UserNotificationStatus};
use crate::domain::repository::notification_repository::NotificationListParams;
use crate::domain::repository::{NotificationRepository, UserNotificationRepository};

/// InMemoryNotificationRepository は database 未設定時とテストで使う実装。
/// update_if_version 系は書き込みロック内で version の比較と更新を行うため、Postgres 実装と同じ CAS の意味を持つ。
#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<HashMap<Uuid, Notification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn find_by_id(&self, org_id: &str, id: &Uuid) -> anyhow::Result<Option<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .get(id)
            .filter(|n| n.org_id == org_id)
            .cloned())
    }

    async fn create(&self, notification: &Notification) -> anyhow::Result<()> {
        let mut notifications = self.notifications.write().await;
        if notifications.contains_key(&notification.id) {
            anyhow::bail!("notification already exists: {}", notification.id);
        }
        notifications.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn update_if_version(
        &self,
        notification: &Notification,
        expected_version: i64,
    ) -> anyhow::Result<bool> {
        let mut notifications = self.notifications.write().await;
        match notifications.get_mut(&notification.id) {
            Some(current)
                if current.org_id == notification.org_id && current.version == expected_version =>
            {
                *current = notification.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status_if_version(
        &self,
        notification: &Notification,
        expected_version: i64,
    ) -> anyhow::Result<bool> {
        let mut notifications = self.notifications.write().await;
        match notifications.get_mut(&notification.id) {
            Some(current)
                if current.org_id == notification.org_id && current.version == expected_version =>
            {
                current.status = notification.status;
                current.scheduled_at = notification.scheduled_at;
                current.sent_at = notification.sent_at;
                current.updated_at = notification.updated_at;
                current.version = notification.version;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        let mut due: Vec<Notification> = notifications
            .values()
            .filter(|n| n.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|n| n.scheduled_at);
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn list(
        &self,
        org_id: &str,
        params: &NotificationListParams,
    ) -> anyhow::Result<(Vec<Notification>, i64)> {
        let notifications = self.notifications.read().await;
        let mut matched: Vec<Notification> = notifications
            .values()
            .filter(|n| n.org_id == org_id)
            .filter(|n| params.status.map_or(true, |s| n.status == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = i64::try_from(matched.len())?;
        let page_size = usize::try_from(params.page_size.max(0))?;
        let skip = usize::try_from((params.page - 1).max(0))? * page_size;
        let page = matched.into_iter().skip(skip).take(page_size).collect();
        Ok((page, total))
    }

    async fn count_by_status(
        &self,
        org_id: &str,
    ) -> anyhow::Result<HashMap<NotificationStatus, i64>> {
        let notifications = self.notifications.read().await;
        let mut counts = HashMap::new();
        for n in notifications.values().filter(|n| n.org_id == org_id) {
            *counts.entry(n.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Default)]
pub struct InMemoryUserNotificationRepository {
    rows: RwLock<Vec<UserNotification>>,
}

impl InMemoryUserNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserNotificationRepository for InMemoryUserNotificationRepository {
    async fn create_many(&self, new_rows: &[UserNotification]) -> anyhow::Result<u64> {
        let mut rows = self.rows.write().await;
        let mut inserted = 0;
        for row in new_rows {
            let exists = rows
                .iter()
                .any(|r| r.notification_id == row.notification_id && r.user_id == row.user_id);
            if !exists {
                rows.push(row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn find_by_notification_and_user(
        &self,
        notification_id: &Uuid,
        user_id: &str,
    ) -> anyhow::Result<Option<UserNotification>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| r.notification_id == *notification_id && r.user_id == user_id)
            .cloned())
    }

    async fn find_by_notification(
        &self,
        notification_id: &Uuid,
        status: Option<UserNotificationStatus>,
    ) -> anyhow::Result<Vec<UserNotification>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.notification_id == *notification_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        user_id: &str,
        notification_ids: &[Uuid],
        status: &UserNotificationStatus,
    ) -> anyhow::Result<u64> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();
        let mut updated = 0;
        for row in rows
            .iter_mut()
            .filter(|r| r.user_id == user_id && notification_ids.contains(&r.notification_id))
        {
            row.status = *status;
            row.updated_at = now;
            updated += 1;
        }
        Ok(updated)
    }

    async fn touch_unread(&self, notification_id: &Uuid, user_ids: &[String]) -> anyhow::Result<u64> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();
        let mut touched = 0;
        for row in rows.iter_mut().filter(|r| {
            r.notification_id == *notification_id
                && r.status == UserNotificationStatus::New
                && user_ids.contains(&r.user_id)
        }) {
            row.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn count_by_status(
        &self,
        user_id: &str,
        status: &UserNotificationStatus,
    ) -> anyhow::Result<(i64, i64)> {
        let rows = self.rows.read().await;
        let mine: Vec<&UserNotification> = rows.iter().filter(|r| r.user_id == user_id).collect();
        let matching = mine.iter().filter(|r| r.status == *status).count();
        Ok((i64::try_from(matching)?, i64::try_from(mine.len())?))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::entity::audience::{Recipient, RecipientGroup};
    use crate::domain::entity::notification::{NotificationContent, NotificationFields};

    fn notification(org_id: &str, status: NotificationStatus, offset_minutes: i64) -> Notification {
        let created = Utc::now() - Duration::hours(1);
        Notification::create(
            org_id.to_string(),
            "staff-1".to_string(),
            NotificationFields {
                title: "t".to_string(),
                content: NotificationContent {
                    raw: "c".to_string(),
                    rendered_url: None,
                },
                media_ids: vec![],
                target_group: Default::default(),
                individual_receivers: vec!["u1".to_string()],
                excluded_receivers: vec![],
                is_important: false,
                status,
                scheduled_at: Some(created + Duration::minutes(offset_minutes)),
            },
            created,
        )
        .unwrap()
    }

    fn row(notification_id: Uuid, user_id: &str) -> UserNotification {
        UserNotification::new(
            "org-1".to_string(),
            notification_id,
            Recipient {
                user_id: user_id.to_string(),
                group: RecipientGroup::Individual,
                student_id: None,
            },
        )
    }

    #[tokio::test]
    async fn test_find_is_scoped_by_org() {
        let repo = InMemoryNotificationRepository::new();
        let n = notification("org-1", NotificationStatus::Draft, 0);
        repo.create(&n).await.unwrap();
        assert!(repo.find_by_id("org-1", &n.id).await.unwrap().is_some());
        assert!(repo.find_by_id("org-2", &n.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_if_version_is_compare_and_swap() {
        let repo = InMemoryNotificationRepository::new();
        let n = notification("org-1", NotificationStatus::Draft, 0);
        repo.create(&n).await.unwrap();

        let mut sent = n.clone();
        sent.mark_sent(Utc::now()).unwrap();
        assert!(repo.update_if_version(&sent, n.version).await.unwrap());
        assert!(!repo.update_if_version(&sent, n.version).await.unwrap());

        let mut other_org = sent.clone();
        other_org.org_id = "org-2".to_string();
        assert!(!repo.update_if_version(&other_org, sent.version).await.unwrap());
    }

    #[tokio::test]
    async fn test_status_update_keeps_concurrent_edit() {
        let repo = InMemoryNotificationRepository::new();
        let n = notification("org-1", NotificationStatus::Draft, 0);
        repo.create(&n).await.unwrap();

        // 読み込み後に編集がコミットされると、同じ版を前提にした状態更新は負ける
        let mut edited = n.clone();
        edited.title = "edited".to_string();
        edited.version += 1;
        assert!(repo.update_if_version(&edited, n.version).await.unwrap());

        let mut discarded = n.clone();
        discarded.discard(Utc::now()).unwrap();
        assert!(!repo.update_status_if_version(&discarded, n.version).await.unwrap());

        // 最新の版を前提にすれば成功し、状態列以外は書き換えない
        let mut discarded = edited.clone();
        discarded.title = "stale".to_string();
        discarded.discard(Utc::now()).unwrap();
        assert!(repo.update_status_if_version(&discarded, edited.version).await.unwrap());

        let stored = repo.find_by_id("org-1", &n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Discarded);
        assert_eq!(stored.title, "edited");
        assert_eq!(stored.version, edited.version + 1);
    }

    #[tokio::test]
    async fn test_find_due_scheduled_orders_and_limits() {
        let repo = InMemoryNotificationRepository::new();
        let later = notification("org-1", NotificationStatus::Scheduled, 20);
        let earlier = notification("org-2", NotificationStatus::Scheduled, 10);
        let future = notification("org-1", NotificationStatus::Scheduled, 120);
        for n in [&later, &earlier, &future] {
            repo.create(n).await.unwrap();
        }

        let due = repo.find_due_scheduled(Utc::now(), 10).await.unwrap();
        assert_eq!(due.iter().map(|n| n.id).collect::<Vec<_>>(), vec![earlier.id, later.id]);
        let limited = repo.find_due_scheduled(Utc::now(), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let repo = InMemoryNotificationRepository::new();
        repo.create(&notification("org-1", NotificationStatus::Draft, 0)).await.unwrap();
        repo.create(&notification("org-1", NotificationStatus::Scheduled, 90)).await.unwrap();
        repo.create(&notification("org-2", NotificationStatus::Draft, 0)).await.unwrap();

        let (all, total) = repo
            .list("org-1", &NotificationListParams::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(total, 2);

        let params = NotificationListParams {
            status: Some(NotificationStatus::Scheduled),
            ..Default::default()
        };
        let (scheduled, total) = repo.list("org-1", &params).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(scheduled[0].status, NotificationStatus::Scheduled);

        let counts = repo.count_by_status("org-1").await.unwrap();
        assert_eq!(counts.get(&NotificationStatus::Draft), Some(&1));
        assert_eq!(counts.get(&NotificationStatus::Scheduled), Some(&1));
        assert_eq!(counts.get(&NotificationStatus::Sent), None);
    }

    #[tokio::test]
    async fn test_create_many_skips_existing_pairs() {
        let repo = InMemoryUserNotificationRepository::new();
        let id = Uuid::new_v4();
        assert_eq!(repo.create_many(&[row(id, "u1"), row(id, "u2")]).await.unwrap(), 2);
        assert_eq!(repo.create_many(&[row(id, "u2"), row(id, "u3")]).await.unwrap(), 1);
        assert_eq!(repo.find_by_notification(&id, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_set_status_only_touches_own_rows() {
        let repo = InMemoryUserNotificationRepository::new();
        let id = Uuid::new_v4();
        repo.create_many(&[row(id, "u1"), row(id, "u2")]).await.unwrap();

        assert_eq!(
            repo.set_status("u1", &[id], &UserNotificationStatus::Read).await.unwrap(),
            1
        );
        let other = repo.find_by_notification_and_user(&id, "u2").await.unwrap().unwrap();
        assert_eq!(other.status, UserNotificationStatus::New);
        assert_eq!(
            repo.count_by_status("u1", &UserNotificationStatus::Read).await.unwrap(),
            (1, 1)
        );
        let unread = repo
            .find_by_notification(&id, Some(UserNotificationStatus::New))
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(repo.touch_unread(&id, &["u1".to_string(), "u2".to_string()]).await.unwrap(), 1);
    }
}
