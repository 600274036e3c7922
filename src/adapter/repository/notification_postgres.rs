use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::notification::{Notification, NotificationContent, NotificationStatus};
use crate::domain::entity::target_group::TargetGroup;
use crate::domain::repository::notification_repository::NotificationListParams;
use crate::domain::repository::NotificationRepository;

const COLUMNS: &str = "id, org_id, title, content_raw, content_url, media_ids, target_group, \
     individual_receivers, excluded_receivers, is_important, status, scheduled_at, \
     editor_id, created_by_id, created_at, updated_at, sent_at, version";

pub struct NotificationPostgresRepository {
    pool: Arc<PgPool>,
}

impl NotificationPostgresRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    org_id: String,
    title: String,
    content_raw: String,
    content_url: Option<String>,
    media_ids: Vec<String>,
    target_group: Json<TargetGroup>,
    individual_receivers: Vec<String>,
    excluded_receivers: Vec<String>,
    is_important: bool,
    status: String,
    scheduled_at: Option<DateTime<Utc>>,
    editor_id: String,
    created_by_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(r: NotificationRow) -> anyhow::Result<Self> {
        Ok(Notification {
            id: r.id,
            org_id: r.org_id,
            title: r.title,
            content: NotificationContent {
                raw: r.content_raw,
                rendered_url: r.content_url,
            },
            media_ids: r.media_ids,
            target_group: r.target_group.0,
            individual_receivers: r.individual_receivers,
            excluded_receivers: r.excluded_receivers,
            is_important: r.is_important,
            status: NotificationStatus::from_str_value(&r.status)?,
            scheduled_at: r.scheduled_at,
            editor_id: r.editor_id,
            created_by_id: r.created_by_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            sent_at: r.sent_at,
            version: r.version,
        })
    }
}

#[async_trait]
impl NotificationRepository for NotificationPostgresRepository {
    async fn find_by_id(&self, org_id: &str, id: &Uuid) -> anyhow::Result<Option<Notification>> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM school_notification.notifications WHERE org_id = $1 AND id = $2"
        ))
        .bind(org_id)
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create(&self, n: &Notification) -> anyhow::Result<()> {
        sqlx::query(&format!(
            "INSERT INTO school_notification.notifications ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        ))
        .bind(n.id)
        .bind(&n.org_id)
        .bind(&n.title)
        .bind(&n.content.raw)
        .bind(&n.content.rendered_url)
        .bind(&n.media_ids)
        .bind(Json(&n.target_group))
        .bind(&n.individual_receivers)
        .bind(&n.excluded_receivers)
        .bind(n.is_important)
        .bind(n.status.to_string())
        .bind(n.scheduled_at)
        .bind(&n.editor_id)
        .bind(&n.created_by_id)
        .bind(n.created_at)
        .bind(n.updated_at)
        .bind(n.sent_at)
        .bind(n.version)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn update_if_version(
        &self,
        n: &Notification,
        expected_version: i64,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE school_notification.notifications \
             SET title = $3, content_raw = $4, content_url = $5, media_ids = $6, target_group = $7, \
                 individual_receivers = $8, excluded_receivers = $9, is_important = $10, \
                 status = $11, scheduled_at = $12, editor_id = $13, updated_at = $14, sent_at = $15, \
                 version = $16 \
             WHERE org_id = $1 AND id = $2 AND version = $17",
        )
        .bind(&n.org_id)
        .bind(n.id)
        .bind(&n.title)
        .bind(&n.content.raw)
        .bind(&n.content.rendered_url)
        .bind(&n.media_ids)
        .bind(Json(&n.target_group))
        .bind(&n.individual_receivers)
        .bind(&n.excluded_receivers)
        .bind(n.is_important)
        .bind(n.status.to_string())
        .bind(n.scheduled_at)
        .bind(&n.editor_id)
        .bind(n.updated_at)
        .bind(n.sent_at)
        .bind(n.version)
        .bind(expected_version)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_status_if_version(
        &self,
        n: &Notification,
        expected_version: i64,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE school_notification.notifications \
             SET status = $3, scheduled_at = $4, sent_at = $5, updated_at = $6, version = $7 \
             WHERE org_id = $1 AND id = $2 AND version = $8",
        )
        .bind(&n.org_id)
        .bind(n.id)
        .bind(n.status.to_string())
        .bind(n.scheduled_at)
        .bind(n.sent_at)
        .bind(n.updated_at)
        .bind(n.version)
        .bind(expected_version)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM school_notification.notifications \
             WHERE status = 'SCHEDULED' AND scheduled_at <= $1 \
             ORDER BY scheduled_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list(
        &self,
        org_id: &str,
        params: &NotificationListParams,
    ) -> anyhow::Result<(Vec<Notification>, i64)> {
        let status = params.status.map(|s| s.to_string());
        let offset = i64::from((params.page - 1).max(0)) * i64::from(params.page_size);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM school_notification.notifications \
             WHERE org_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(org_id)
        .bind(&status)
        .fetch_one(self.pool.as_ref())
        .await?;

        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM school_notification.notifications \
             WHERE org_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(org_id)
        .bind(&status)
        .bind(i64::from(params.page_size))
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        let notifications = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((notifications, total))
    }

    async fn count_by_status(
        &self,
        org_id: &str,
    ) -> anyhow::Result<HashMap<NotificationStatus, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM school_notification.notifications \
             WHERE org_id = $1 GROUP BY status",
        )
        .bind(org_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter()
            .map(|(status, count)| Ok((NotificationStatus::from_str_value(&status)?, count)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::target_group::{TargetFilter, UserGroup, UserGroupFilter};

    fn row(status: &str) -> NotificationRow {
        let now = Utc::now();
        NotificationRow {
            id: Uuid::new_v4(),
            org_id: "org-1".to_string(),
            title: "Title".to_string(),
            content_raw: "Body".to_string(),
            content_url: None,
            media_ids: vec!["m1".to_string()],
            target_group: Json(TargetGroup {
                course_filter: TargetFilter::all(),
                user_group_filter: UserGroupFilter::new(vec![UserGroup::Parent]),
                ..Default::default()
            }),
            individual_receivers: vec![],
            excluded_receivers: vec![],
            is_important: true,
            status: status.to_string(),
            scheduled_at: None,
            editor_id: "staff-1".to_string(),
            created_by_id: "staff-1".to_string(),
            created_at: now,
            updated_at: now,
            sent_at: Some(now),
            version: 3,
        }
    }

    #[test]
    fn test_row_conversion() {
        let n: Notification = row("SENT").try_into().unwrap();
        assert_eq!(n.status, NotificationStatus::Sent);
        assert_eq!(n.version, 3);
        assert_eq!(n.target_group.course_filter, TargetFilter::all());
        assert!(n.target_group.user_group_filter.includes(UserGroup::Parent));
    }

    #[test]
    fn test_unknown_status_is_error() {
        let result: anyhow::Result<Notification> = row("ARCHIVED").try_into();
        assert!(result.is_err());
    }
}
