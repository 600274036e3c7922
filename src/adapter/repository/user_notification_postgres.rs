use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::audience::RecipientGroup;
use crate::domain::entity::user_notification::{UserNotification, UserNotificationStatus};
use crate::domain::repository::UserNotificationRepository;

pub struct UserNotificationPostgresRepository {
    pool: Arc<PgPool>,
}

impl UserNotificationPostgresRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserNotificationRow {
    id: Uuid,
    org_id: String,
    notification_id: Uuid,
    user_id: String,
    user_group: String,
    student_id: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserNotificationRow> for UserNotification {
    type Error = anyhow::Error;

    fn try_from(r: UserNotificationRow) -> anyhow::Result<Self> {
        Ok(UserNotification {
            id: r.id,
            org_id: r.org_id,
            notification_id: r.notification_id,
            user_id: r.user_id,
            user_group: RecipientGroup::from_str_value(&r.user_group)?,
            student_id: r.student_id,
            status: UserNotificationStatus::from_str_value(&r.status)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[async_trait]
impl UserNotificationRepository for UserNotificationPostgresRepository {
    async fn create_many(&self, rows: &[UserNotification]) -> anyhow::Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let org_ids: Vec<&str> = rows.iter().map(|r| r.org_id.as_str()).collect();
        let notification_ids: Vec<Uuid> = rows.iter().map(|r| r.notification_id).collect();
        let user_ids: Vec<&str> = rows.iter().map(|r| r.user_id.as_str()).collect();
        let groups: Vec<String> = rows.iter().map(|r| r.user_group.to_string()).collect();
        let student_ids: Vec<Option<&str>> = rows.iter().map(|r| r.student_id.as_deref()).collect();
        let statuses: Vec<String> = rows.iter().map(|r| r.status.to_string()).collect();
        let created: Vec<DateTime<Utc>> = rows.iter().map(|r| r.created_at).collect();

        let result = sqlx::query(
            "INSERT INTO school_notification.user_notifications \
             (id, org_id, notification_id, user_id, user_group, student_id, status, created_at, updated_at) \
             SELECT t.id, t.org_id, t.notification_id, t.user_id, t.user_group, t.student_id, t.status, t.created_at, t.created_at \
             FROM UNNEST($1::uuid[], $2::text[], $3::uuid[], $4::text[], $5::text[], $6::text[], $7::text[], $8::timestamptz[]) \
                  AS t(id, org_id, notification_id, user_id, user_group, student_id, status, created_at) \
             ON CONFLICT (notification_id, user_id) DO NOTHING",
        )
        .bind(&ids)
        .bind(&org_ids)
        .bind(&notification_ids)
        .bind(&user_ids)
        .bind(&groups)
        .bind(&student_ids)
        .bind(&statuses)
        .bind(&created)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_by_notification_and_user(
        &self,
        notification_id: &Uuid,
        user_id: &str,
    ) -> anyhow::Result<Option<UserNotification>> {
        let row: Option<UserNotificationRow> = sqlx::query_as(
            "SELECT id, org_id, notification_id, user_id, user_group, student_id, status, created_at, updated_at \
             FROM school_notification.user_notifications WHERE notification_id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_by_notification(
        &self,
        notification_id: &Uuid,
        status: Option<UserNotificationStatus>,
    ) -> anyhow::Result<Vec<UserNotification>> {
        let rows: Vec<UserNotificationRow> = sqlx::query_as(
            "SELECT id, org_id, notification_id, user_id, user_group, student_id, status, created_at, updated_at \
             FROM school_notification.user_notifications \
             WHERE notification_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at ASC",
        )
        .bind(notification_id)
        .bind(status.map(|s| s.to_string()))
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_status(
        &self,
        user_id: &str,
        notification_ids: &[Uuid],
        status: &UserNotificationStatus,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE school_notification.user_notifications \
             SET status = $3, updated_at = NOW() \
             WHERE user_id = $1 AND notification_id = ANY($2)",
        )
        .bind(user_id)
        .bind(notification_ids)
        .bind(status.to_string())
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    async fn touch_unread(&self, notification_id: &Uuid, user_ids: &[String]) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE school_notification.user_notifications \
             SET updated_at = NOW() \
             WHERE notification_id = $1 AND user_id = ANY($2) AND status = 'NEW'",
        )
        .bind(notification_id)
        .bind(user_ids)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_by_status(
        &self,
        user_id: &str,
        status: &UserNotificationStatus,
    ) -> anyhow::Result<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE status = $2), COUNT(*) \
             FROM school_notification.user_notifications WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(status.to_string())
        .fetch_one(self.pool.as_ref())
        .await?;
        Ok(counts)
    }
}
