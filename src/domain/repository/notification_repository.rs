use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entity::notification::{Notification, NotificationStatus};

#[derive(Debug, Clone)]
pub struct NotificationListParams {
    pub status: Option<NotificationStatus>,
    pub page: i32,
    pub page_size: i32,
}

impl Default for NotificationListParams {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            page_size: 20,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn find_by_id(&self, org_id: &str, id: &Uuid) -> anyhow::Result<Option<Notification>>;
    async fn create(&self, notification: &Notification) -> anyhow::Result<()>;
    /// 永続化されている version が expected_version と一致する場合のみ全項目を上書きする。
    /// 一致しなかった場合は false を返す（CAS に負けた）。
    async fn update_if_version(
        &self,
        notification: &Notification,
        expected_version: i64,
    ) -> anyhow::Result<bool>;
    /// update_if_version と同じ条件で、状態遷移に関わる列
    /// （status, scheduled_at, sent_at, updated_at, version）だけを書き込む。
    async fn update_status_if_version(
        &self,
        notification: &Notification,
        expected_version: i64,
    ) -> anyhow::Result<bool>;
    /// scheduled_at が now 以前の SCHEDULED 通知を古い順に最大 limit 件返す。組織を横断する。
    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<Notification>>;
    async fn list(
        &self,
        org_id: &str,
        params: &NotificationListParams,
    ) -> anyhow::Result<(Vec<Notification>, i64)>;
    async fn count_by_status(
        &self,
        org_id: &str,
    ) -> anyhow::Result<HashMap<NotificationStatus, i64>>;
}
