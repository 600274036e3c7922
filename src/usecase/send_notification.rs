use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::domain::entity::notification::Notification;
use crate::domain::entity::user_notification::UserNotification;
use crate::domain::error::NotificationError;
use crate::domain::repository::{NotificationRepository, UserNotificationRepository};
use crate::domain::service::lifecycle::{self, LifecycleEvent};
use crate::domain::service::{PushClient, TargetGroupResolver};
use crate::infrastructure::retry::{with_retry, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendNotificationOutput {
    pub notification_id: Uuid,
    pub recipient_count: usize,
}

pub struct SendNotificationUseCase {
    notification_repo: Arc<dyn NotificationRepository>,
    user_notification_repo: Arc<dyn UserNotificationRepository>,
    resolver: Arc<TargetGroupResolver>,
    push_client: Arc<dyn PushClient>,
    retry: RetryPolicy,
    push_concurrency: usize,
    push_tasks: TaskTracker,
}

impl SendNotificationUseCase {
    pub fn new(
        notification_repo: Arc<dyn NotificationRepository>,
        user_notification_repo: Arc<dyn UserNotificationRepository>,
        resolver: Arc<TargetGroupResolver>,
        push_client: Arc<dyn PushClient>,
        retry: RetryPolicy,
        push_concurrency: usize,
    ) -> Self {
        Self {
            notification_repo,
            user_notification_repo,
            resolver,
            push_client,
            retry,
            push_concurrency: push_concurrency.max(1),
            push_tasks: TaskTracker::new(),
        }
    }

    /// プッシュ配信タスクを外部の TaskTracker で追跡する。
    /// 複数の SendNotificationUseCase が同じ tracker を共有できる。
    #[must_use]
    pub fn with_push_tracker(mut self, tracker: TaskTracker) -> Self {
        self.push_tasks = tracker;
        self
    }

    pub async fn execute(
        &self,
        org_id: &str,
        notification_id: &Uuid,
    ) -> Result<SendNotificationOutput, NotificationError> {
        let notification = self.load(org_id, notification_id).await?;
        self.send(notification).await
    }

    /// 予約配信用の送信。再読み込みした時点で now に配信期限を迎えていなければ送らない。
    /// 走査後に予約日時の変更・下書きへの戻し・破棄が入った通知は StateConflict になる。
    pub async fn execute_due(
        &self,
        org_id: &str,
        notification_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<SendNotificationOutput, NotificationError> {
        let notification = self.load(org_id, notification_id).await?;
        if !notification.is_due(now) {
            return Err(if notification.status.is_terminal() {
                lifecycle::lost_race(Some(notification.status))
            } else {
                NotificationError::StateConflict(format!(
                    "notification is no longer due, current status is {}",
                    notification.status
                ))
            });
        }
        self.send(notification).await
    }

    /// 受信者を解決してから version を CAS 条件に status を SENT に切り替える。
    /// CAS に勝った呼び出しだけが UserNotification を作成し、プッシュ配信を起動する。
    /// プッシュはバックグラウンドで行い、完了を待たずに返る。
    pub async fn send(
        &self,
        mut notification: Notification,
    ) -> Result<SendNotificationOutput, NotificationError> {
        lifecycle::transition(notification.status, LifecycleEvent::Send)?;
        let observed_version = notification.version;

        let recipients = self
            .resolver
            .resolve_notification(&notification)
            .await?
            .recipients();
        if recipients.is_empty() {
            return Err(NotificationError::validation(
                "receivers",
                "notification resolves to no recipients",
            ));
        }

        notification.mark_sent(Utc::now())?;
        let won = self
            .notification_repo
            .update_status_if_version(&notification, observed_version)
            .await
            .map_err(NotificationError::dependency)?;
        if !won {
            let current = self
                .notification_repo
                .find_by_id(&notification.org_id, &notification.id)
                .await
                .map_err(NotificationError::dependency)?;
            return Err(lifecycle::lost_race(current.map(|n| n.status)));
        }

        let rows: Vec<UserNotification> = recipients
            .into_iter()
            .map(|r| UserNotification::new(notification.org_id.clone(), notification.id, r))
            .collect();
        let inserted = with_retry(&self.retry, || {
            self.user_notification_repo.create_many(&rows)
        })
        .await
        .map_err(|e| {
            tracing::error!(
                notification_id = %notification.id,
                error = %e,
                "failed to seed user notifications after send"
            );
            NotificationError::dependency(e)
        })?;

        tracing::info!(
            notification_id = %notification.id,
            org_id = %notification.org_id,
            recipients = rows.len(),
            inserted = inserted,
            "notification sent, launching push delivery"
        );

        let recipient_count = rows.len();
        self.spawn_push(
            notification.id,
            rows.into_iter().map(|r| r.user_id).collect(),
        );
        Ok(SendNotificationOutput {
            notification_id: notification.id,
            recipient_count,
        })
    }

    /// 起動済みのプッシュ配信がすべて終わるまで待つ。
    pub async fn drain_pushes(&self) {
        self.push_tasks.close();
        self.push_tasks.wait().await;
        self.push_tasks.reopen();
    }

    async fn load(
        &self,
        org_id: &str,
        notification_id: &Uuid,
    ) -> Result<Notification, NotificationError> {
        self.notification_repo
            .find_by_id(org_id, notification_id)
            .await
            .map_err(NotificationError::dependency)?
            .ok_or_else(|| NotificationError::NotFound(format!("notification {notification_id}")))
    }

    fn spawn_push(&self, notification_id: Uuid, user_ids: Vec<String>) {
        let push_client = self.push_client.clone();
        let retry = self.retry.clone();
        let concurrency = self.push_concurrency;
        self.push_tasks.spawn(async move {
            let failed = push_to(
                push_client.as_ref(),
                &retry,
                concurrency,
                notification_id,
                &user_ids,
            )
            .await;
            tracing::info!(
                notification_id = %notification_id,
                pushed = user_ids.len() - failed,
                push_failed = failed,
                "push delivery finished"
            );
        });
    }
}

/// user_ids へ並行にプッシュし、リトライ後も失敗した件数を返す。
pub(crate) async fn push_to(
    push_client: &dyn PushClient,
    retry: &RetryPolicy,
    concurrency: usize,
    notification_id: Uuid,
    user_ids: &[String],
) -> usize {
    stream::iter(user_ids.iter().cloned())
        .map(|user_id| async move {
            match with_retry(retry, || push_client.notify(&user_id, &notification_id)).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        notification_id = %notification_id,
                        user_id = %user_id,
                        error = %e,
                        "push delivery failed"
                    );
                    false
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter(|delivered| futures::future::ready(!delivered))
        .count()
        .await
}
