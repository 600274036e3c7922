use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::error::NotificationError;
use crate::domain::repository::NotificationRepository;
use crate::infrastructure::retry::{with_retry_when, RetryError, RetryPolicy};
use crate::usecase::send_notification::SendNotificationUseCase;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    /// 他のノードが先に送信した、または取得後に編集・破棄・再予約された件数。
    pub skipped: usize,
    pub failed: usize,
}

/// 予約日時を過ぎた SCHEDULED 通知を送信する。
/// 送信直前に読み直した通知が配信期限を迎えていない場合は送らない。
/// 複数ノードで同時に実行しても version の CAS によって各通知は一度だけ送信される。
pub struct DispatchScheduledNotificationsUseCase {
    notification_repo: Arc<dyn NotificationRepository>,
    send: Arc<SendNotificationUseCase>,
    retry: RetryPolicy,
    batch_size: i64,
}

impl DispatchScheduledNotificationsUseCase {
    pub fn new(
        notification_repo: Arc<dyn NotificationRepository>,
        send: Arc<SendNotificationUseCase>,
        retry: RetryPolicy,
        batch_size: i64,
    ) -> Self {
        Self {
            notification_repo,
            send,
            retry,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn execute(&self, now: DateTime<Utc>) -> Result<DispatchSummary, NotificationError> {
        let due = self
            .notification_repo
            .find_due_scheduled(now, self.batch_size)
            .await
            .map_err(NotificationError::dependency)?;

        let mut summary = DispatchSummary::default();
        for notification in due {
            let org_id = notification.org_id.clone();
            let id = notification.id;
            // リトライのたびに最新の状態を読み直す
            let result = with_retry_when(&self.retry, NotificationError::is_retryable, || {
                self.send.execute_due(&org_id, &id, now)
            })
            .await;

            match result {
                Ok(output) => {
                    summary.sent += 1;
                    tracing::info!(
                        notification_id = %id,
                        org_id = %org_id,
                        recipients = output.recipient_count,
                        "scheduled notification dispatched"
                    );
                }
                Err(RetryError::Aborted(NotificationError::StateConflict(msg))) => {
                    summary.skipped += 1;
                    tracing::debug!(notification_id = %id, reason = %msg, "scheduled notification skipped");
                }
                Err(RetryError::Aborted(NotificationError::NotFound(_))) => {
                    summary.skipped += 1;
                    tracing::debug!(notification_id = %id, "scheduled notification disappeared");
                }
                Err(RetryError::Aborted(e @ NotificationError::Validation { .. })) => {
                    summary.failed += 1;
                    tracing::warn!(
                        notification_id = %id,
                        org_id = %org_id,
                        error = %e,
                        "scheduled notification cannot be sent and stays SCHEDULED"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        notification_id = %id,
                        org_id = %org_id,
                        error = %e,
                        "scheduled notification dispatch failed"
                    );
                }
            }
        }

        if summary != DispatchSummary::default() {
            tracing::info!(
                sent = summary.sent,
                skipped = summary.skipped,
                failed = summary.failed,
                "dispatch tick finished"
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::entity::notification::{
        Notification, NotificationContent, NotificationFields, NotificationStatus,
    };
    use crate::domain::repository::notification_repository::MockNotificationRepository;
    use crate::domain::repository::user_notification_repository::MockUserNotificationRepository;
    use crate::domain::service::membership_oracle::MockMembershipOracle;
    use crate::domain::service::push_client::MockPushClient;
    use crate::domain::service::TargetGroupResolver;

    fn scheduled(org_id: &str) -> Notification {
        let created = Utc::now() - Duration::hours(2);
        Notification::create(
            org_id.to_string(),
            "staff-1".to_string(),
            NotificationFields {
                title: "Exam".to_string(),
                content: NotificationContent {
                    raw: "Exam starts at 9".to_string(),
                    rendered_url: None,
                },
                media_ids: vec![],
                target_group: Default::default(),
                individual_receivers: vec!["u1".to_string()],
                excluded_receivers: vec![],
                is_important: true,
                status: NotificationStatus::Scheduled,
                scheduled_at: Some(created + Duration::hours(1)),
            },
            created,
        )
        .unwrap()
    }

    fn usecase(
        notification_repo: MockNotificationRepository,
        user_repo: MockUserNotificationRepository,
        push: MockPushClient,
    ) -> DispatchScheduledNotificationsUseCase {
        let notification_repo = Arc::new(notification_repo);
        let send = SendNotificationUseCase::new(
            notification_repo.clone(),
            Arc::new(user_repo),
            Arc::new(TargetGroupResolver::new(Arc::new(MockMembershipOracle::new()))),
            Arc::new(push),
            RetryPolicy::immediate(1),
            2,
        );
        DispatchScheduledNotificationsUseCase::new(
            notification_repo,
            Arc::new(send),
            RetryPolicy::immediate(3),
            50,
        )
    }

    #[tokio::test]
    async fn test_sends_due_notifications() {
        let due = scheduled("org-1");
        let mut repo = MockNotificationRepository::new();
        let listed = due.clone();
        repo.expect_find_due_scheduled()
            .withf(|_, limit| *limit == 50)
            .returning(move |_, _| Ok(vec![listed.clone()]));
        repo.expect_find_by_id()
            .returning(move |_, _| Ok(Some(due.clone())));
        repo.expect_update_status_if_version()
            .withf(|n, expected_version| {
                n.status == NotificationStatus::Sent && *expected_version == 0
            })
            .times(1)
            .returning(|_, _| Ok(true));
        let mut user_repo = MockUserNotificationRepository::new();
        user_repo.expect_create_many().returning(|rows| Ok(rows.len() as u64));
        let mut push = MockPushClient::new();
        push.expect_notify().returning(|_, _| Ok(()));

        let summary = usecase(repo, user_repo, push).execute(Utc::now()).await.unwrap();
        assert_eq!(
            summary,
            DispatchSummary {
                sent: 1,
                skipped: 0,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_lost_race_is_skipped() {
        let due = scheduled("org-1");
        let mut sent = due.clone();
        sent.mark_sent(Utc::now()).unwrap();

        let mut repo = MockNotificationRepository::new();
        let listed = due.clone();
        repo.expect_find_due_scheduled()
            .returning(move |_, _| Ok(vec![listed.clone()]));
        // 取得時点で既に他ノードが送信済み
        repo.expect_find_by_id()
            .returning(move |_, _| Ok(Some(sent.clone())));
        repo.expect_update_status_if_version().never();
        let mut user_repo = MockUserNotificationRepository::new();
        user_repo.expect_create_many().never();

        let summary = usecase(repo, user_repo, MockPushClient::new())
            .execute(Utc::now())
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.sent, 0);
    }

    #[tokio::test]
    async fn test_rescheduled_after_scan_is_skipped() {
        let due = scheduled("org-1");
        let now = Utc::now();
        let mut rescheduled = due.clone();
        rescheduled.scheduled_at = Some(now + Duration::days(1));
        rescheduled.version += 1;

        let mut repo = MockNotificationRepository::new();
        repo.expect_find_due_scheduled()
            .returning(move |_, _| Ok(vec![due.clone()]));
        // 走査の後、送信前に予約日時が翌日へ変更された
        repo.expect_find_by_id()
            .returning(move |_, _| Ok(Some(rescheduled.clone())));
        repo.expect_update_status_if_version().never();
        let mut user_repo = MockUserNotificationRepository::new();
        user_repo.expect_create_many().never();
        let mut push = MockPushClient::new();
        push.expect_notify().never();

        let summary = usecase(repo, user_repo, push).execute(now).await.unwrap();
        assert_eq!(
            summary,
            DispatchSummary {
                sent: 0,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_dependency_failure_is_retried() {
        let due = scheduled("org-1");
        let mut repo = MockNotificationRepository::new();
        let listed = due.clone();
        repo.expect_find_due_scheduled()
            .returning(move |_, _| Ok(vec![listed.clone()]));
        let mut seq = mockall::Sequence::new();
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(anyhow::anyhow!("connection reset")));
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(Some(due.clone())));
        repo.expect_update_status_if_version().returning(|_, _| Ok(true));
        let mut user_repo = MockUserNotificationRepository::new();
        user_repo.expect_create_many().returning(|rows| Ok(rows.len() as u64));
        let mut push = MockPushClient::new();
        push.expect_notify().returning(|_, _| Ok(()));

        let summary = usecase(repo, user_repo, push).execute(Utc::now()).await.unwrap();
        assert_eq!(summary.sent, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_counted_as_failed() {
        let due = scheduled("org-1");
        let mut repo = MockNotificationRepository::new();
        repo.expect_find_due_scheduled()
            .returning(move |_, _| Ok(vec![due.clone()]));
        repo.expect_find_by_id()
            .times(3)
            .returning(|_, _| Err(anyhow::anyhow!("connection reset")));

        let summary = usecase(repo, MockUserNotificationRepository::new(), MockPushClient::new())
            .execute(Utc::now())
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_returned() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_find_due_scheduled()
            .returning(|_, _| Err(anyhow::anyhow!("db down")));

        let result = usecase(repo, MockUserNotificationRepository::new(), MockPushClient::new())
            .execute(Utc::now())
            .await;
        assert!(matches!(result, Err(NotificationError::Dependency(_))));
    }
}
