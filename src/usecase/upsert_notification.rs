use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::entity::notification::{Notification, NotificationFields, NotificationStatus};
use crate::domain::error::NotificationError;
use crate::domain::repository::NotificationRepository;
use crate::domain::service::lifecycle;
use crate::domain::service::TargetGroupResolver;

#[derive(Debug, Clone)]
pub struct UpsertNotificationInput {
    pub org_id: String,
    pub editor_id: String,
    /// None の場合は新規作成、Some の場合は既存通知の編集。
    pub notification_id: Option<Uuid>,
    pub fields: NotificationFields,
}

#[derive(Debug, Clone)]
pub struct UpsertNotificationOutput {
    pub notification_id: Uuid,
    pub status: NotificationStatus,
    pub created: bool,
}

pub struct UpsertNotificationUseCase {
    repo: Arc<dyn NotificationRepository>,
    resolver: Arc<TargetGroupResolver>,
}

impl UpsertNotificationUseCase {
    pub fn new(repo: Arc<dyn NotificationRepository>, resolver: Arc<TargetGroupResolver>) -> Self {
        Self { repo, resolver }
    }

    pub async fn execute(
        &self,
        input: &UpsertNotificationInput,
    ) -> Result<UpsertNotificationOutput, NotificationError> {
        let now = Utc::now();
        match input.notification_id {
            None => {
                let notification = Notification::create(
                    input.org_id.clone(),
                    input.editor_id.clone(),
                    input.fields.clone(),
                    now,
                )?;
                self.ensure_receivers(&notification).await?;
                self.repo
                    .create(&notification)
                    .await
                    .map_err(NotificationError::dependency)?;

                tracing::info!(
                    notification_id = %notification.id,
                    org_id = %notification.org_id,
                    status = %notification.status,
                    "notification created"
                );
                Ok(UpsertNotificationOutput {
                    notification_id: notification.id,
                    status: notification.status,
                    created: true,
                })
            }
            Some(id) => {
                let mut notification = self
                    .repo
                    .find_by_id(&input.org_id, &id)
                    .await
                    .map_err(NotificationError::dependency)?
                    .ok_or_else(|| NotificationError::NotFound(format!("notification {id}")))?;
                let observed = notification.status;
                let observed_version = notification.version;

                notification.apply_edit(input.editor_id.clone(), input.fields.clone(), now)?;
                self.ensure_receivers(&notification).await?;

                let updated = self
                    .repo
                    .update_if_version(&notification, observed_version)
                    .await
                    .map_err(NotificationError::dependency)?;
                if !updated {
                    return Err(self.conflict(&input.org_id, &id).await);
                }

                tracing::info!(
                    notification_id = %id,
                    org_id = %input.org_id,
                    from = %observed,
                    to = %notification.status,
                    "notification updated"
                );
                Ok(UpsertNotificationOutput {
                    notification_id: id,
                    status: notification.status,
                    created: false,
                })
            }
        }
    }

    /// 個別指定がない場合、フィルタが 1 人以上に解決されることを確認する。
    async fn ensure_receivers(&self, notification: &Notification) -> Result<(), NotificationError> {
        if !notification.individual_receivers.is_empty() {
            return Ok(());
        }
        let audience = self.resolver.resolve_notification(notification).await?;
        if audience.is_empty() {
            return Err(NotificationError::validation(
                "receivers",
                "target group and individual receivers select nobody",
            ));
        }
        Ok(())
    }

    async fn conflict(&self, org_id: &str, id: &Uuid) -> NotificationError {
        match self.repo.find_by_id(org_id, id).await {
            Ok(current) => lifecycle::lost_race(current.map(|n| n.status)),
            Err(e) => NotificationError::dependency(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::entity::audience::StudentParent;
    use crate::domain::entity::notification::NotificationContent;
    use crate::domain::entity::target_group::{TargetFilter, TargetGroup, UserGroup, UserGroupFilter};
    use crate::domain::repository::notification_repository::MockNotificationRepository;
    use crate::domain::service::membership_oracle::MockMembershipOracle;

    fn fields(status: NotificationStatus) -> NotificationFields {
        NotificationFields {
            title: "Parent meeting".to_string(),
            content: NotificationContent {
                raw: "Meeting on Monday".to_string(),
                rendered_url: None,
            },
            media_ids: vec![],
            target_group: TargetGroup {
                course_filter: TargetFilter::list(["course-1"]),
                user_group_filter: UserGroupFilter::new(vec![UserGroup::Parent]),
                ..Default::default()
            },
            individual_receivers: vec![],
            excluded_receivers: vec![],
            is_important: true,
            status,
            scheduled_at: match status {
                NotificationStatus::Scheduled => Some(Utc::now() + Duration::hours(2)),
                _ => None,
            },
        }
    }

    fn resolver_with_parent() -> Arc<TargetGroupResolver> {
        let mut oracle = MockMembershipOracle::new();
        oracle
            .expect_students_in_courses()
            .returning(|_, _| Ok(vec!["s1".to_string()]));
        oracle.expect_parents_of().returning(|_, _| {
            Ok(vec![StudentParent {
                student_id: "s1".to_string(),
                parent_id: "p1".to_string(),
            }])
        });
        Arc::new(TargetGroupResolver::new(Arc::new(oracle)))
    }

    fn input(notification_id: Option<Uuid>, status: NotificationStatus) -> UpsertNotificationInput {
        UpsertNotificationInput {
            org_id: "org-1".to_string(),
            editor_id: "staff-1".to_string(),
            notification_id,
            fields: fields(status),
        }
    }

    #[tokio::test]
    async fn test_create_scheduled() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_create()
            .withf(|n| n.status == NotificationStatus::Scheduled && n.scheduled_at.is_some())
            .times(1)
            .returning(|_| Ok(()));

        let uc = UpsertNotificationUseCase::new(Arc::new(repo), resolver_with_parent());
        let output = uc
            .execute(&input(None, NotificationStatus::Scheduled))
            .await
            .unwrap();
        assert!(output.created);
        assert_eq!(output.status, NotificationStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_create_without_any_receiver_is_rejected() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_create().never();
        let mut oracle = MockMembershipOracle::new();
        oracle
            .expect_students_in_courses()
            .returning(|_, _| Ok(vec![]));

        let uc = UpsertNotificationUseCase::new(
            Arc::new(repo),
            Arc::new(TargetGroupResolver::new(Arc::new(oracle))),
        );
        let err = uc
            .execute(&input(None, NotificationStatus::Draft))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Validation { ref field, .. } if field == "receivers"));
    }

    #[tokio::test]
    async fn test_individual_receivers_skip_resolution() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_create().returning(|_| Ok(()));
        // oracle に期待を設定しないため、呼ばれた時点でテストが失敗する
        let oracle = MockMembershipOracle::new();
        let uc = UpsertNotificationUseCase::new(
            Arc::new(repo),
            Arc::new(TargetGroupResolver::new(Arc::new(oracle))),
        );
        let mut req = input(None, NotificationStatus::Draft);
        req.fields.individual_receivers = vec!["staff-2".to_string()];
        assert!(uc.execute(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_edit_uses_observed_version_for_cas() {
        let existing = Notification::create(
            "org-1".to_string(),
            "staff-1".to_string(),
            fields(NotificationStatus::Scheduled),
            Utc::now(),
        )
        .unwrap();
        let id = existing.id;

        let mut repo = MockNotificationRepository::new();
        let returned = existing.clone();
        repo.expect_find_by_id()
            .returning(move |_, _| Ok(Some(returned.clone())));
        repo.expect_update_if_version()
            .withf(|n, expected_version| {
                n.status == NotificationStatus::Draft && n.version == 1 && *expected_version == 0
            })
            .times(1)
            .returning(|_, _| Ok(true));

        let uc = UpsertNotificationUseCase::new(Arc::new(repo), resolver_with_parent());
        let output = uc
            .execute(&input(Some(id), NotificationStatus::Draft))
            .await
            .unwrap();
        assert!(!output.created);
        assert_eq!(output.status, NotificationStatus::Draft);
    }

    #[tokio::test]
    async fn test_edit_sent_notification_is_conflict() {
        let mut sent = Notification::create(
            "org-1".to_string(),
            "staff-1".to_string(),
            fields(NotificationStatus::Draft),
            Utc::now(),
        )
        .unwrap();
        sent.mark_sent(Utc::now()).unwrap();
        let id = sent.id;

        let mut repo = MockNotificationRepository::new();
        repo.expect_find_by_id()
            .returning(move |_, _| Ok(Some(sent.clone())));
        repo.expect_update_if_version().never();

        let uc = UpsertNotificationUseCase::new(Arc::new(repo), resolver_with_parent());
        let err = uc
            .execute(&input(Some(id), NotificationStatus::Draft))
            .await
            .unwrap_err();
        match err {
            NotificationError::StateConflict(msg) => {
                assert_eq!(msg, lifecycle::SENT_CONFLICT_MESSAGE);
            }
            e => unreachable!("unexpected error: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_edit_losing_race_to_send_is_conflict() {
        let draft = Notification::create(
            "org-1".to_string(),
            "staff-1".to_string(),
            fields(NotificationStatus::Draft),
            Utc::now(),
        )
        .unwrap();
        let id = draft.id;
        let mut sent = draft.clone();
        sent.mark_sent(Utc::now()).unwrap();

        let mut repo = MockNotificationRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(Some(draft.clone())));
        repo.expect_update_if_version()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(false));
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(Some(sent.clone())));

        let uc = UpsertNotificationUseCase::new(Arc::new(repo), resolver_with_parent());
        let err = uc
            .execute(&input(Some(id), NotificationStatus::Draft))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::StateConflict(_)));
    }

    #[tokio::test]
    async fn test_edit_losing_race_to_another_edit_is_conflict() {
        let draft = Notification::create(
            "org-1".to_string(),
            "staff-1".to_string(),
            fields(NotificationStatus::Draft),
            Utc::now(),
        )
        .unwrap();
        let id = draft.id;
        let mut edited = draft.clone();
        edited.title = "Edited elsewhere".to_string();
        edited.version += 1;

        let mut repo = MockNotificationRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(Some(draft.clone())));
        repo.expect_update_if_version()
            .withf(|_, expected_version| *expected_version == 0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(false));
        repo.expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| Ok(Some(edited.clone())));

        let uc = UpsertNotificationUseCase::new(Arc::new(repo), resolver_with_parent());
        match uc
            .execute(&input(Some(id), NotificationStatus::Draft))
            .await
            .unwrap_err()
        {
            NotificationError::StateConflict(msg) => {
                assert!(msg.contains("modified concurrently"));
                assert!(msg.contains("DRAFT"));
            }
            e => unreachable!("unexpected error: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_edit_missing_notification() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_find_by_id().returning(|_, _| Ok(None));

        let uc = UpsertNotificationUseCase::new(Arc::new(repo), resolver_with_parent());
        let err = uc
            .execute(&input(Some(Uuid::new_v4()), NotificationStatus::Draft))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_repository_failure_is_dependency_error() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_create()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let uc = UpsertNotificationUseCase::new(Arc::new(repo), resolver_with_parent());
        let err = uc
            .execute(&input(None, NotificationStatus::Draft))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Dependency(_)));
    }
}
