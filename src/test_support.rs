//! テスト用インメモリ構成とヘルパー。
//! 統合テスト（tests/integration_test.rs）から利用する。

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::adapter::handler::AppState;
use crate::adapter::repository::membership_in_memory::InMemoryMembershipOracle;
use crate::adapter::repository::notification_in_memory::{
    InMemoryNotificationRepository, InMemoryUserNotificationRepository,
};
use crate::domain::repository::NotificationRepository;
use crate::domain::service::push_client::PushError;
use crate::domain::service::{PushClient, TargetGroupResolver};
use crate::infrastructure::retry::RetryPolicy;
use crate::usecase::{
    CountNotificationForStatusUseCase, CountUserNotificationUseCase, DiscardNotificationUseCase,
    DispatchScheduledNotificationsUseCase, ListNotificationsUseCase, NotifyUnreadUserUseCase,
    RetrieveNotificationDetailUseCase, SendNotificationUseCase, SetUserNotificationStatusUseCase,
    UpsertNotificationUseCase,
};

const TEST_PUSH_CONCURRENCY: usize = 4;

// ---------------------------------------------------------------------------
// RecordingPushClient
// ---------------------------------------------------------------------------

/// 送信されたプッシュを記録するテスト用 PushClient。
/// fail_for に登録したユーザーへのプッシュは常に失敗する。
#[derive(Debug, Default)]
pub struct RecordingPushClient {
    sent: Mutex<Vec<(String, Uuid)>>,
    failing_users: Mutex<HashSet<String>>,
}

impl RecordingPushClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, user_id: &str) {
        self.failing_users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string());
    }

    /// 記録済みプッシュの (user_id, notification_id) 一覧。
    pub fn sent(&self) -> Vec<(String, Uuid)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent_to(&self, notification_id: &Uuid) -> Vec<String> {
        let mut users: Vec<String> = self
            .sent()
            .into_iter()
            .filter(|(_, id)| id == notification_id)
            .map(|(user, _)| user)
            .collect();
        users.sort();
        users
    }
}

#[async_trait]
impl PushClient for RecordingPushClient {
    async fn notify(&self, user_id: &str, notification_id: &Uuid) -> Result<(), PushError> {
        let failing = self
            .failing_users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user_id);
        if failing {
            return Err(PushError::Rejected(format!("device not registered: {user_id}")));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id.to_string(), *notification_id));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TestDeps
// ---------------------------------------------------------------------------

/// テストで共有するインメモリ依存一式。
#[derive(Clone, Default)]
pub struct TestDeps {
    pub notification_repo: Arc<InMemoryNotificationRepository>,
    pub user_notification_repo: Arc<InMemoryUserNotificationRepository>,
    pub oracle: Arc<InMemoryMembershipOracle>,
    pub push: Arc<RecordingPushClient>,
    /// 送信ユースケースが起動したプッシュ配信タスク。
    pub push_tasks: TaskTracker,
}

impl TestDeps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_use_case(&self) -> Arc<SendNotificationUseCase> {
        self.send_use_case_over(self.notification_repo.clone())
    }

    /// notification_repo を差し替えた SendNotificationUseCase を生成する。
    /// 他の依存とプッシュ配信の追跡は共有する。
    pub fn send_use_case_over(
        &self,
        notification_repo: Arc<dyn NotificationRepository>,
    ) -> Arc<SendNotificationUseCase> {
        Arc::new(
            SendNotificationUseCase::new(
                notification_repo,
                self.user_notification_repo.clone(),
                self.resolver(),
                self.push.clone(),
                RetryPolicy::immediate(2),
                TEST_PUSH_CONCURRENCY,
            )
            .with_push_tracker(self.push_tasks.clone()),
        )
    }

    pub fn upsert_use_case_over(
        &self,
        notification_repo: Arc<dyn NotificationRepository>,
    ) -> Arc<UpsertNotificationUseCase> {
        Arc::new(UpsertNotificationUseCase::new(
            notification_repo,
            self.resolver(),
        ))
    }

    /// バックグラウンドのプッシュ配信がすべて終わるまで待つ。
    pub async fn settle(&self) {
        self.push_tasks.close();
        self.push_tasks.wait().await;
        self.push_tasks.reopen();
    }

    /// 独立した SendNotificationUseCase を持つディスパッチャーを生成する。
    /// 複数ノードの同時実行をテストする場合は、このメソッドを複数回呼ぶ。
    pub fn dispatch_use_case(&self, batch_size: i64) -> DispatchScheduledNotificationsUseCase {
        self.dispatch_use_case_over(self.notification_repo.clone(), batch_size)
    }

    pub fn dispatch_use_case_over(
        &self,
        notification_repo: Arc<dyn NotificationRepository>,
        batch_size: i64,
    ) -> DispatchScheduledNotificationsUseCase {
        DispatchScheduledNotificationsUseCase::new(
            notification_repo.clone(),
            self.send_use_case_over(notification_repo),
            RetryPolicy::immediate(2),
            batch_size,
        )
    }

    fn resolver(&self) -> Arc<TargetGroupResolver> {
        Arc::new(TargetGroupResolver::new(self.oracle.clone()))
    }
}

/// テスト用 AppState を生成する。
pub fn make_test_app_state(deps: &TestDeps) -> AppState {
    AppState {
        upsert_notification_uc: deps.upsert_use_case_over(deps.notification_repo.clone()),
        send_notification_uc: deps.send_use_case(),
        discard_notification_uc: Arc::new(DiscardNotificationUseCase::new(
            deps.notification_repo.clone(),
        )),
        notify_unread_uc: Arc::new(NotifyUnreadUserUseCase::new(
            deps.notification_repo.clone(),
            deps.user_notification_repo.clone(),
            deps.push.clone(),
            RetryPolicy::immediate(2),
            TEST_PUSH_CONCURRENCY,
        )),
        retrieve_detail_uc: Arc::new(RetrieveNotificationDetailUseCase::new(
            deps.notification_repo.clone(),
            deps.user_notification_repo.clone(),
        )),
        list_notifications_uc: Arc::new(ListNotificationsUseCase::new(
            deps.notification_repo.clone(),
        )),
        count_for_status_uc: Arc::new(CountNotificationForStatusUseCase::new(
            deps.notification_repo.clone(),
        )),
        set_user_status_uc: Arc::new(SetUserNotificationStatusUseCase::new(
            deps.user_notification_repo.clone(),
        )),
        count_user_uc: Arc::new(CountUserNotificationUseCase::new(
            deps.user_notification_repo.clone(),
        )),
        db_pool: None,
    }
}
