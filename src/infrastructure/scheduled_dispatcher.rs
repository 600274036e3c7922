use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::usecase::DispatchScheduledNotificationsUseCase;

/// ScheduledDispatcher は一定間隔で予約通知の送信を実行するバックグラウンドループ。
/// 各 tick は独立しており、失敗しても次の tick に影響しない。
pub struct ScheduledDispatcher {
    dispatch: Arc<DispatchScheduledNotificationsUseCase>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl ScheduledDispatcher {
    pub fn new(dispatch: Arc<DispatchScheduledNotificationsUseCase>, interval: Duration) -> Self {
        Self {
            dispatch,
            interval,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let dispatch = self.dispatch.clone();
        let interval = self.interval;
        let token = self.cancel_token.clone();

        tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "scheduled dispatcher started");
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(interval) => {
                        if let Err(e) = dispatch.execute(Utc::now()).await {
                            tracing::error!(error = %e, "dispatch tick error");
                        }
                    }
                }
            }
            tracing::info!("scheduled dispatcher stopped");
        })
    }

    /// ループを停止する。送信済みの通知は取り消されない。
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }
}
