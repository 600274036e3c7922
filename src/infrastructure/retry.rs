//! 指数バックオフ付きリトライ。
//!
//! 送信確定後の UserNotification 作成とプッシュ配信、ディスパッチャーの予約送信で使用する。
//! 送信前の検証エラーや状態競合はリトライせず、そのまま呼び出し側に返す。

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::infrastructure::config::RetryConfig;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("all {attempts} attempts failed: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: E },
    #[error("non-retryable error: {0}")]
    Aborted(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::ExhaustedRetries { last_error, .. } | Self::Aborted(last_error) => last_error,
        }
    }
}

/// RetryPolicy は試行回数とバックオフ間隔を表す値オブジェクト。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            multiplier: cfg.multiplier,
            jitter: cfg.jitter,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// 待ち時間なしで max_attempts 回だけ試行する。テストやローカル実行向け。
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            jitter: false,
            ..Self::new(max_attempts)
        }
    }

    /// attempt 回目（0 始まり）の失敗後に待つ時間。
    /// initial_delay に multiplier の attempt 乗を掛け、max_delay で頭打ちにする。
    /// jitter が有効な場合は ±10% の範囲でずらす。
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = self
            .multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let capped = Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay));
        if !self.jitter {
            return capped;
        }
        let millis = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
        let spread = millis / 10;
        Duration::from_millis(
            rand::thread_rng().gen_range(millis - spread..=millis.saturating_add(spread)),
        )
    }
}

/// すべてのエラーをリトライ対象として operation を実行する。
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_when(policy, |_| true, operation).await
}

/// retryable が true を返すエラーのみリトライする。false の場合は即座に Aborted を返す。
pub async fn with_retry_when<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    retryable: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !retryable(&e) => return Err(RetryError::Aborted(e)),
            Err(e) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = max_attempts,
                    error = %e,
                    "retryable operation failed"
                );
                if attempt + 1 >= max_attempts {
                    return Err(RetryError::ExhaustedRetries {
                        attempts: max_attempts,
                        last_error: e,
                    });
                }
                let delay = policy.compute_delay(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
