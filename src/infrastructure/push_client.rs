use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use crate::domain::service::{PushClient, PushError};
use crate::infrastructure::config::PushConfig;

/// WebhookPushClient はプッシュ配信ゲートウェイの webhook に配信要求を POST する。
pub struct WebhookPushClient {
    url: String,
    headers: HashMap<String, String>,
    client: Client,
}

impl WebhookPushClient {
    pub fn new(config: &PushConfig) -> Result<Self, PushError> {
        let parsed = url::Url::parse(&config.webhook_url)
            .map_err(|e| PushError::Rejected(format!("invalid webhook_url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PushError::Rejected(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PushError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            url: config.webhook_url.clone(),
            headers: config.headers.clone(),
            client,
        })
    }
}

#[async_trait]
impl PushClient for WebhookPushClient {
    async fn notify(&self, user_id: &str, notification_id: &Uuid) -> Result<(), PushError> {
        let payload = json!({
            "user_id": user_id,
            "notification_id": notification_id,
        });

        let mut request = self.client.post(&self.url).json(&payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(PushError::Rejected(format!(
                "push gateway returned {status}: {body_text}"
            )));
        }
        Ok(())
    }
}

/// NoopPushClient は push 設定がない環境で使う。配信要求をログに残すだけ。
pub struct NoopPushClient;

#[async_trait]
impl PushClient for NoopPushClient {
    async fn notify(&self, user_id: &str, notification_id: &Uuid) -> Result<(), PushError> {
        tracing::debug!(user_id = %user_id, notification_id = %notification_id, "push skipped (noop)");
        Ok(())
    }
}
