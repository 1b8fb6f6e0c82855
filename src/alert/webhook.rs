//! HTTP webhook delivery.

use super::{AlertDispatcher, AlertError};
use crate::detect::AlertEvent;
use std::time::Duration;
use tracing::debug;

pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    /// Every request is bounded by `timeout`, connect included.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl AlertDispatcher for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let payload = serde_json::json!({
            "reason": event.trigger_reason,
            "event": event,
        });
        let resp = self.client.post(&self.url).json(&payload).send().await?;
        let status = resp.status();
        debug!(url = %self.url, %status, "Webhook delivered");
        if !status.is_success() {
            return Err(AlertError::WebhookStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
