//! Alert delivery: ticket files, webhooks, and the incident store.
//!
//! Delivery is best-effort. An alert counts as raised once the breach tracker
//! emits it; dispatch failures are reported to the caller, never retried here.

pub mod ticket;
pub mod webhook;

use crate::detect::AlertEvent;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub use self::ticket::{write_evidence, Ticket, TicketWindow, TicketWriter};
pub use self::webhook::WebhookDispatcher;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),

    #[error("webhook returned HTTP {status}")]
    WebhookStatus { status: u16 },

    #[error("ticket write failed: {0}")]
    Ticket(#[from] std::io::Error),

    #[error("failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("incident store failed: {0}")]
    Store(String),

    #[error("alert dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("{failed} of {total} alert dispatchers failed")]
    Fanout { failed: usize, total: usize },
}

/// A downstream consumer of alert events.
#[async_trait::async_trait]
pub trait AlertDispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, event: &AlertEvent) -> Result<(), AlertError>;
}

/// Notify `dispatcher`, giving up after `timeout`.
pub async fn dispatch_bounded(
    dispatcher: &dyn AlertDispatcher,
    event: &AlertEvent,
    timeout: Duration,
) -> Result<(), AlertError> {
    match tokio::time::timeout(timeout, dispatcher.notify(event)).await {
        Ok(result) => result,
        Err(_) => Err(AlertError::Timeout(timeout)),
    }
}

/// Delivers every event to each configured dispatcher concurrently.
///
/// Each dispatcher runs in its own task under its own deadline, so a stalled
/// one neither delays nor cancels the rest. Tasks outlive a caller that stops
/// waiting on the fanout.
#[derive(Default, Clone)]
pub struct AlertFanout {
    dispatchers: Vec<Arc<dyn AlertDispatcher>>,
    timeout: Option<Duration>,
}

impl AlertFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dispatcher: Arc<dyn AlertDispatcher>) -> Self {
        self.dispatchers.push(dispatcher);
        self
    }

    /// Bound each dispatcher individually.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait::async_trait]
impl AlertDispatcher for AlertFanout {
    fn name(&self) -> &'static str {
        "fanout"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), AlertError> {
        let handles: Vec<_> = self
            .dispatchers
            .iter()
            .map(|dispatcher| {
                let dispatcher = dispatcher.clone();
                let event = event.clone();
                let timeout = self.timeout;
                tokio::spawn(async move {
                    let result = match timeout {
                        Some(t) => dispatch_bounded(dispatcher.as_ref(), &event, t).await,
                        None => dispatcher.notify(&event).await,
                    };
                    if let Err(e) = &result {
                        warn!(dispatcher = dispatcher.name(), id = %event.id, error = %e, "Alert delivery failed");
                    }
                    result.is_ok()
                })
            })
            .collect();

        let mut failed = 0;
        for handle in handles {
            match handle.await {
                Ok(true) => {}
                Ok(false) => failed += 1,
                Err(e) => {
                    warn!(id = %event.id, error = %e, "Alert dispatcher task aborted");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(AlertError::Fanout {
                failed,
                total: self.dispatchers.len(),
            });
        }
        Ok(())
    }
}
