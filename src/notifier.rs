//! `Notifier`: a fire-and-forget sink for info/error/trade messages.
//!
//! Grounded on `utils/alerts.rs`'s `AlertManager` (webhook POST via
//! `reqwest`, best-effort `let _ = ...` send) and on
//! `notification/webhook.py`'s `Discord` class (separate info/error
//! channels, traceback folded into the error message).

use async_trait::async_trait;
use serde_json::json;

use crate::model::OrderSide;

/// Three message channels the core can address (SPEC_FULL.md §6.2). All
/// methods are provided with a logging default; a failing notifier must
/// never propagate into the sync loop, so implementations should swallow
/// their own transport errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn info(&self, message: &str) {
        log::info!("{message}");
    }

    async fn error(&self, message: &str) {
        log::error!("{message}");
    }

    async fn trade(&self, side: OrderSide, message: &str) {
        log::info!("[{side}] {message}");
    }
}

/// Sends to a Discord-style incoming webhook, one URL per channel (either
/// may be omitted to fall back to logging only).
pub struct WebhookNotifier {
    client: reqwest::Client,
    info_webhook: Option<String>,
    error_webhook: Option<String>,
}

impl WebhookNotifier {
    pub fn new(info_webhook: Option<String>, error_webhook: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            info_webhook,
            error_webhook,
        }
    }

    async fn send(&self, webhook: &Option<String>, content: &str) {
        let Some(url) = webhook else { return };
        let body = json!({ "content": content });
        let _ = self.client.post(url).json(&body).send().await;
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn info(&self, message: &str) {
        log::info!("{message}");
        self.send(&self.info_webhook, message).await;
    }

    async fn error(&self, message: &str) {
        log::error!("{message}");
        self.send(&self.error_webhook, message).await;
    }

    async fn trade(&self, side: OrderSide, message: &str) {
        log::info!("[{side}] {message}");
        self.send(&self.info_webhook, &format!("[{side}] {message}")).await;
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockNotifier;
    use super::*;

    #[tokio::test]
    async fn mock_notifier_records_every_channel() {
        let n = MockNotifier::new();
        n.info("hello").await;
        n.error("oops").await;
        n.trade(OrderSide::Buy, "filled").await;

        assert_eq!(n.infos.lock().await.len(), 1);
        assert_eq!(n.errors.lock().await.len(), 1);
        assert_eq!(n.trades.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn webhook_notifier_without_urls_does_not_panic() {
        let n = WebhookNotifier::new(None, None);
        n.info("hello").await;
        n.error("oops").await;
    }
}
