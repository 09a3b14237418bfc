//! Best-effort webhook delivery (§4.5 "optional webhook notification"; §4.8
//! steps naming `jobgroup.created`/`jobgroup.failed`/`jobgroup.completed`).
//!
//! Modeled on `jobgroup::batch_client::BatchApiClient`'s collaborator shape:
//! a thin `reqwest::Client` wrapper with a configured base URL. Unlike that
//! client, a failed delivery never becomes an `Error` — there is no caller
//! to propagate one to, since every call site fires this after its own
//! envelope (a DLQ write, a status transition) has already succeeded.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        Self { http: Client::new(), url }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// POST `{"event": event, "data": payload}` to the configured URL. A
    /// no-op when no URL is configured. Logs and swallows every failure
    /// (connection error, timeout, non-2xx status) rather than returning
    /// one, since a webhook is a side notification, not part of the
    /// operation it reports on.
    pub async fn notify(&self, event: &str, payload: Value) {
        let url = match &self.url {
            Some(url) => url,
            None => return,
        };

        let body = json!({"event": event, "data": payload});

        match self.http.post(url).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(event, status = %response.status(), "webhook endpoint returned non-2xx");
            }
            Ok(_) => {}
            Err(e) => warn!(event, error = %e, "failed to deliver webhook"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_notifier_is_a_no_op() {
        let notifier = WebhookNotifier::disabled();
        notifier.notify("dlq.entry", json!({"asset_id": "x"})).await;
    }
}
