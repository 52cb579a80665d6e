//! Webhook delivery for client notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use workshop_core::config::NotificationsConfig;
use workshop_core::notify::{
    Notification, NotificationDispatcher, NotifyError, TracingNotifier,
};

/// Posts each notification as JSON to a configured endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| NotifyError::Delivery(error.to_string()))?;
        Ok(Self { client, url: url.into(), token })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let body = json!({
            "client_id": notification.client_id.0,
            "kind": notification.kind,
            "payload": notification.payload,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| NotifyError::Delivery(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery(format!("webhook answered {status}")));
        }

        debug!(kind = ?notification.kind, status = %status, "notification delivered");
        Ok(())
    }
}

/// The webhook when one is configured, otherwise notifications are only logged.
pub fn dispatcher(
    config: &NotificationsConfig,
) -> Result<Arc<dyn NotificationDispatcher>, NotifyError> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url.clone(),
            config.webhook_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(TracingNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use workshop_core::domain::work_order::ClientId;
    use workshop_core::notify::{
        Notification, NotificationDispatcher, NotificationKind, NotifyError,
    };

    use super::WebhookNotifier;

    #[tokio::test]
    async fn unreachable_webhook_reports_a_delivery_failure() {
        let notifier =
            WebhookNotifier::new("http://127.0.0.1:9/hooks", None, Duration::from_millis(500))
                .expect("client");

        let result = notifier
            .notify(Notification {
                client_id: ClientId("CL-100".to_string()),
                kind: NotificationKind::WorkOrderOpened,
                payload: json!({ "work_order_number": "WO-00044" }),
            })
            .await;

        assert!(matches!(result, Err(NotifyError::Delivery(_))));
    }
}
