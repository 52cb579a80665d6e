//! Client notifications. Delivery is best-effort: the workflow logs a failed delivery and
//! carries on.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::work_order::ClientId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    QuotationApproved,
    QuotationRejected,
    WorkOrderOpened,
    WorkOrderUpdated,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub client_id: ClientId,
    pub kind: NotificationKind,
    pub payload: Value,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Sends and swallows: failures are logged with the correlation id and never returned.
pub async fn dispatch_best_effort(
    dispatcher: &dyn NotificationDispatcher,
    notification: Notification,
    correlation_id: &str,
) {
    let kind = notification.kind;
    let client_id = notification.client_id.0.clone();
    if let Err(error) = dispatcher.notify(notification).await {
        warn!(
            event_name = "notification.failed",
            correlation_id,
            client_id = %client_id,
            kind = ?kind,
            error = %error,
            "client notification was not delivered"
        );
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

/// Logs notifications instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationDispatcher for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            event_name = "notification.logged",
            client_id = %notification.client_id.0,
            kind = ?notification.kind,
            payload = %notification.payload,
            "client notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::{
        dispatch_best_effort, InMemoryNotifier, Notification, NotificationDispatcher,
        NotificationKind, NotifyError,
    };
    use crate::domain::work_order::ClientId;

    struct Unreachable;

    #[async_trait]
    impl NotificationDispatcher for Unreachable {
        async fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp relay refused connection".to_string()))
        }
    }

    fn notification() -> Notification {
        Notification {
            client_id: ClientId("CL-1".to_string()),
            kind: NotificationKind::QuotationApproved,
            payload: json!({ "quotation_id": "QT-1" }),
        }
    }

    #[tokio::test]
    async fn best_effort_dispatch_swallows_failures() {
        dispatch_best_effort(&Unreachable, notification(), "req-1").await;
    }

    #[tokio::test]
    async fn in_memory_notifier_records_sent_notifications() {
        let notifier = InMemoryNotifier::default();
        dispatch_best_effort(&notifier, notification(), "req-2").await;
        assert_eq!(notifier.sent(), vec![notification()]);
    }
}
