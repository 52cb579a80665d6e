//! Wiring for the quotation workflow: per-call limits shared by every component, and the
//! [`Workshop`] facade a request layer holds.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::approval::ApprovalEngine;
use crate::audit::AuditSink;
use crate::config::AppConfig;
use crate::gateway::{bounded, DataGateway, GatewayResult, ReadRetry};
use crate::generation::GenerationEngine;
use crate::notify::NotificationDispatcher;
use crate::quotation::QuotationManager;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub call_timeout: Duration,
    pub read_retry: ReadRetry,
    pub cost_tolerance: Decimal,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            read_retry: ReadRetry::default(),
            cost_tolerance: Decimal::new(1, 2),
        }
    }
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            call_timeout: config.gateway.call_timeout(),
            read_retry: config.gateway.read_retry(),
            cost_tolerance: config.workflow.cost_tolerance,
        }
    }

    /// A read-only call: bounded, and retried on retryable transport failures.
    pub(crate) async fn read<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let limit = self.call_timeout;
        self.read_retry.run(operation, || bounded(operation, limit, call())).await
    }

    /// A mutating call: bounded, never retried.
    pub(crate) async fn write<T, Fut>(&self, operation: &'static str, call: Fut) -> GatewayResult<T>
    where
        Fut: Future<Output = GatewayResult<T>>,
    {
        bounded(operation, self.call_timeout, call).await
    }
}

/// The three workflow stages over one gateway.
pub struct Workshop<G> {
    quotations: QuotationManager<G>,
    approvals: ApprovalEngine<G>,
    generation: GenerationEngine<G>,
}

impl<G> Workshop<G>
where
    G: DataGateway,
{
    pub fn new(
        gateway: Arc<G>,
        settings: WorkflowSettings,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            quotations: QuotationManager::new(gateway.clone(), settings.clone()),
            approvals: ApprovalEngine::new(
                gateway.clone(),
                settings.clone(),
                audit.clone(),
                notifier.clone(),
            ),
            generation: GenerationEngine::new(gateway, settings, audit, notifier),
        }
    }

    pub fn quotations(&self) -> &QuotationManager<G> {
        &self.quotations
    }

    pub fn approvals(&self) -> &ApprovalEngine<G> {
        &self.approvals
    }

    pub fn generation(&self) -> &GenerationEngine<G> {
        &self.generation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::WorkflowSettings;
    use crate::errors::GatewayError;
    use crate::gateway::{ops, ReadRetry};

    #[tokio::test(start_paused = true)]
    async fn reads_retry_after_a_timed_out_attempt() {
        let settings = WorkflowSettings {
            call_timeout: Duration::from_millis(20),
            read_retry: ReadRetry { retries: 1, backoff: Duration::from_millis(5) },
            ..WorkflowSettings::default()
        };
        let attempts = AtomicU32::new(0);

        let result = settings
            .read(ops::FETCH_WORK_ORDER, || async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Ok::<_, GatewayError>("WO-00042")
            })
            .await;

        assert_eq!(result, Ok("WO-00042"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_are_not_retried() {
        let settings = WorkflowSettings {
            call_timeout: Duration::from_millis(20),
            ..WorkflowSettings::default()
        };

        let result: Result<(), _> = settings
            .write(ops::GENERATE_WORK_ORDER, async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(GatewayError::Timeout { operation: ops::GENERATE_WORK_ORDER }));
    }
}
