//! The Data Gateway: the only path from the workflow to the backing store.
//!
//! Every call is one durable unit of work. A call either fails at the transport level
//! ([`GatewayError`]) or returns a [`Verdict`]: the store's answer, which may be a
//! business-rule denial carrying a human-readable message. Denials are ordinary results.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::appointment::{Appointment, AppointmentId};
use crate::domain::quotation::{
    Decision, NewQuotation, NewQuotationItem, Quotation, QuotationId, QuotationItem,
    QuotationItemId, QuotationStatus,
};
use crate::domain::work_order::{
    NewWorkOrderTask, WorkOrder, WorkOrderId, WorkOrderStatus, WorkOrderTask,
};
use crate::errors::{GatewayError, WorkflowError};

pub mod memory;

pub use memory::InMemoryDataGateway;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Operation names, shared by gateway implementations and error reporting.
pub mod ops {
    pub const FETCH_WORK_ORDER: &str = "fetch_work_order";
    pub const FETCH_APPOINTMENT: &str = "fetch_appointment";
    pub const FETCH_QUOTATION: &str = "fetch_quotation";
    pub const LIST_QUOTATION_ITEMS: &str = "list_quotation_items";
    pub const LIST_WORK_ORDER_TASKS: &str = "list_work_order_tasks";
    pub const LIST_AWAITING_GENERATION: &str = "list_awaiting_generation";
    pub const CREATE_QUOTATION: &str = "create_quotation";
    pub const ADD_QUOTATION_ITEM: &str = "add_quotation_item";
    pub const REMOVE_QUOTATION_ITEM: &str = "remove_quotation_item";
    pub const DECIDE_QUOTATION: &str = "decide_quotation";
    pub const GENERATE_WORK_ORDER: &str = "generate_work_order";
    pub const CREATE_WORK_ORDER_TASK: &str = "create_work_order_task";
}

/// The store's answer to a mutating call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "payload", rename_all = "snake_case")]
pub enum Verdict<T> {
    Allowed(T),
    Denied { message: String },
}

impl<T> Verdict<T> {
    pub fn denied(message: impl Into<String>) -> Self {
        Self::Denied { message: message.into() }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// Turns a denial into [`WorkflowError::Rejected`], keeping the store's message verbatim.
    pub fn into_result(self, operation: &'static str) -> Result<T, WorkflowError> {
        match self {
            Self::Allowed(value) => Ok(value),
            Self::Denied { message } => Err(WorkflowError::Rejected { operation, message }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRemoval {
    Removed,
    AlreadyAbsent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub quotation_id: QuotationId,
    pub decision: Decision,
    pub decided_by: String,
    pub comment: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub quotation_id: QuotationId,
    pub status: QuotationStatus,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub quotation_id: QuotationId,
    pub advisor_id: String,
    pub mechanic_id: Option<String>,
    pub odometer: Option<u32>,
    pub estimated_date: Option<NaiveDate>,
    /// Already normalized to `HH:mm:ss`.
    pub estimated_duration: Option<String>,
    pub generated_by: String,
}

/// A work order's estimated cost just before and just after a generation, both read in
/// the unit of work that applied it. Other merges cannot land between the two reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostChange {
    pub before: Decimal,
    pub after: Decimal,
}

impl CostChange {
    pub fn applied(&self) -> Option<Decimal> {
        self.after.checked_sub(self.before)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedWorkOrder {
    pub work_order_id: WorkOrderId,
    pub work_order_number: String,
    pub status: WorkOrderStatus,
    /// Tasks the store created from the quotation's service items (additional mode).
    pub merged_tasks: Vec<WorkOrderTask>,
    /// `None` when the store cannot report it; the cost is then checked against a re-read.
    pub cost: Option<CostChange>,
}

#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn fetch_work_order(&self, id: &WorkOrderId) -> GatewayResult<Option<WorkOrder>>;

    async fn fetch_appointment(&self, id: &AppointmentId)
        -> GatewayResult<Option<Appointment>>;

    /// The quotation with its current items, in insertion order.
    async fn fetch_quotation(&self, id: &QuotationId) -> GatewayResult<Option<Quotation>>;

    async fn list_quotation_items(&self, id: &QuotationId) -> GatewayResult<Vec<QuotationItem>>;

    async fn list_work_order_tasks(&self, id: &WorkOrderId)
        -> GatewayResult<Vec<WorkOrderTask>>;

    /// Approved quotations that have not been turned into work-order state yet.
    async fn list_awaiting_generation(&self) -> GatewayResult<Vec<QuotationId>>;

    /// Must deny when the parent work order no longer takes quotations.
    async fn create_quotation(&self, quotation: NewQuotation)
        -> GatewayResult<Verdict<Quotation>>;

    async fn add_quotation_item(
        &self,
        item: NewQuotationItem,
    ) -> GatewayResult<Verdict<QuotationItem>>;

    async fn remove_quotation_item(
        &self,
        id: &QuotationItemId,
        removed_by: &str,
    ) -> GatewayResult<Verdict<ItemRemoval>>;

    /// Must apply the decision only while the quotation is still pending, in the same
    /// unit of work as the check.
    async fn decide_quotation(
        &self,
        request: DecisionRequest,
    ) -> GatewayResult<Verdict<DecisionRecord>>;

    /// Initial mode creates the work order; additional mode adds the quotation total to
    /// the existing order's estimated cost as a relative delta.
    async fn generate_work_order(
        &self,
        request: GenerationRequest,
    ) -> GatewayResult<Verdict<GeneratedWorkOrder>>;

    async fn create_work_order_task(
        &self,
        task: NewWorkOrderTask,
    ) -> GatewayResult<Verdict<WorkOrderTask>>;
}

/// Retry policy for read-only gateway calls. Mutating calls are never retried: a timed-out
/// write has an unknown outcome and must be re-read, not replayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadRetry {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self { retries: 2, backoff: Duration::from_millis(100) }
    }
}

impl ReadRetry {
    pub fn none() -> Self {
        Self { retries: 0, backoff: Duration::ZERO }
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(error) if error.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        event_name = "gateway.read_retry",
                        operation,
                        attempt,
                        error = %error,
                        "retrying read-only gateway call"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}

/// Bounds a gateway call. On expiry the outcome of the call is unknown.
pub async fn bounded<T, Fut>(
    operation: &'static str,
    limit: Duration,
    call: Fut,
) -> GatewayResult<T>
where
    Fut: Future<Output = GatewayResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(GatewayError::Timeout { operation }))
}
