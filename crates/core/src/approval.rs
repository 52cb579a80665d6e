//! Approval State Machine: `Pending -> Approved | Rejected`, at most once per quotation.
//!
//! The pre-check here narrows the race window. The store's conditional update is the
//! serialization point; a denial from it is reported as [`WorkflowError::AlreadyDecided`]
//! once a re-read confirms another decision landed first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::quotation::{Decision, Quotation, QuotationId, QuotationParent, QuotationStatus};
use crate::domain::work_order::ClientId;
use crate::errors::{DomainError, WorkflowError};
use crate::gateway::{ops, DataGateway, DecisionRequest, Verdict};
use crate::notify::{dispatch_best_effort, Notification, NotificationDispatcher, NotificationKind};
use crate::workflow::WorkflowSettings;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideQuotation {
    pub quotation_id: QuotationId,
    pub decision: Decision,
    pub decided_by: String,
    pub comment: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub quotation_id: QuotationId,
    pub status: QuotationStatus,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
    pub correlation_id: String,
    /// Approved quotations still need a separate `generate` call.
    pub awaiting_generation: bool,
}

pub struct ApprovalEngine<G> {
    gateway: Arc<G>,
    settings: WorkflowSettings,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl<G> ApprovalEngine<G>
where
    G: DataGateway,
{
    pub fn new(
        gateway: Arc<G>,
        settings: WorkflowSettings,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self { gateway, settings, audit, notifier }
    }

    pub async fn decide(&self, request: DecideQuotation) -> Result<DecisionResult, WorkflowError> {
        let context = AuditContext::start(Some(request.quotation_id.clone()), &request.decided_by);
        let result = self.decide_in(&request, &context).await;

        match &result {
            Ok(decided) => {
                self.audit.emit(
                    context
                        .event("quotation.decided", AuditCategory::Decision, AuditOutcome::Success)
                        .with_metadata("status", decided.status.as_str())
                        .with_metadata("comment", request.comment.clone()),
                );
            }
            Err(error) => {
                warn!(
                    event_name = "quotation.decision_refused",
                    correlation_id = %context.correlation_id,
                    quotation_id = %request.quotation_id,
                    class = ?error.class(),
                    error = %error,
                    "quotation decision was not applied"
                );
                let outcome = if error.is_retryable() {
                    AuditOutcome::Failed
                } else {
                    AuditOutcome::Rejected
                };
                self.audit.emit(
                    context
                        .event("quotation.decision_refused", AuditCategory::Decision, outcome)
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    async fn decide_in(
        &self,
        request: &DecideQuotation,
        context: &AuditContext,
    ) -> Result<DecisionResult, WorkflowError> {
        let quotation = self.fetch(&request.quotation_id).await?;
        quotation.status.decide(request.decision).map_err(|error| match error {
            DomainError::AlreadyDecided { status } => {
                WorkflowError::AlreadyDecided { quotation_id: quotation.id.clone(), status }
            }
            other => WorkflowError::Domain(other),
        })?;

        let verdict = self
            .settings
            .write(
                ops::DECIDE_QUOTATION,
                self.gateway.decide_quotation(DecisionRequest {
                    quotation_id: request.quotation_id.clone(),
                    decision: request.decision,
                    decided_by: request.decided_by.clone(),
                    comment: request.comment.clone(),
                }),
            )
            .await?;

        let record = match verdict {
            Verdict::Allowed(record) => record,
            Verdict::Denied { message } => {
                return Err(self.decision_denied(&request.quotation_id, message).await)
            }
        };

        info!(
            event_name = "quotation.decided",
            correlation_id = %context.correlation_id,
            quotation_id = %record.quotation_id,
            status = record.status.as_str(),
            decided_by = %request.decided_by,
            "quotation decided"
        );

        self.notify_client(&quotation, record.status, context).await;

        Ok(DecisionResult {
            awaiting_generation: record.status == QuotationStatus::Approved,
            quotation_id: record.quotation_id,
            status: record.status,
            decided_by: request.decided_by.clone(),
            decided_at: record.decided_at,
            correlation_id: context.correlation_id.clone(),
        })
    }

    async fn fetch(&self, quotation_id: &QuotationId) -> Result<Quotation, WorkflowError> {
        self.settings
            .read(ops::FETCH_QUOTATION, || self.gateway.fetch_quotation(quotation_id))
            .await?
            .ok_or_else(|| WorkflowError::QuotationNotFound(quotation_id.clone()))
    }

    /// The local pre-check passed but the store refused. If the quotation is no longer
    /// pending, a concurrent decision won.
    async fn decision_denied(&self, quotation_id: &QuotationId, message: String) -> WorkflowError {
        match self.fetch(quotation_id).await {
            Ok(current) if current.status.is_decided() => {
                WorkflowError::AlreadyDecided { quotation_id: current.id, status: current.status }
            }
            _ => WorkflowError::Rejected { operation: ops::DECIDE_QUOTATION, message },
        }
    }

    async fn notify_client(
        &self,
        quotation: &Quotation,
        status: QuotationStatus,
        context: &AuditContext,
    ) {
        let kind = match status {
            QuotationStatus::Approved => NotificationKind::QuotationApproved,
            QuotationStatus::Rejected => NotificationKind::QuotationRejected,
            QuotationStatus::Pending => return,
        };
        let Some(client_id) = self.client_of(&quotation.parent, context).await else {
            return;
        };

        let notification = Notification {
            client_id,
            kind,
            payload: json!({
                "quotation_id": quotation.id.0,
                "status": status.as_str(),
                "total": quotation.total().ok().map(|total| total.to_string()),
            }),
        };
        dispatch_best_effort(self.notifier.as_ref(), notification, &context.correlation_id).await;
    }

    async fn client_of(
        &self,
        parent: &QuotationParent,
        context: &AuditContext,
    ) -> Option<ClientId> {
        let lookup = match parent {
            QuotationParent::Appointment(id) => self
                .settings
                .read(ops::FETCH_APPOINTMENT, || self.gateway.fetch_appointment(id))
                .await
                .map(|appointment| appointment.map(|appointment| appointment.client_id)),
            QuotationParent::WorkOrder(id) => self
                .settings
                .read(ops::FETCH_WORK_ORDER, || self.gateway.fetch_work_order(id))
                .await
                .map(|work_order| work_order.map(|work_order| work_order.client_id)),
        };

        match lookup {
            Ok(client_id) => client_id,
            Err(error) => {
                warn!(
                    event_name = "notification.failed",
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "could not resolve the client to notify"
                );
                None
            }
        }
    }
}
