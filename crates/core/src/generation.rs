//! Work-Order Generation/Merge Engine.
//!
//! An approved quotation either opens a new work order (initial mode) or adds its total to
//! an existing one (additional mode). The store applies the change in one call; this engine
//! checks its preconditions before the call and the cost post-condition after it.
//!
//! Consistency problems found after the store accepted the change are returned as
//! [`WorkflowWarning`]s next to the result. They never fail the operation.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::appointment::Appointment;
use crate::domain::quotation::{
    GenerationMode, Quotation, QuotationId, QuotationParent, QuotationStatus,
};
use crate::domain::work_order::{
    ClientId, NewWorkOrderTask, TaskPriority, WorkOrder, WorkOrderId, WorkOrderStatus,
    WorkOrderTask,
};
use crate::duration::WorkDuration;
use crate::errors::{WorkflowError, WorkflowWarning};
use crate::gateway::{ops, DataGateway, GeneratedWorkOrder, GenerationRequest, Verdict};
use crate::notify::{dispatch_best_effort, Notification, NotificationDispatcher, NotificationKind};
use crate::workflow::WorkflowSettings;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateWorkOrder {
    pub quotation_id: QuotationId,
    pub advisor_id: String,
    pub mechanic_id: Option<String>,
    pub odometer: Option<u32>,
    pub estimated_date: Option<NaiveDate>,
    /// As typed by the operator; normalized before anything is written.
    pub estimated_duration: Option<String>,
    pub generated_by: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub quotation_id: QuotationId,
    pub mode: GenerationMode,
    pub work_order_id: WorkOrderId,
    pub work_order_number: String,
    pub work_order_status: WorkOrderStatus,
    /// As re-read after the call, when the re-read succeeded.
    pub estimated_cost: Option<Decimal>,
    pub merged_tasks: Vec<WorkOrderTask>,
    pub bootstrap_task: Option<WorkOrderTask>,
    pub correlation_id: String,
    pub warnings: Vec<WorkflowWarning>,
}

/// What must be known before the store call.
struct Baseline {
    cost_before: Decimal,
    client_id: ClientId,
    appointment: Option<Appointment>,
}

pub struct GenerationEngine<G> {
    gateway: Arc<G>,
    settings: WorkflowSettings,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl<G> GenerationEngine<G>
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

    /// Approved quotations that were never turned into work-order state, oldest decision
    /// first. Re-running [`Self::generate`] on them is safe.
    pub async fn pending_generation(&self) -> Result<Vec<QuotationId>, WorkflowError> {
        let pending = self
            .settings
            .read(ops::LIST_AWAITING_GENERATION, || self.gateway.list_awaiting_generation())
            .await?;
        Ok(pending)
    }

    /// Reads a work order the way the engine does: bounded and retried on transient failures.
    pub async fn work_order(
        &self,
        work_order_id: &WorkOrderId,
    ) -> Result<WorkOrder, WorkflowError> {
        self.fetch_work_order(work_order_id).await
    }

    /// Tasks on a work order in insertion order, read with the same retry policy.
    pub async fn work_order_tasks(
        &self,
        work_order_id: &WorkOrderId,
    ) -> Result<Vec<WorkOrderTask>, WorkflowError> {
        let tasks = self
            .settings
            .read(ops::LIST_WORK_ORDER_TASKS, || self.gateway.list_work_order_tasks(work_order_id))
            .await?;
        Ok(tasks)
    }

    pub async fn generate(
        &self,
        request: GenerateWorkOrder,
    ) -> Result<GenerationResult, WorkflowError> {
        let context =
            AuditContext::start(Some(request.quotation_id.clone()), &request.generated_by);
        let result = self.generate_in(request, &context).await;

        match &result {
            Ok(generated) => {
                let outcome = if generated.warnings.is_empty() {
                    AuditOutcome::Success
                } else {
                    AuditOutcome::Warning
                };
                let mut event = context
                    .event("work_order.generated", AuditCategory::Generation, outcome)
                    .with_metadata("mode", format!("{:?}", generated.mode))
                    .with_metadata("work_order_id", generated.work_order_id.0.clone())
                    .with_metadata("work_order_number", generated.work_order_number.clone());
                if let Some(cost) = generated.estimated_cost {
                    event = event.with_metadata("estimated_cost", cost.to_string());
                }
                self.audit.emit(event);
            }
            Err(error) => {
                warn!(
                    event_name = "work_order.generation_refused",
                    correlation_id = %context.correlation_id,
                    class = ?error.class(),
                    error = %error,
                    "work order generation was not applied"
                );
                let outcome = if error.is_retryable() {
                    AuditOutcome::Failed
                } else {
                    AuditOutcome::Rejected
                };
                self.audit.emit(
                    context
                        .event("work_order.generation_refused", AuditCategory::Generation, outcome)
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    async fn generate_in(
        &self,
        request: GenerateWorkOrder,
        context: &AuditContext,
    ) -> Result<GenerationResult, WorkflowError> {
        let quotation = self.approved_quotation(&request.quotation_id).await?;
        let mode = quotation.mode();

        let duration = request.estimated_duration.as_deref().map(WorkDuration::parse).transpose()?;
        let quotation_total = quotation.total()?;
        let baseline = self.baseline(&quotation).await?;

        let verdict = self
            .settings
            .write(
                ops::GENERATE_WORK_ORDER,
                self.gateway.generate_work_order(GenerationRequest {
                    quotation_id: quotation.id.clone(),
                    advisor_id: request.advisor_id.clone(),
                    mechanic_id: request.mechanic_id.clone(),
                    odometer: request.odometer,
                    estimated_date: request.estimated_date,
                    estimated_duration: duration.map(|duration| duration.to_string()),
                    generated_by: request.generated_by.clone(),
                }),
            )
            .await?;

        let generated = match verdict {
            Verdict::Allowed(generated) => generated,
            Verdict::Denied { message } => {
                return Err(self.generation_denied(&quotation, message).await);
            }
        };

        info!(
            event_name = "work_order.generated",
            correlation_id = %context.correlation_id,
            quotation_id = %quotation.id,
            work_order_id = %generated.work_order_id,
            work_order_number = %generated.work_order_number,
            mode = ?mode,
            quotation_total = %quotation_total,
            merged_tasks = generated.merged_tasks.len(),
            "work order generated from quotation"
        );

        let mut warnings = Vec::new();
        let estimated_cost = self
            .check_cost(&generated, baseline.cost_before, quotation_total, context, &mut warnings)
            .await;

        let bootstrap_task = match &baseline.appointment {
            Some(appointment) => {
                self.bootstrap_task(
                    appointment,
                    &generated,
                    duration,
                    &request,
                    context,
                    &mut warnings,
                )
                .await
            }
            None => None,
        };

        let kind = match mode {
            GenerationMode::Initial => NotificationKind::WorkOrderOpened,
            GenerationMode::Additional => NotificationKind::WorkOrderUpdated,
        };
        let notification = Notification {
            client_id: baseline.client_id,
            kind,
            payload: json!({
                "quotation_id": quotation.id.0,
                "work_order_id": generated.work_order_id.0,
                "work_order_number": generated.work_order_number,
                "status": generated.status.as_str(),
            }),
        };
        dispatch_best_effort(self.notifier.as_ref(), notification, &context.correlation_id).await;

        Ok(GenerationResult {
            quotation_id: quotation.id,
            mode,
            work_order_id: generated.work_order_id,
            work_order_number: generated.work_order_number,
            work_order_status: generated.status,
            estimated_cost,
            merged_tasks: generated.merged_tasks,
            bootstrap_task,
            correlation_id: context.correlation_id.clone(),
            warnings,
        })
    }

    async fn fetch_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Quotation, WorkflowError> {
        self.settings
            .read(ops::FETCH_QUOTATION, || self.gateway.fetch_quotation(quotation_id))
            .await?
            .ok_or_else(|| WorkflowError::QuotationNotFound(quotation_id.clone()))
    }

    async fn fetch_work_order(
        &self,
        work_order_id: &WorkOrderId,
    ) -> Result<WorkOrder, WorkflowError> {
        self.settings
            .read(ops::FETCH_WORK_ORDER, || self.gateway.fetch_work_order(work_order_id))
            .await?
            .ok_or_else(|| WorkflowError::WorkOrderNotFound(work_order_id.clone()))
    }

    async fn approved_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Quotation, WorkflowError> {
        let quotation = self.fetch_quotation(quotation_id).await?;
        if quotation.status != QuotationStatus::Approved {
            return Err(WorkflowError::NotApproved {
                quotation_id: quotation.id,
                status: quotation.status,
            });
        }
        if let Some(work_order_id) = quotation.generated_work_order_id {
            return Err(WorkflowError::AlreadyGenerated {
                quotation_id: quotation.id,
                work_order_id,
            });
        }
        Ok(quotation)
    }

    async fn baseline(&self, quotation: &Quotation) -> Result<Baseline, WorkflowError> {
        match &quotation.parent {
            QuotationParent::Appointment(appointment_id) => {
                let appointment = self
                    .settings
                    .read(ops::FETCH_APPOINTMENT, || self.gateway.fetch_appointment(appointment_id))
                    .await?
                    .ok_or_else(|| WorkflowError::AppointmentNotFound(appointment_id.0.clone()))?;
                Ok(Baseline {
                    cost_before: Decimal::ZERO,
                    client_id: appointment.client_id.clone(),
                    appointment: Some(appointment),
                })
            }
            QuotationParent::WorkOrder(work_order_id) => {
                let work_order = self.fetch_work_order(work_order_id).await?;
                if !work_order.status.accepts_new_quotations() {
                    return Err(WorkflowError::WorkOrderNotEligible {
                        work_order_id: work_order.id,
                        number: work_order.number,
                        status: work_order.status,
                    });
                }
                Ok(Baseline {
                    cost_before: work_order.estimated_cost,
                    client_id: work_order.client_id,
                    appointment: None,
                })
            }
        }
    }

    /// The store refused. Report the most specific reason a re-read can confirm.
    async fn generation_denied(&self, quotation: &Quotation, message: String) -> WorkflowError {
        if let Ok(current) = self.fetch_quotation(&quotation.id).await {
            if let Some(work_order_id) = current.generated_work_order_id {
                return WorkflowError::AlreadyGenerated {
                    quotation_id: current.id,
                    work_order_id,
                };
            }
            if current.status != QuotationStatus::Approved {
                return WorkflowError::NotApproved {
                    quotation_id: current.id,
                    status: current.status,
                };
            }
        }
        if let QuotationParent::WorkOrder(work_order_id) = &quotation.parent {
            if let Ok(work_order) = self.fetch_work_order(work_order_id).await {
                if !work_order.status.accepts_new_quotations() {
                    return WorkflowError::WorkOrderNotEligible {
                        work_order_id: work_order.id,
                        number: work_order.number,
                        status: work_order.status,
                    };
                }
            }
        }
        WorkflowError::Rejected { operation: ops::GENERATE_WORK_ORDER, message }
    }

    /// Verifies that the store added the quotation total to the work order's cost.
    ///
    /// The store's own before/after reads decide. A re-read compared with the cost seen
    /// before the call is only the fallback, since concurrent merges into the same order
    /// move that cost legitimately.
    async fn check_cost(
        &self,
        generated: &GeneratedWorkOrder,
        cost_before: Decimal,
        quotation_total: Decimal,
        context: &AuditContext,
        warnings: &mut Vec<WorkflowWarning>,
    ) -> Option<Decimal> {
        let reread = self.fetch_work_order(&generated.work_order_id).await;

        if let Some(change) = generated.cost {
            let applied_matches = change
                .applied()
                .is_some_and(|applied| self.within_tolerance(applied, quotation_total));
            if !applied_matches {
                self.report_mismatch(
                    generated,
                    change.before,
                    quotation_total,
                    change.after,
                    context,
                    warnings,
                );
            } else if let Ok(work_order) = &reread {
                let expected = cost_before.saturating_add(quotation_total);
                if !self.within_tolerance(work_order.estimated_cost, expected) {
                    debug!(
                        event_name = "work_order.cost_moved_concurrently",
                        correlation_id = %context.correlation_id,
                        work_order_id = %work_order.id,
                        cost_before_call = %cost_before,
                        cost_before_merge = %change.before,
                        actual = %work_order.estimated_cost,
                        "other merges landed on the work order around this one"
                    );
                }
            }
            return Some(reread.map_or(change.after, |work_order| work_order.estimated_cost));
        }

        let work_order = match reread {
            Ok(work_order) => work_order,
            Err(error) => {
                warn!(
                    event_name = "work_order.cost_unchecked",
                    correlation_id = %context.correlation_id,
                    work_order_id = %generated.work_order_id,
                    error = %error,
                    "could not re-read the work order to verify its cost"
                );
                warnings.push(WorkflowWarning::PostConditionUnchecked {
                    work_order_id: generated.work_order_id.clone(),
                    reason: error.to_string(),
                });
                return None;
            }
        };

        let expected = cost_before.saturating_add(quotation_total);
        if !self.within_tolerance(work_order.estimated_cost, expected) {
            self.report_mismatch(
                generated,
                cost_before,
                quotation_total,
                work_order.estimated_cost,
                context,
                warnings,
            );
        }
        Some(work_order.estimated_cost)
    }

    fn within_tolerance(&self, actual: Decimal, expected: Decimal) -> bool {
        actual
            .checked_sub(expected)
            .is_some_and(|difference| difference.abs() <= self.settings.cost_tolerance)
    }

    fn report_mismatch(
        &self,
        generated: &GeneratedWorkOrder,
        cost_before: Decimal,
        quotation_total: Decimal,
        actual: Decimal,
        context: &AuditContext,
        warnings: &mut Vec<WorkflowWarning>,
    ) {
        let expected = cost_before.saturating_add(quotation_total);
        error!(
            event_name = "work_order.cost_mismatch",
            correlation_id = %context.correlation_id,
            work_order_id = %generated.work_order_id,
            work_order_number = %generated.work_order_number,
            cost_before = %cost_before,
            quotation_total = %quotation_total,
            expected = %expected,
            actual = %actual,
            "work order cost does not equal previous cost plus quotation total"
        );
        self.audit.emit(
            context
                .event(
                    "work_order.cost_mismatch",
                    AuditCategory::Consistency,
                    AuditOutcome::Warning,
                )
                .with_metadata("work_order_id", generated.work_order_id.0.clone())
                .with_metadata("expected", expected.to_string())
                .with_metadata("actual", actual.to_string()),
        );
        warnings.push(WorkflowWarning::CostAccumulationMismatch {
            work_order_id: generated.work_order_id.clone(),
            cost_before,
            quotation_total,
            expected,
            actual,
        });
    }

    async fn bootstrap_task(
        &self,
        appointment: &Appointment,
        generated: &GeneratedWorkOrder,
        duration: Option<WorkDuration>,
        request: &GenerateWorkOrder,
        context: &AuditContext,
        warnings: &mut Vec<WorkflowWarning>,
    ) -> Option<WorkOrderTask> {
        let service_type = appointment.service_type.as_ref()?;
        let task = NewWorkOrderTask {
            work_order_id: generated.work_order_id.clone(),
            service_type_id: Some(service_type.id.clone()),
            description: service_type.name.clone(),
            estimated_hours: duration
                .map(|duration| duration.as_hours())
                .unwrap_or(service_type.standard_hours),
            priority: TaskPriority::Normal,
            created_by: request.generated_by.clone(),
        };

        let outcome = self
            .settings
            .write(ops::CREATE_WORK_ORDER_TASK, self.gateway.create_work_order_task(task))
            .await
            .map_err(WorkflowError::from)
            .and_then(|verdict| verdict.into_result(ops::CREATE_WORK_ORDER_TASK));

        match outcome {
            Ok(task) => Some(task),
            Err(error) => {
                warn!(
                    event_name = "work_order.bootstrap_task_failed",
                    correlation_id = %context.correlation_id,
                    work_order_id = %generated.work_order_id,
                    service_type_id = %service_type.id.0,
                    error = %error,
                    "work order was created without its bootstrap task"
                );
                warnings.push(WorkflowWarning::BootstrapTaskFailed {
                    work_order_id: generated.work_order_id.clone(),
                    reason: error.to_string(),
                });
                None
            }
        }
    }
}
