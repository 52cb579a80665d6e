use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::quotation::{QuotationId, QuotationStatus, MAX_QUANTITY};
use crate::domain::work_order::{WorkOrderId, WorkOrderStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid quotation parent: {reason}")]
    InvalidParent { reason: String },
    #[error(
        "quantity must be greater than zero and at most {max}, got {quantity}",
        max = MAX_QUANTITY
    )]
    InvalidQuantity { quantity: Decimal },
    #[error("invalid price: {reason}")]
    InvalidPrice { reason: String },
    #[error("invalid duration `{raw}`")]
    InvalidDuration { raw: String },
    #[error("quotation already decided as {status:?}")]
    AlreadyDecided { status: QuotationStatus },
}

/// Failures of the gateway transport itself, as opposed to a business-rule denial.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway transport failure during `{operation}`: {message}")]
    Transport { operation: &'static str, message: String },
    #[error("gateway call `{operation}` timed out; outcome unknown")]
    Timeout { operation: &'static str },
    #[error("malformed gateway response for `{operation}`: {message}")]
    Malformed { operation: &'static str, message: String },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    Conflict,
    Rejected,
    Transport,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("work order {number} is {status} and takes no new quotations")]
    WorkOrderNotEligible { work_order_id: WorkOrderId, number: String, status: WorkOrderStatus },
    #[error("quotation {quotation_id} was already decided as {status:?}")]
    AlreadyDecided { quotation_id: QuotationId, status: QuotationStatus },
    #[error("quotation {quotation_id} is {status:?}, not approved")]
    NotApproved { quotation_id: QuotationId, status: QuotationStatus },
    #[error("quotation {quotation_id} was already generated into work order {work_order_id}")]
    AlreadyGenerated { quotation_id: QuotationId, work_order_id: WorkOrderId },
    #[error("quotation {0} not found")]
    QuotationNotFound(QuotationId),
    #[error("work order {0} not found")]
    WorkOrderNotFound(WorkOrderId),
    #[error("appointment {0} not found")]
    AppointmentNotFound(String),
    #[error("`{operation}` rejected by the store: {message}")]
    Rejected { operation: &'static str, message: String },
}

impl WorkflowError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Domain(DomainError::AlreadyDecided { .. }) => ErrorClass::Conflict,
            Self::Domain(_) => ErrorClass::Validation,
            Self::Gateway(_) => ErrorClass::Transport,
            Self::Rejected { .. } => ErrorClass::Rejected,
            Self::WorkOrderNotEligible { .. }
            | Self::AlreadyDecided { .. }
            | Self::NotApproved { .. }
            | Self::AlreadyGenerated { .. }
            | Self::QuotationNotFound(_)
            | Self::WorkOrderNotFound(_)
            | Self::AppointmentNotFound(_) => ErrorClass::Conflict,
        }
    }

    /// Only transport failures may be retried, and only by callers of read-only or
    /// idempotent operations.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(error) if error.is_retryable())
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self.class() {
            ErrorClass::Validation => InterfaceError::BadRequest { message, correlation_id },
            ErrorClass::Conflict | ErrorClass::Rejected => {
                InterfaceError::Conflict { message, correlation_id }
            }
            ErrorClass::Transport => match self {
                Self::Gateway(GatewayError::Malformed { .. }) => {
                    InterfaceError::Internal { message, correlation_id }
                }
                _ => InterfaceError::ServiceUnavailable { message, correlation_id },
            },
        }
    }
}

/// Returned next to an otherwise successful result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowWarning {
    CostAccumulationMismatch {
        work_order_id: WorkOrderId,
        cost_before: Decimal,
        quotation_total: Decimal,
        expected: Decimal,
        actual: Decimal,
    },
    BootstrapTaskFailed {
        work_order_id: WorkOrderId,
        reason: String,
    },
    PostConditionUnchecked {
        work_order_id: WorkOrderId,
        reason: String,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The record changed or is in a state that does not allow this action."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Check the record before retrying."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}
