use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::appointment::AppointmentId;
use crate::domain::work_order::{ServiceTypeId, WorkOrderId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationItemId(pub String);

impl std::fmt::Display for QuotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for QuotationItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a quotation is attached to. Exactly one of the two, enforced by the type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum QuotationParent {
    Appointment(AppointmentId),
    WorkOrder(WorkOrderId),
}

impl QuotationParent {
    /// Builds a parent from the two optional references a request layer receives.
    pub fn from_refs(
        appointment_id: Option<AppointmentId>,
        work_order_id: Option<WorkOrderId>,
    ) -> Result<Self, DomainError> {
        match (appointment_id, work_order_id) {
            (Some(appointment_id), None) => Ok(Self::Appointment(appointment_id)),
            (None, Some(work_order_id)) => Ok(Self::WorkOrder(work_order_id)),
            (Some(_), Some(_)) => Err(DomainError::InvalidParent {
                reason: "both appointment and work order were supplied".to_string(),
            }),
            (None, None) => Err(DomainError::InvalidParent {
                reason: "neither appointment nor work order was supplied".to_string(),
            }),
        }
    }

    pub fn mode(&self) -> GenerationMode {
        match self {
            Self::Appointment(_) => GenerationMode::Initial,
            Self::WorkOrder(_) => GenerationMode::Additional,
        }
    }

    pub fn appointment_id(&self) -> Option<&AppointmentId> {
        match self {
            Self::Appointment(id) => Some(id),
            Self::WorkOrder(_) => None,
        }
    }

    pub fn work_order_id(&self) -> Option<&WorkOrderId> {
        match self {
            Self::Appointment(_) => None,
            Self::WorkOrder(id) => Some(id),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Approved quotation opens a new work order.
    Initial,
    /// Approved quotation merges into the work order it was raised against.
    Additional,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn target_status(self) -> QuotationStatus {
        match self {
            Self::Approve => QuotationStatus::Approved,
            Self::Reject => QuotationStatus::Rejected,
        }
    }
}

impl QuotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The only transition function for quotation status. `Pending` moves to the
    /// decision's target; any decided status refuses every further decision.
    pub fn decide(self, decision: Decision) -> Result<QuotationStatus, DomainError> {
        match self {
            Self::Pending => Ok(decision.target_status()),
            decided => Err(DomainError::AlreadyDecided { status: decided }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Product,
    Service,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Service => "service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "product" => Some(Self::Product),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuotationItem {
    pub id: QuotationItemId,
    pub quotation_id: QuotationId,
    pub kind: ItemKind,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Per-unit discount.
    pub discount: Decimal,
    pub service_type_id: Option<ServiceTypeId>,
    pub created_at: DateTime<Utc>,
}

/// Largest quantity accepted on one line.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
/// Largest unit price accepted on one line.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

impl QuotationItem {
    pub fn line_total(&self) -> Result<Decimal, DomainError> {
        line_total(self.quantity, self.unit_price, self.discount)
    }
}

pub fn line_total(
    quantity: Decimal,
    unit_price: Decimal,
    discount: Decimal,
) -> Result<Decimal, DomainError> {
    unit_price.checked_sub(discount).and_then(|net| net.checked_mul(quantity)).ok_or_else(|| {
        DomainError::InvalidPrice {
            reason: format!("line total of {quantity} x ({unit_price} - {discount}) overflows"),
        }
    })
}

/// A quotation as read from the store. The total is never stored: it is derived from
/// the items that came back with the read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub parent: QuotationParent,
    pub due_date: NaiveDate,
    pub comment: String,
    pub status: QuotationStatus,
    pub items: Vec<QuotationItem>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_comment: Option<String>,
    pub generated_work_order_id: Option<WorkOrderId>,
}

impl Quotation {
    /// Sum of the current line totals. Fails instead of overflowing.
    pub fn total(&self) -> Result<Decimal, DomainError> {
        self.items.iter().try_fold(Decimal::ZERO, |total, item| {
            total.checked_add(item.line_total()?).ok_or_else(|| DomainError::InvalidPrice {
                reason: format!("total of quotation {} overflows", self.id),
            })
        })
    }

    pub fn mode(&self) -> GenerationMode {
        self.parent.mode()
    }

    pub fn awaiting_generation(&self) -> bool {
        self.status == QuotationStatus::Approved && self.generated_work_order_id.is_none()
    }
}

/// Input for a new line item, validated before any gateway call is made.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewQuotationItem {
    pub quotation_id: QuotationId,
    pub kind: ItemKind,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub service_type_id: Option<ServiceTypeId>,
}

impl NewQuotationItem {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= Decimal::ZERO || self.quantity > MAX_QUANTITY {
            return Err(DomainError::InvalidQuantity { quantity: self.quantity });
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::InvalidPrice {
                reason: format!("unit price {} is negative", self.unit_price),
            });
        }
        if self.unit_price > MAX_UNIT_PRICE {
            return Err(DomainError::InvalidPrice {
                reason: format!("unit price {} exceeds {MAX_UNIT_PRICE}", self.unit_price),
            });
        }
        if self.discount < Decimal::ZERO {
            return Err(DomainError::InvalidPrice {
                reason: format!("discount {} is negative", self.discount),
            });
        }
        if self.discount > self.unit_price {
            return Err(DomainError::InvalidPrice {
                reason: format!(
                    "discount {} exceeds unit price {}",
                    self.discount, self.unit_price
                ),
            });
        }
        line_total(self.quantity, self.unit_price, self.discount).map(|_| ())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewQuotation {
    pub parent: QuotationParent,
    pub due_date: NaiveDate,
    pub comment: String,
    pub created_by: String,
}
