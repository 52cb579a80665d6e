use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use workshop_core::domain::appointment::{Appointment, AppointmentId, ServiceType};
use workshop_core::domain::quotation::{
    ItemKind, Quotation, QuotationId, QuotationItem, QuotationItemId, QuotationParent,
    QuotationStatus,
};
use workshop_core::domain::work_order::{
    ClientId, ServiceTypeId, TaskPriority, TaskStatus, VehicleId, WorkOrder, WorkOrderId,
    WorkOrderStatus, WorkOrderTask, WorkOrderTaskId,
};
use workshop_core::errors::GatewayError;
use workshop_core::gateway::GatewayResult;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Maps driver failures: decoding problems are malformed responses, everything else is
/// transport.
pub(crate) fn store_error(operation: &'static str) -> impl Fn(sqlx::Error) -> GatewayError {
    move |error| match &error {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => {
            GatewayError::Malformed { operation, message: error.to_string() }
        }
        _ => GatewayError::Transport { operation, message: error.to_string() },
    }
}

pub(crate) fn to_cents(amount: Decimal, operation: &'static str) -> GatewayResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| GatewayError::Malformed {
            operation,
            message: format!("amount {amount} does not fit the cost column"),
        })
}

pub(crate) fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

struct RowReader<'r> {
    row: &'r SqliteRow,
    operation: &'static str,
}

impl<'r> RowReader<'r> {
    fn new(row: &'r SqliteRow, operation: &'static str) -> Self {
        Self { row, operation }
    }

    fn malformed(&self, column: &str, message: impl std::fmt::Display) -> GatewayError {
        GatewayError::Malformed {
            operation: self.operation,
            message: format!("{column}: {message}"),
        }
    }

    fn text(&self, column: &str) -> GatewayResult<String> {
        self.row.try_get(column).map_err(|error| self.malformed(column, error))
    }

    fn opt_text(&self, column: &str) -> GatewayResult<Option<String>> {
        self.row.try_get(column).map_err(|error| self.malformed(column, error))
    }

    fn integer(&self, column: &str) -> GatewayResult<i64> {
        self.row.try_get(column).map_err(|error| self.malformed(column, error))
    }

    fn opt_u32(&self, column: &str) -> GatewayResult<Option<u32>> {
        let value: Option<i64> =
            self.row.try_get(column).map_err(|error| self.malformed(column, error))?;
        value
            .map(|value| u32::try_from(value).map_err(|error| self.malformed(column, error)))
            .transpose()
    }

    fn decimal(&self, column: &str) -> GatewayResult<Decimal> {
        let raw = self.text(column)?;
        Decimal::from_str(&raw).map_err(|error| self.malformed(column, error))
    }

    fn opt_decimal(&self, column: &str) -> GatewayResult<Option<Decimal>> {
        self.opt_text(column)?
            .map(|raw| Decimal::from_str(&raw).map_err(|error| self.malformed(column, error)))
            .transpose()
    }

    fn timestamp(&self, column: &str) -> GatewayResult<DateTime<Utc>> {
        let raw = self.text(column)?;
        parse_timestamp(&raw).map_err(|error| self.malformed(column, error))
    }

    fn opt_timestamp(&self, column: &str) -> GatewayResult<Option<DateTime<Utc>>> {
        self.opt_text(column)?
            .map(|raw| parse_timestamp(&raw).map_err(|error| self.malformed(column, error)))
            .transpose()
    }

    fn date(&self, column: &str) -> GatewayResult<NaiveDate> {
        let raw = self.text(column)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|error| self.malformed(column, error))
    }

    fn opt_date(&self, column: &str) -> GatewayResult<Option<NaiveDate>> {
        self.opt_text(column)?
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                    .map_err(|error| self.malformed(column, error))
            })
            .transpose()
    }

    fn parsed<T>(&self, column: &str, parse: fn(&str) -> Option<T>) -> GatewayResult<T> {
        let raw = self.text(column)?;
        parse(&raw).ok_or_else(|| self.malformed(column, format!("unknown value `{raw}`")))
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|timestamp| timestamp.with_timezone(&Utc))
}

pub(crate) fn work_order(row: &SqliteRow, operation: &'static str) -> GatewayResult<WorkOrder> {
    let reader = RowReader::new(row, operation);
    Ok(WorkOrder {
        id: WorkOrderId(reader.text("id")?),
        number: reader.text("number")?,
        client_id: ClientId(reader.text("client_id")?),
        vehicle_id: VehicleId(reader.text("vehicle_id")?),
        status: reader.parsed("status", WorkOrderStatus::parse)?,
        estimated_cost: from_cents(reader.integer("estimated_cost_cents")?),
        advisor_id: reader.opt_text("advisor_id")?,
        mechanic_id: reader.opt_text("mechanic_id")?,
        odometer: reader.opt_u32("odometer")?,
        estimated_date: reader.opt_date("estimated_date")?,
        estimated_duration: reader.opt_text("estimated_duration")?,
        created_by: reader.text("created_by")?,
        created_at: reader.timestamp("created_at")?,
        updated_by: reader.opt_text("updated_by")?,
        updated_at: reader.timestamp("updated_at")?,
    })
}

pub(crate) fn task(row: &SqliteRow, operation: &'static str) -> GatewayResult<WorkOrderTask> {
    let reader = RowReader::new(row, operation);
    Ok(WorkOrderTask {
        id: WorkOrderTaskId(reader.text("id")?),
        work_order_id: WorkOrderId(reader.text("work_order_id")?),
        service_type_id: reader.opt_text("service_type_id")?.map(ServiceTypeId),
        description: reader.text("description")?,
        estimated_hours: reader.decimal("estimated_hours")?,
        actual_hours: reader.opt_decimal("actual_hours")?,
        priority: reader.parsed("priority", TaskPriority::parse)?,
        status: reader.parsed("status", TaskStatus::parse)?,
        created_by: reader.text("created_by")?,
        created_at: reader.timestamp("created_at")?,
    })
}

pub(crate) fn appointment(row: &SqliteRow, operation: &'static str) -> GatewayResult<Appointment> {
    let reader = RowReader::new(row, operation);
    let service_type = match reader.opt_text("service_type_id")? {
        Some(id) => Some(ServiceType {
            id: ServiceTypeId(id),
            name: reader.text("service_type_name")?,
            standard_hours: reader.decimal("service_type_hours")?,
        }),
        None => None,
    };

    Ok(Appointment {
        id: AppointmentId(reader.text("id")?),
        client_id: ClientId(reader.text("client_id")?),
        vehicle_id: VehicleId(reader.text("vehicle_id")?),
        scheduled_at: reader.timestamp("scheduled_at")?,
        service_type,
    })
}

pub(crate) fn item(row: &SqliteRow, operation: &'static str) -> GatewayResult<QuotationItem> {
    let reader = RowReader::new(row, operation);
    Ok(QuotationItem {
        id: QuotationItemId(reader.text("id")?),
        quotation_id: QuotationId(reader.text("quotation_id")?),
        kind: reader.parsed("kind", ItemKind::parse)?,
        description: reader.text("description")?,
        quantity: reader.decimal("quantity")?,
        unit_price: reader.decimal("unit_price")?,
        discount: reader.decimal("discount")?,
        service_type_id: reader.opt_text("service_type_id")?.map(ServiceTypeId),
        created_at: reader.timestamp("created_at")?,
    })
}

/// A quotation row; the caller attaches the items.
pub(crate) fn quotation(row: &SqliteRow, operation: &'static str) -> GatewayResult<Quotation> {
    let reader = RowReader::new(row, operation);
    let parent = QuotationParent::from_refs(
        reader.opt_text("appointment_id")?.map(AppointmentId),
        reader.opt_text("work_order_id")?.map(WorkOrderId),
    )
    .map_err(|error| reader.malformed("appointment_id/work_order_id", error))?;

    Ok(Quotation {
        id: QuotationId(reader.text("id")?),
        parent,
        due_date: reader.date("due_date")?,
        comment: reader.text("comment")?,
        status: reader.parsed("status", QuotationStatus::parse)?,
        items: Vec::new(),
        created_by: reader.text("created_by")?,
        created_at: reader.timestamp("created_at")?,
        decided_by: reader.opt_text("decided_by")?,
        decided_at: reader.opt_timestamp("decided_at")?,
        decision_comment: reader.opt_text("decision_comment")?,
        generated_work_order_id: reader.opt_text("generated_work_order_id")?.map(WorkOrderId),
    })
}
