//! Quotation Manager: creates quotations and their line items.
//!
//! Totals are never stored. [`QuotationManager::get_quotation`] returns the quotation with its
//! current items and [`Quotation::total`] sums them on every call.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::domain::appointment::AppointmentId;
use crate::domain::quotation::{
    NewQuotation, NewQuotationItem, Quotation, QuotationId, QuotationItem, QuotationItemId,
    QuotationParent,
};
use crate::domain::work_order::{WorkOrder, WorkOrderId};
use crate::errors::WorkflowError;
use crate::gateway::{ops, DataGateway, ItemRemoval, Verdict};
use crate::workflow::WorkflowSettings;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateQuotation {
    pub appointment_id: Option<AppointmentId>,
    pub work_order_id: Option<WorkOrderId>,
    pub due_date: NaiveDate,
    pub comment: String,
    pub created_by: String,
}

pub struct QuotationManager<G> {
    gateway: Arc<G>,
    settings: WorkflowSettings,
}

impl<G> QuotationManager<G>
where
    G: DataGateway,
{
    pub fn new(gateway: Arc<G>, settings: WorkflowSettings) -> Self {
        Self { gateway, settings }
    }

    pub async fn create_quotation(
        &self,
        request: CreateQuotation,
    ) -> Result<Quotation, WorkflowError> {
        let parent = QuotationParent::from_refs(request.appointment_id, request.work_order_id)?;

        match &parent {
            QuotationParent::Appointment(appointment_id) => {
                let appointment = self
                    .settings
                    .read(ops::FETCH_APPOINTMENT, || self.gateway.fetch_appointment(appointment_id))
                    .await?;
                if appointment.is_none() {
                    return Err(WorkflowError::AppointmentNotFound(appointment_id.0.clone()));
                }
            }
            QuotationParent::WorkOrder(work_order_id) => {
                let work_order = self.eligible_work_order(work_order_id).await?;
                debug!(
                    work_order_id = %work_order.id,
                    status = %work_order.status,
                    "work order accepts new quotations"
                );
            }
        }

        let verdict = self
            .settings
            .write(
                ops::CREATE_QUOTATION,
                self.gateway.create_quotation(NewQuotation {
                    parent: parent.clone(),
                    due_date: request.due_date,
                    comment: request.comment,
                    created_by: request.created_by,
                }),
            )
            .await?;

        let quotation = match verdict {
            Verdict::Allowed(quotation) => quotation,
            Verdict::Denied { message } => return Err(self.creation_denied(&parent, message).await),
        };

        info!(
            event_name = "quotation.created",
            quotation_id = %quotation.id,
            mode = ?quotation.mode(),
            created_by = %quotation.created_by,
            "quotation created"
        );
        Ok(quotation)
    }

    /// The stored item. The quotation's total is stale until re-read.
    pub async fn add_item(&self, item: NewQuotationItem) -> Result<QuotationItem, WorkflowError> {
        item.validate()?;
        let created = self
            .settings
            .write(ops::ADD_QUOTATION_ITEM, self.gateway.add_quotation_item(item))
            .await?
            .into_result(ops::ADD_QUOTATION_ITEM)?;

        debug!(
            quotation_id = %created.quotation_id,
            item_id = %created.id,
            line_total = ?created.line_total().ok(),
            "quotation item added"
        );
        Ok(created)
    }

    /// Removing an item that is already gone succeeds.
    pub async fn remove_item(
        &self,
        item_id: &QuotationItemId,
        removed_by: &str,
    ) -> Result<ItemRemoval, WorkflowError> {
        let removal = self
            .settings
            .write(
                ops::REMOVE_QUOTATION_ITEM,
                self.gateway.remove_quotation_item(item_id, removed_by),
            )
            .await?
            .into_result(ops::REMOVE_QUOTATION_ITEM)?;

        debug!(item_id = %item_id, removal = ?removal, removed_by, "quotation item removed");
        Ok(removal)
    }

    pub async fn list_items(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Vec<QuotationItem>, WorkflowError> {
        let items = self
            .settings
            .read(ops::LIST_QUOTATION_ITEMS, || self.gateway.list_quotation_items(quotation_id))
            .await?;
        Ok(items)
    }

    pub async fn get_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Quotation, WorkflowError> {
        self.settings
            .read(ops::FETCH_QUOTATION, || self.gateway.fetch_quotation(quotation_id))
            .await?
            .ok_or_else(|| WorkflowError::QuotationNotFound(quotation_id.clone()))
    }

    async fn eligible_work_order(
        &self,
        work_order_id: &WorkOrderId,
    ) -> Result<WorkOrder, WorkflowError> {
        let work_order = self
            .settings
            .read(ops::FETCH_WORK_ORDER, || self.gateway.fetch_work_order(work_order_id))
            .await?
            .ok_or_else(|| WorkflowError::WorkOrderNotFound(work_order_id.clone()))?;

        if !work_order.status.accepts_new_quotations() {
            return Err(WorkflowError::WorkOrderNotEligible {
                work_order_id: work_order.id,
                number: work_order.number,
                status: work_order.status,
            });
        }
        Ok(work_order)
    }

    /// The store refused the insert. When the parent work order has since left the
    /// accepting statuses, report that instead of the raw denial.
    async fn creation_denied(&self, parent: &QuotationParent, message: String) -> WorkflowError {
        if let QuotationParent::WorkOrder(work_order_id) = parent {
            if let Err(error @ WorkflowError::WorkOrderNotEligible { .. }) =
                self.eligible_work_order(work_order_id).await
            {
                return error;
            }
        }
        WorkflowError::Rejected { operation: ops::CREATE_QUOTATION, message }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{CreateQuotation, QuotationManager};
    use crate::domain::appointment::{Appointment, AppointmentId};
    use crate::domain::quotation::{ItemKind, NewQuotationItem, QuotationId};
    use crate::domain::work_order::{ClientId, VehicleId, WorkOrderId};
    use crate::errors::{DomainError, WorkflowError};
    use crate::gateway::{InMemoryDataGateway, ItemRemoval};
    use crate::workflow::WorkflowSettings;

    async fn manager() -> QuotationManager<InMemoryDataGateway> {
        let gateway = InMemoryDataGateway::default();
        gateway
            .insert_appointment(Appointment {
                id: AppointmentId("AP-1".to_string()),
                client_id: ClientId("CL-1".to_string()),
                vehicle_id: VehicleId("VH-1".to_string()),
                scheduled_at: Utc::now(),
                service_type: None,
            })
            .await;
        QuotationManager::new(Arc::new(gateway), WorkflowSettings::default())
    }

    fn request(
        appointment_id: Option<&str>,
        work_order_id: Option<&str>,
    ) -> CreateQuotation {
        CreateQuotation {
            appointment_id: appointment_id.map(|id| AppointmentId(id.to_string())),
            work_order_id: work_order_id.map(|id| WorkOrderId(id.to_string())),
            due_date: NaiveDate::from_ymd_opt(2026, 11, 2).expect("date"),
            comment: "front brakes".to_string(),
            created_by: "advisor-1".to_string(),
        }
    }

    fn item(quotation_id: &QuotationId, quantity: i64, unit_price: i64) -> NewQuotationItem {
        NewQuotationItem {
            quotation_id: quotation_id.clone(),
            kind: ItemKind::Product,
            description: "brake pads".to_string(),
            quantity: Decimal::from(quantity),
            unit_price: Decimal::from(unit_price),
            discount: Decimal::ZERO,
            service_type_id: None,
        }
    }

    #[tokio::test]
    async fn both_or_neither_parent_is_invalid() {
        let manager = manager().await;

        for request in [request(Some("AP-1"), Some("WO-1")), request(None, None)] {
            let error = manager.create_quotation(request).await.expect_err("invalid parent");
            assert!(matches!(error, WorkflowError::Domain(DomainError::InvalidParent { .. })));
        }
    }

    #[tokio::test]
    async fn unknown_appointment_is_reported() {
        let manager = manager().await;
        let error =
            manager.create_quotation(request(Some("AP-404"), None)).await.expect_err("missing");
        assert_eq!(error, WorkflowError::AppointmentNotFound("AP-404".to_string()));
    }

    #[tokio::test]
    async fn total_follows_items_after_add_and_remove() {
        let manager = manager().await;
        let quotation =
            manager.create_quotation(request(Some("AP-1"), None)).await.expect("create");

        let pads = manager.add_item(item(&quotation.id, 2, 100)).await.expect("pads");
        manager.add_item(item(&quotation.id, 1, 50)).await.expect("labour");
        let read = manager.get_quotation(&quotation.id).await.expect("read");
        assert_eq!(read.total(), Ok(Decimal::from(250)));

        assert_eq!(manager.remove_item(&pads.id, "advisor-1").await, Ok(ItemRemoval::Removed));
        let read = manager.get_quotation(&quotation.id).await.expect("read");
        assert_eq!(read.total(), Ok(Decimal::from(50)));

        assert_eq!(
            manager.remove_item(&pads.id, "advisor-1").await,
            Ok(ItemRemoval::AlreadyAbsent)
        );
        assert_eq!(manager.list_items(&quotation.id).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn invalid_items_never_reach_the_store() {
        let manager = manager().await;
        let quotation =
            manager.create_quotation(request(Some("AP-1"), None)).await.expect("create");

        let error = manager.add_item(item(&quotation.id, 0, 10)).await.expect_err("zero quantity");
        assert!(matches!(error, WorkflowError::Domain(DomainError::InvalidQuantity { .. })));

        let mut discounted = item(&quotation.id, 1, 10);
        discounted.discount = Decimal::from(11);
        let error = manager.add_item(discounted).await.expect_err("discount above price");
        assert!(matches!(error, WorkflowError::Domain(DomainError::InvalidPrice { .. })));

        assert!(manager.list_items(&quotation.id).await.expect("list").is_empty());
    }
}
