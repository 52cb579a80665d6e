use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::appointment::{Appointment, AppointmentId};
use crate::domain::quotation::{
    ItemKind, NewQuotation, NewQuotationItem, Quotation, QuotationId, QuotationItem,
    QuotationItemId, QuotationParent, QuotationStatus,
};
use crate::domain::work_order::{
    NewWorkOrderTask, TaskPriority, TaskStatus, WorkOrder, WorkOrderId, WorkOrderStatus,
    WorkOrderTask, WorkOrderTaskId,
};

use super::{
    CostChange, DataGateway, DecisionRecord, DecisionRequest, GatewayResult, GeneratedWorkOrder,
    GenerationRequest, ItemRemoval, Verdict,
};

#[derive(Default)]
struct Store {
    appointments: HashMap<String, Appointment>,
    work_orders: HashMap<String, WorkOrder>,
    tasks: Vec<WorkOrderTask>,
    quotations: HashMap<String, Quotation>,
    /// Insertion order is the listing order.
    items: Vec<QuotationItem>,
    issued_numbers: u32,
}

impl Store {
    fn items_of(&self, quotation_id: &QuotationId) -> Vec<QuotationItem> {
        self.items.iter().filter(|item| &item.quotation_id == quotation_id).cloned().collect()
    }

    fn quotation(&self, id: &QuotationId) -> Option<Quotation> {
        self.quotations.get(&id.0).map(|quotation| {
            let mut quotation = quotation.clone();
            quotation.items = self.items_of(id);
            quotation
        })
    }
}

/// A gateway over process memory. Every mutating call holds the write lock for its whole
/// check-and-write, which gives it the same per-entity serialization the SQL store gets
/// from conditional updates.
pub struct InMemoryDataGateway {
    store: RwLock<Store>,
    work_order_prefix: String,
}

impl Default for InMemoryDataGateway {
    fn default() -> Self {
        Self::new("WO")
    }
}

impl InMemoryDataGateway {
    pub fn new(work_order_prefix: impl Into<String>) -> Self {
        Self { store: RwLock::new(Store::default()), work_order_prefix: work_order_prefix.into() }
    }

    pub async fn insert_appointment(&self, appointment: Appointment) {
        let mut store = self.store.write().await;
        store.appointments.insert(appointment.id.0.clone(), appointment);
    }

    /// Inserts or replaces a work order as-is.
    pub async fn insert_work_order(&self, work_order: WorkOrder) {
        let mut store = self.store.write().await;
        store.issued_numbers += 1;
        store.work_orders.insert(work_order.id.0.clone(), work_order);
    }
}

#[async_trait::async_trait]
impl DataGateway for InMemoryDataGateway {
    async fn fetch_work_order(&self, id: &WorkOrderId) -> GatewayResult<Option<WorkOrder>> {
        let store = self.store.read().await;
        Ok(store.work_orders.get(&id.0).cloned())
    }

    async fn fetch_appointment(
        &self,
        id: &AppointmentId,
    ) -> GatewayResult<Option<Appointment>> {
        let store = self.store.read().await;
        Ok(store.appointments.get(&id.0).cloned())
    }

    async fn fetch_quotation(&self, id: &QuotationId) -> GatewayResult<Option<Quotation>> {
        let store = self.store.read().await;
        Ok(store.quotation(id))
    }

    async fn list_quotation_items(&self, id: &QuotationId) -> GatewayResult<Vec<QuotationItem>> {
        let store = self.store.read().await;
        Ok(store.items_of(id))
    }

    async fn list_work_order_tasks(
        &self,
        id: &WorkOrderId,
    ) -> GatewayResult<Vec<WorkOrderTask>> {
        let store = self.store.read().await;
        Ok(store.tasks.iter().filter(|task| &task.work_order_id == id).cloned().collect())
    }

    async fn list_awaiting_generation(&self) -> GatewayResult<Vec<QuotationId>> {
        let store = self.store.read().await;
        let mut pending: Vec<&Quotation> =
            store.quotations.values().filter(|quotation| quotation.awaiting_generation()).collect();
        pending.sort_by_key(|quotation| quotation.decided_at);
        Ok(pending.into_iter().map(|quotation| quotation.id.clone()).collect())
    }

    async fn create_quotation(
        &self,
        quotation: NewQuotation,
    ) -> GatewayResult<Verdict<Quotation>> {
        let mut store = self.store.write().await;

        match &quotation.parent {
            QuotationParent::Appointment(appointment_id) => {
                if !store.appointments.contains_key(&appointment_id.0) {
                    return Ok(Verdict::denied(format!("appointment {appointment_id} not found")));
                }
            }
            QuotationParent::WorkOrder(work_order_id) => {
                let Some(work_order) = store.work_orders.get(&work_order_id.0) else {
                    return Ok(Verdict::denied(format!("work order {work_order_id} not found")));
                };
                if !work_order.status.accepts_new_quotations() {
                    return Ok(Verdict::denied(format!(
                        "work order {} is {} and takes no new quotations",
                        work_order.number, work_order.status
                    )));
                }
            }
        }

        let created = Quotation {
            id: QuotationId(Uuid::new_v4().to_string()),
            parent: quotation.parent,
            due_date: quotation.due_date,
            comment: quotation.comment,
            status: QuotationStatus::Pending,
            items: Vec::new(),
            created_by: quotation.created_by,
            created_at: Utc::now(),
            decided_by: None,
            decided_at: None,
            decision_comment: None,
            generated_work_order_id: None,
        };
        store.quotations.insert(created.id.0.clone(), created.clone());
        Ok(Verdict::Allowed(created))
    }

    async fn add_quotation_item(
        &self,
        item: NewQuotationItem,
    ) -> GatewayResult<Verdict<QuotationItem>> {
        if let Err(error) = item.validate() {
            return Ok(Verdict::denied(error.to_string()));
        }
        let mut store = self.store.write().await;

        let Some(quotation) = store.quotations.get(&item.quotation_id.0) else {
            return Ok(Verdict::denied(format!("quotation {} not found", item.quotation_id)));
        };
        if quotation.status.is_decided() {
            return Ok(Verdict::denied(format!(
                "quotation {} is already {}",
                item.quotation_id,
                quotation.status.as_str()
            )));
        }

        let created = QuotationItem {
            id: QuotationItemId(Uuid::new_v4().to_string()),
            quotation_id: item.quotation_id,
            kind: item.kind,
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount: item.discount,
            service_type_id: item.service_type_id,
            created_at: Utc::now(),
        };
        store.items.push(created.clone());
        Ok(Verdict::Allowed(created))
    }

    async fn remove_quotation_item(
        &self,
        id: &QuotationItemId,
        _removed_by: &str,
    ) -> GatewayResult<Verdict<ItemRemoval>> {
        let mut store = self.store.write().await;

        let Some(position) = store.items.iter().position(|item| &item.id == id) else {
            return Ok(Verdict::Allowed(ItemRemoval::AlreadyAbsent));
        };
        let quotation_id = store.items[position].quotation_id.clone();
        if let Some(quotation) = store.quotations.get(&quotation_id.0) {
            if quotation.status.is_decided() {
                return Ok(Verdict::denied(format!(
                    "quotation {quotation_id} is already {}",
                    quotation.status.as_str()
                )));
            }
        }

        store.items.remove(position);
        Ok(Verdict::Allowed(ItemRemoval::Removed))
    }

    async fn decide_quotation(
        &self,
        request: DecisionRequest,
    ) -> GatewayResult<Verdict<DecisionRecord>> {
        let mut store = self.store.write().await;

        let Some(quotation) = store.quotations.get_mut(&request.quotation_id.0) else {
            return Ok(Verdict::denied(format!("quotation {} not found", request.quotation_id)));
        };
        let status = match quotation.status.decide(request.decision) {
            Ok(status) => status,
            Err(_) => {
                return Ok(Verdict::denied(format!(
                    "quotation {} was already {}",
                    request.quotation_id,
                    quotation.status.as_str()
                )))
            }
        };

        let decided_at = Utc::now();
        quotation.status = status;
        quotation.decided_by = Some(request.decided_by);
        quotation.decided_at = Some(decided_at);
        quotation.decision_comment = Some(request.comment);

        Ok(Verdict::Allowed(DecisionRecord {
            quotation_id: request.quotation_id,
            status,
            decided_at,
        }))
    }

    async fn generate_work_order(
        &self,
        request: GenerationRequest,
    ) -> GatewayResult<Verdict<GeneratedWorkOrder>> {
        let mut store = self.store.write().await;

        let Some(quotation) = store.quotation(&request.quotation_id) else {
            return Ok(Verdict::denied(format!("quotation {} not found", request.quotation_id)));
        };
        if quotation.status != QuotationStatus::Approved {
            return Ok(Verdict::denied(format!(
                "quotation {} is {}, not approved",
                quotation.id,
                quotation.status.as_str()
            )));
        }
        if let Some(work_order_id) = &quotation.generated_work_order_id {
            return Ok(Verdict::denied(format!(
                "quotation {} was already generated into work order {work_order_id}",
                quotation.id
            )));
        }

        let total = match quotation.total() {
            Ok(total) => total,
            Err(error) => return Ok(Verdict::denied(error.to_string())),
        };
        let now = Utc::now();

        let generated = match &quotation.parent {
            QuotationParent::Appointment(appointment_id) => {
                let Some(appointment) = store.appointments.get(&appointment_id.0).cloned() else {
                    return Ok(Verdict::denied(format!("appointment {appointment_id} not found")));
                };
                store.issued_numbers += 1;
                let work_order = WorkOrder {
                    id: WorkOrderId(Uuid::new_v4().to_string()),
                    number: format!("{}-{:05}", self.work_order_prefix, store.issued_numbers),
                    client_id: appointment.client_id,
                    vehicle_id: appointment.vehicle_id,
                    status: WorkOrderStatus::Pending,
                    estimated_cost: total,
                    advisor_id: Some(request.advisor_id),
                    mechanic_id: request.mechanic_id,
                    odometer: request.odometer,
                    estimated_date: request.estimated_date,
                    estimated_duration: request.estimated_duration,
                    created_by: request.generated_by,
                    created_at: now,
                    updated_by: None,
                    updated_at: now,
                };
                let generated = GeneratedWorkOrder {
                    work_order_id: work_order.id.clone(),
                    work_order_number: work_order.number.clone(),
                    status: work_order.status,
                    merged_tasks: Vec::new(),
                    cost: Some(CostChange { before: Decimal::ZERO, after: total }),
                };
                store.work_orders.insert(work_order.id.0.clone(), work_order);
                generated
            }
            QuotationParent::WorkOrder(work_order_id) => {
                let Some(work_order) = store.work_orders.get_mut(&work_order_id.0) else {
                    return Ok(Verdict::denied(format!("work order {work_order_id} not found")));
                };
                if !work_order.status.accepts_new_quotations() {
                    return Ok(Verdict::denied(format!(
                        "work order {} is {} and takes no new quotations",
                        work_order.number, work_order.status
                    )));
                }
                let before = work_order.estimated_cost;
                let Some(after) = before.checked_add(total) else {
                    return Ok(Verdict::denied(format!(
                        "work order {} cannot take {total} more",
                        work_order.number
                    )));
                };
                work_order.estimated_cost = after;
                work_order.status = work_order.status.after_merge();
                work_order.updated_by = Some(request.generated_by.clone());
                work_order.updated_at = now;
                if request.mechanic_id.is_some() {
                    work_order.mechanic_id = request.mechanic_id;
                }
                if request.odometer.is_some() {
                    work_order.odometer = request.odometer;
                }

                let generated = GeneratedWorkOrder {
                    work_order_id: work_order.id.clone(),
                    work_order_number: work_order.number.clone(),
                    status: work_order.status,
                    merged_tasks: service_tasks(&quotation, work_order_id, &request.generated_by),
                    cost: Some(CostChange { before, after }),
                };
                store.tasks.extend(generated.merged_tasks.iter().cloned());
                generated
            }
        };

        if let Some(stored) = store.quotations.get_mut(&quotation.id.0) {
            stored.generated_work_order_id = Some(generated.work_order_id.clone());
        }
        Ok(Verdict::Allowed(generated))
    }

    async fn create_work_order_task(
        &self,
        task: NewWorkOrderTask,
    ) -> GatewayResult<Verdict<WorkOrderTask>> {
        let mut store = self.store.write().await;

        if !store.work_orders.contains_key(&task.work_order_id.0) {
            return Ok(Verdict::denied(format!("work order {} not found", task.work_order_id)));
        }

        let created = WorkOrderTask {
            id: WorkOrderTaskId(Uuid::new_v4().to_string()),
            work_order_id: task.work_order_id,
            service_type_id: task.service_type_id,
            description: task.description,
            estimated_hours: task.estimated_hours,
            actual_hours: None,
            priority: task.priority,
            status: TaskStatus::Pending,
            created_by: task.created_by,
            created_at: Utc::now(),
        };
        store.tasks.push(created.clone());
        Ok(Verdict::Allowed(created))
    }
}

/// One task per service item that names a service type; the item quantity is the
/// labour estimate in hours.
fn service_tasks(
    quotation: &Quotation,
    work_order_id: &WorkOrderId,
    created_by: &str,
) -> Vec<WorkOrderTask> {
    let now = Utc::now();
    quotation
        .items
        .iter()
        .filter(|item| item.kind == ItemKind::Service && item.service_type_id.is_some())
        .map(|item| WorkOrderTask {
            id: WorkOrderTaskId(Uuid::new_v4().to_string()),
            work_order_id: work_order_id.clone(),
            service_type_id: item.service_type_id.clone(),
            description: item.description.clone(),
            estimated_hours: item.quantity.max(Decimal::ZERO),
            actual_hours: None,
            priority: TaskPriority::Normal,
            status: TaskStatus::Pending,
            created_by: created_by.to_string(),
            created_at: now,
        })
        .collect()
}
