#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use workshop_core::domain::appointment::{Appointment, AppointmentId, ServiceType};
use workshop_core::domain::quotation::{
    Decision, ItemKind, NewQuotation, NewQuotationItem, Quotation, QuotationId, QuotationItem,
    QuotationItemId,
};
use workshop_core::domain::work_order::{
    ClientId, NewWorkOrderTask, ServiceTypeId, VehicleId, WorkOrder, WorkOrderId,
    WorkOrderStatus, WorkOrderTask,
};
use workshop_core::gateway::{
    CostChange, DataGateway, DecisionRecord, DecisionRequest, GatewayResult, GeneratedWorkOrder,
    GenerationRequest, ItemRemoval, Verdict,
};
use workshop_core::{
    CreateQuotation, DecideQuotation, GenerateWorkOrder, InMemoryAuditSink, InMemoryDataGateway,
    InMemoryNotifier, WorkflowSettings, Workshop,
};

pub const APPOINTMENT: &str = "AP-100";
pub const CLIENT: &str = "CL-100";
pub const WORK_ORDER_42: &str = "wo-42";

pub fn appointment() -> Appointment {
    Appointment {
        id: AppointmentId(APPOINTMENT.to_string()),
        client_id: ClientId(CLIENT.to_string()),
        vehicle_id: VehicleId("VH-100".to_string()),
        scheduled_at: Utc::now(),
        service_type: Some(ServiceType {
            id: ServiceTypeId("ST-TUNEUP".to_string()),
            name: "Tune-up".to_string(),
            standard_hours: Decimal::new(25, 1),
        }),
    }
}

pub fn work_order(id: &str, number: &str, status: WorkOrderStatus, cost: i64) -> WorkOrder {
    let now = Utc::now();
    WorkOrder {
        id: WorkOrderId(id.to_string()),
        number: number.to_string(),
        client_id: ClientId(CLIENT.to_string()),
        vehicle_id: VehicleId("VH-100".to_string()),
        status,
        estimated_cost: Decimal::from(cost),
        advisor_id: Some("advisor-1".to_string()),
        mechanic_id: None,
        odometer: Some(84_000),
        estimated_date: None,
        estimated_duration: None,
        created_by: "advisor-1".to_string(),
        created_at: now,
        updated_by: None,
        updated_at: now,
    }
}

pub fn for_appointment() -> CreateQuotation {
    CreateQuotation {
        appointment_id: Some(AppointmentId(APPOINTMENT.to_string())),
        work_order_id: None,
        due_date: NaiveDate::from_ymd_opt(2026, 11, 10).expect("date"),
        comment: "first visit".to_string(),
        created_by: "advisor-1".to_string(),
    }
}

pub fn for_work_order(id: &str) -> CreateQuotation {
    CreateQuotation {
        appointment_id: None,
        work_order_id: Some(WorkOrderId(id.to_string())),
        due_date: NaiveDate::from_ymd_opt(2026, 11, 10).expect("date"),
        comment: "found a worn belt".to_string(),
        created_by: "advisor-1".to_string(),
    }
}

pub fn product(quotation_id: &QuotationId, quantity: i64, unit_price: i64) -> NewQuotationItem {
    NewQuotationItem {
        quotation_id: quotation_id.clone(),
        kind: ItemKind::Product,
        description: "part".to_string(),
        quantity: Decimal::from(quantity),
        unit_price: Decimal::from(unit_price),
        discount: Decimal::ZERO,
        service_type_id: None,
    }
}

pub fn service(quotation_id: &QuotationId, hours: i64, rate: i64) -> NewQuotationItem {
    NewQuotationItem {
        quotation_id: quotation_id.clone(),
        kind: ItemKind::Service,
        description: "belt replacement".to_string(),
        quantity: Decimal::from(hours),
        unit_price: Decimal::from(rate),
        discount: Decimal::ZERO,
        service_type_id: Some(ServiceTypeId("ST-BELT".to_string())),
    }
}

pub fn approve(quotation_id: &QuotationId) -> DecideQuotation {
    decision(quotation_id, Decision::Approve)
}

pub fn decision(quotation_id: &QuotationId, decision: Decision) -> DecideQuotation {
    DecideQuotation {
        quotation_id: quotation_id.clone(),
        decision,
        decided_by: "manager-1".to_string(),
        comment: "go ahead".to_string(),
    }
}

pub fn generate(quotation_id: &QuotationId) -> GenerateWorkOrder {
    GenerateWorkOrder {
        quotation_id: quotation_id.clone(),
        advisor_id: "advisor-1".to_string(),
        mechanic_id: Some("mechanic-3".to_string()),
        odometer: Some(84_250),
        estimated_date: NaiveDate::from_ymd_opt(2026, 11, 12),
        estimated_duration: None,
        generated_by: "advisor-1".to_string(),
    }
}

pub struct Harness<G> {
    pub gateway: Arc<G>,
    pub workshop: Workshop<G>,
    pub audit: InMemoryAuditSink,
    pub notifier: InMemoryNotifier,
}

impl<G> Harness<G>
where
    G: DataGateway,
{
    pub fn new(gateway: G) -> Self {
        let gateway = Arc::new(gateway);
        let audit = InMemoryAuditSink::default();
        let notifier = InMemoryNotifier::default();
        let workshop = Workshop::new(
            gateway.clone(),
            WorkflowSettings::default(),
            Arc::new(audit.clone()),
            Arc::new(notifier.clone()),
        );
        Self { gateway, workshop, audit, notifier }
    }
}

pub async fn seeded_store() -> InMemoryDataGateway {
    let gateway = InMemoryDataGateway::default();
    gateway.insert_appointment(appointment()).await;
    gateway
        .insert_work_order(work_order(WORK_ORDER_42, "WO-00042", WorkOrderStatus::InProgress, 500))
        .await;
    gateway
}

/// Wraps the in-memory store and misbehaves on request.
#[derive(Default)]
pub struct FaultyGateway {
    pub inner: InMemoryDataGateway,
    /// Served once by the next `fetch_quotation`, in place of the stored quotation.
    pub stale_quotation: Mutex<Option<Quotation>>,
    /// Merges overwrite the cost with the quotation total and say so in the reported change.
    pub overwrite_cost: bool,
    /// Generation results carry no before/after cost.
    pub hide_cost_change: bool,
    pub fail_tasks: bool,
}

impl FaultyGateway {
    pub async fn seeded() -> Self {
        Self { inner: seeded_store().await, ..Self::default() }
    }

    pub fn serve_stale(&self, quotation: Quotation) {
        if let Ok(mut stale) = self.stale_quotation.lock() {
            *stale = Some(quotation);
        }
    }
}

#[async_trait]
impl DataGateway for FaultyGateway {
    async fn fetch_work_order(&self, id: &WorkOrderId) -> GatewayResult<Option<WorkOrder>> {
        self.inner.fetch_work_order(id).await
    }

    async fn fetch_appointment(
        &self,
        id: &AppointmentId,
    ) -> GatewayResult<Option<Appointment>> {
        self.inner.fetch_appointment(id).await
    }

    async fn fetch_quotation(&self, id: &QuotationId) -> GatewayResult<Option<Quotation>> {
        let stale = self.stale_quotation.lock().ok().and_then(|mut stale| stale.take());
        match stale {
            Some(quotation) => Ok(Some(quotation)),
            None => self.inner.fetch_quotation(id).await,
        }
    }

    async fn list_quotation_items(
        &self,
        id: &QuotationId,
    ) -> GatewayResult<Vec<QuotationItem>> {
        self.inner.list_quotation_items(id).await
    }

    async fn list_work_order_tasks(
        &self,
        id: &WorkOrderId,
    ) -> GatewayResult<Vec<WorkOrderTask>> {
        self.inner.list_work_order_tasks(id).await
    }

    async fn list_awaiting_generation(&self) -> GatewayResult<Vec<QuotationId>> {
        self.inner.list_awaiting_generation().await
    }

    async fn create_quotation(
        &self,
        quotation: NewQuotation,
    ) -> GatewayResult<Verdict<Quotation>> {
        self.inner.create_quotation(quotation).await
    }

    async fn add_quotation_item(
        &self,
        item: NewQuotationItem,
    ) -> GatewayResult<Verdict<QuotationItem>> {
        self.inner.add_quotation_item(item).await
    }

    async fn remove_quotation_item(
        &self,
        id: &QuotationItemId,
        removed_by: &str,
    ) -> GatewayResult<Verdict<ItemRemoval>> {
        self.inner.remove_quotation_item(id, removed_by).await
    }

    async fn decide_quotation(
        &self,
        request: DecisionRequest,
    ) -> GatewayResult<Verdict<DecisionRecord>> {
        self.inner.decide_quotation(request).await
    }

    async fn generate_work_order(
        &self,
        request: GenerationRequest,
    ) -> GatewayResult<Verdict<GeneratedWorkOrder>> {
        let quotation = self.inner.fetch_quotation(&request.quotation_id).await?;
        let mut verdict = self.inner.generate_work_order(request).await?;

        if let Verdict::Allowed(generated) = &mut verdict {
            let total = quotation.and_then(|quotation| quotation.total().ok());
            if let (true, Some(total)) = (self.overwrite_cost, total) {
                let stored = self.inner.fetch_work_order(&generated.work_order_id).await?;
                if let Some(mut work_order) = stored {
                    let before = generated.cost.map_or(Decimal::ZERO, |change| change.before);
                    work_order.estimated_cost = total;
                    self.inner.insert_work_order(work_order).await;
                    generated.cost = Some(CostChange { before, after: total });
                }
            }
            if self.hide_cost_change {
                generated.cost = None;
            }
        }
        Ok(verdict)
    }

    async fn create_work_order_task(
        &self,
        task: NewWorkOrderTask,
    ) -> GatewayResult<Verdict<WorkOrderTask>> {
        if self.fail_tasks {
            return Ok(Verdict::denied(format!(
                "service type {:?} has no technician assigned",
                task.service_type_id.map(|id| id.0)
            )));
        }
        self.inner.create_work_order_task(task).await
    }
}

/// Wraps the in-memory store and hands control back to the runtime before every call, so
/// futures joined on one thread take turns between each read and write.
#[derive(Default)]
pub struct YieldingGateway {
    pub inner: InMemoryDataGateway,
}

impl YieldingGateway {
    pub async fn seeded() -> Self {
        Self { inner: seeded_store().await }
    }
}

#[async_trait]
impl DataGateway for YieldingGateway {
    async fn fetch_work_order(&self, id: &WorkOrderId) -> GatewayResult<Option<WorkOrder>> {
        tokio::task::yield_now().await;
        self.inner.fetch_work_order(id).await
    }

    async fn fetch_appointment(
        &self,
        id: &AppointmentId,
    ) -> GatewayResult<Option<Appointment>> {
        tokio::task::yield_now().await;
        self.inner.fetch_appointment(id).await
    }

    async fn fetch_quotation(&self, id: &QuotationId) -> GatewayResult<Option<Quotation>> {
        tokio::task::yield_now().await;
        self.inner.fetch_quotation(id).await
    }

    async fn list_quotation_items(
        &self,
        id: &QuotationId,
    ) -> GatewayResult<Vec<QuotationItem>> {
        tokio::task::yield_now().await;
        self.inner.list_quotation_items(id).await
    }

    async fn list_work_order_tasks(
        &self,
        id: &WorkOrderId,
    ) -> GatewayResult<Vec<WorkOrderTask>> {
        tokio::task::yield_now().await;
        self.inner.list_work_order_tasks(id).await
    }

    async fn list_awaiting_generation(&self) -> GatewayResult<Vec<QuotationId>> {
        tokio::task::yield_now().await;
        self.inner.list_awaiting_generation().await
    }

    async fn create_quotation(
        &self,
        quotation: NewQuotation,
    ) -> GatewayResult<Verdict<Quotation>> {
        tokio::task::yield_now().await;
        self.inner.create_quotation(quotation).await
    }

    async fn add_quotation_item(
        &self,
        item: NewQuotationItem,
    ) -> GatewayResult<Verdict<QuotationItem>> {
        tokio::task::yield_now().await;
        self.inner.add_quotation_item(item).await
    }

    async fn remove_quotation_item(
        &self,
        id: &QuotationItemId,
        removed_by: &str,
    ) -> GatewayResult<Verdict<ItemRemoval>> {
        tokio::task::yield_now().await;
        self.inner.remove_quotation_item(id, removed_by).await
    }

    async fn decide_quotation(
        &self,
        request: DecisionRequest,
    ) -> GatewayResult<Verdict<DecisionRecord>> {
        tokio::task::yield_now().await;
        self.inner.decide_quotation(request).await
    }

    async fn generate_work_order(
        &self,
        request: GenerationRequest,
    ) -> GatewayResult<Verdict<GeneratedWorkOrder>> {
        tokio::task::yield_now().await;
        self.inner.generate_work_order(request).await
    }

    async fn create_work_order_task(
        &self,
        task: NewWorkOrderTask,
    ) -> GatewayResult<Verdict<WorkOrderTask>> {
        tokio::task::yield_now().await;
        self.inner.create_work_order_task(task).await
    }
}
