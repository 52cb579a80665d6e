pub mod approval;
pub mod audit;
pub mod config;
pub mod domain;
pub mod duration;
pub mod errors;
pub mod gateway;
pub mod generation;
pub mod notify;
pub mod quotation;
pub mod workflow;

pub use approval::{ApprovalEngine, DecideQuotation, DecisionResult};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::appointment::{Appointment, AppointmentId, ServiceType};
pub use domain::quotation::{
    Decision, GenerationMode, ItemKind, NewQuotationItem, Quotation, QuotationId, QuotationItem,
    QuotationItemId, QuotationParent, QuotationStatus,
};
pub use domain::work_order::{
    ClientId, ServiceTypeId, VehicleId, WorkOrder, WorkOrderId, WorkOrderStatus, WorkOrderTask,
};
pub use duration::{normalize, WorkDuration};
pub use errors::{
    DomainError, ErrorClass, GatewayError, InterfaceError, WorkflowError, WorkflowWarning,
};
pub use gateway::{DataGateway, InMemoryDataGateway, ReadRetry, Verdict};
pub use generation::{GenerateWorkOrder, GenerationEngine, GenerationResult};
pub use notify::{
    InMemoryNotifier, Notification, NotificationDispatcher, NotificationKind, NotifyError,
    TracingNotifier,
};
pub use quotation::{CreateQuotation, QuotationManager};
pub use workflow::{WorkflowSettings, Workshop};
