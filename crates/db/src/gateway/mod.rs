//! SQLite-backed [`DataGateway`].
//!
//! Every mutating call is a single conditional statement, or a transaction that opens with
//! one, so the business checks and the write land in the same unit of work. A statement
//! that matches no row is a denial; the message is then explained from a follow-up read.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

use workshop_core::domain::appointment::{Appointment, AppointmentId};
use workshop_core::domain::quotation::{
    ItemKind, NewQuotation, NewQuotationItem, Quotation, QuotationId, QuotationItem,
    QuotationItemId, QuotationParent, QuotationStatus,
};
use workshop_core::domain::work_order::{
    NewWorkOrderTask, TaskPriority, TaskStatus, WorkOrder, WorkOrderId, WorkOrderStatus,
    WorkOrderTask, WorkOrderTaskId,
};
use workshop_core::errors::GatewayError;
use workshop_core::gateway::{
    bounded, ops, CostChange, DataGateway, DecisionRecord, DecisionRequest, GatewayResult,
    GeneratedWorkOrder, GenerationRequest, ItemRemoval, Verdict,
};

use crate::DbPool;

mod rows;

use rows::{from_cents, store_error, to_cents, DATE_FORMAT};

pub struct SqlDataGateway {
    pool: DbPool,
    call_timeout: Duration,
    work_order_prefix: String,
}

impl SqlDataGateway {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, call_timeout: Duration::from_secs(5), work_order_prefix: "WO".to_string() }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_work_order_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.work_order_prefix = prefix.into();
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn connection(
        &self,
        operation: &'static str,
    ) -> GatewayResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool.acquire().await.map_err(store_error(operation))
    }

    async fn create_quotation_in(
        &self,
        quotation: NewQuotation,
    ) -> GatewayResult<Verdict<Quotation>> {
        let operation = ops::CREATE_QUOTATION;
        let mut conn = self.connection(operation).await?;
        let id = QuotationId(Uuid::new_v4().to_string());
        let now = Utc::now();

        let statement = match &quotation.parent {
            QuotationParent::Appointment(appointment_id) => sqlx::query(
                "INSERT INTO quotation (id, appointment_id, work_order_id, due_date, comment,
                                        status, created_by, created_at)
                 SELECT ?, a.id, NULL, ?, ?, 'pending', ?, ?
                 FROM appointment a WHERE a.id = ?",
            )
            .bind(&id.0)
            .bind(quotation.due_date.format(DATE_FORMAT).to_string())
            .bind(&quotation.comment)
            .bind(&quotation.created_by)
            .bind(now.to_rfc3339())
            .bind(&appointment_id.0),
            QuotationParent::WorkOrder(work_order_id) => sqlx::query(
                "INSERT INTO quotation (id, appointment_id, work_order_id, due_date, comment,
                                        status, created_by, created_at)
                 SELECT ?, NULL, w.id, ?, ?, 'pending', ?, ?
                 FROM work_order w
                 WHERE w.id = ? AND w.status NOT IN ('closed', 'cancelled', 'invoiced')",
            )
            .bind(&id.0)
            .bind(quotation.due_date.format(DATE_FORMAT).to_string())
            .bind(&quotation.comment)
            .bind(&quotation.created_by)
            .bind(now.to_rfc3339())
            .bind(&work_order_id.0),
        };
        let inserted =
            statement.execute(&mut *conn).await.map_err(store_error(operation))?.rows_affected();

        if inserted == 0 {
            let message = match &quotation.parent {
                QuotationParent::Appointment(appointment_id) => {
                    format!("appointment {appointment_id} not found")
                }
                QuotationParent::WorkOrder(work_order_id) => {
                    match load_work_order(&mut conn, work_order_id, operation).await? {
                        None => format!("work order {work_order_id} not found"),
                        Some(work_order) => closed_work_order(&work_order),
                    }
                }
            };
            return denied(operation, message);
        }

        debug!(operation, quotation_id = %id, "quotation row inserted");
        Ok(Verdict::Allowed(Quotation {
            id,
            parent: quotation.parent,
            due_date: quotation.due_date,
            comment: quotation.comment,
            status: QuotationStatus::Pending,
            items: Vec::new(),
            created_by: quotation.created_by,
            created_at: now,
            decided_by: None,
            decided_at: None,
            decision_comment: None,
            generated_work_order_id: None,
        }))
    }

    async fn add_quotation_item_in(
        &self,
        item: NewQuotationItem,
    ) -> GatewayResult<Verdict<QuotationItem>> {
        let operation = ops::ADD_QUOTATION_ITEM;
        if let Err(error) = item.validate() {
            return denied(operation, error.to_string());
        }
        let mut conn = self.connection(operation).await?;
        let id = QuotationItemId(Uuid::new_v4().to_string());
        let now = Utc::now();

        let inserted = sqlx::query(
            "INSERT INTO quotation_item (id, quotation_id, seq, kind, description, quantity,
                                         unit_price, discount, service_type_id, created_at)
             SELECT ?, q.id,
                    COALESCE(
                        (SELECT MAX(seq) FROM quotation_item WHERE quotation_id = q.id), 0
                    ) + 1,
                    ?, ?, ?, ?, ?, ?, ?
             FROM quotation q
             WHERE q.id = ? AND q.status = 'pending'",
        )
        .bind(&id.0)
        .bind(item.kind.as_str())
        .bind(&item.description)
        .bind(item.quantity.to_string())
        .bind(item.unit_price.to_string())
        .bind(item.discount.to_string())
        .bind(item.service_type_id.as_ref().map(|service_type| service_type.0.as_str()))
        .bind(now.to_rfc3339())
        .bind(&item.quotation_id.0)
        .execute(&mut *conn)
        .await
        .map_err(store_error(operation))?
        .rows_affected();

        if inserted == 0 {
            let message = match quotation_status(&mut conn, &item.quotation_id, operation).await? {
                None => format!("quotation {} not found", item.quotation_id),
                Some(status) => {
                    format!("quotation {} is already {}", item.quotation_id, status.as_str())
                }
            };
            return denied(operation, message);
        }

        Ok(Verdict::Allowed(QuotationItem {
            id,
            quotation_id: item.quotation_id,
            kind: item.kind,
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount: item.discount,
            service_type_id: item.service_type_id,
            created_at: now,
        }))
    }

    async fn remove_quotation_item_in(
        &self,
        id: &QuotationItemId,
        removed_by: &str,
    ) -> GatewayResult<Verdict<ItemRemoval>> {
        let operation = ops::REMOVE_QUOTATION_ITEM;
        let mut conn = self.connection(operation).await?;

        let deleted = sqlx::query(
            "DELETE FROM quotation_item
             WHERE id = ?
               AND quotation_id IN (SELECT id FROM quotation WHERE status = 'pending')",
        )
        .bind(&id.0)
        .execute(&mut *conn)
        .await
        .map_err(store_error(operation))?
        .rows_affected();

        if deleted > 0 {
            debug!(operation, item_id = %id, removed_by, "quotation item removed");
            return Ok(Verdict::Allowed(ItemRemoval::Removed));
        }

        let owner = sqlx::query(
            "SELECT q.id, q.status
             FROM quotation_item i JOIN quotation q ON q.id = i.quotation_id
             WHERE i.id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(store_error(operation))?;

        match owner {
            None => Ok(Verdict::Allowed(ItemRemoval::AlreadyAbsent)),
            Some(row) => {
                let quotation_id: String = row.try_get("id").map_err(store_error(operation))?;
                let status: String = row.try_get("status").map_err(store_error(operation))?;
                denied(operation, format!("quotation {quotation_id} is already {status}"))
            }
        }
    }

    async fn decide_quotation_in(
        &self,
        request: DecisionRequest,
    ) -> GatewayResult<Verdict<DecisionRecord>> {
        let operation = ops::DECIDE_QUOTATION;
        let mut conn = self.connection(operation).await?;
        let status = request.decision.target_status();
        let decided_at = Utc::now();

        let updated = sqlx::query(
            "UPDATE quotation
             SET status = ?, decided_by = ?, decided_at = ?, decision_comment = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(&request.decided_by)
        .bind(decided_at.to_rfc3339())
        .bind(&request.comment)
        .bind(&request.quotation_id.0)
        .execute(&mut *conn)
        .await
        .map_err(store_error(operation))?
        .rows_affected();

        if updated == 0 {
            let current = quotation_status(&mut conn, &request.quotation_id, operation).await?;
            let message = match current {
                None => format!("quotation {} not found", request.quotation_id),
                Some(current) => {
                    format!("quotation {} was already {}", request.quotation_id, current.as_str())
                }
            };
            return denied(operation, message);
        }

        Ok(Verdict::Allowed(DecisionRecord {
            quotation_id: request.quotation_id,
            status,
            decided_at,
        }))
    }

    async fn generate_work_order_in(
        &self,
        request: GenerationRequest,
    ) -> GatewayResult<Verdict<GeneratedWorkOrder>> {
        let operation = ops::GENERATE_WORK_ORDER;
        let mut tx = self.pool.begin().await.map_err(store_error(operation))?;
        let new_work_order_id = Uuid::new_v4().to_string();

        // Claim the quotation before anything else is read, so concurrent generations
        // serialize on this row and only one of them proceeds.
        let claimed = sqlx::query(
            "UPDATE quotation
             SET generated_work_order_id = COALESCE(work_order_id, ?)
             WHERE id = ? AND status = 'approved' AND generated_work_order_id IS NULL",
        )
        .bind(&new_work_order_id)
        .bind(&request.quotation_id.0)
        .execute(&mut *tx)
        .await
        .map_err(store_error(operation))?
        .rows_affected();

        if claimed == 0 {
            let message = generation_refusal(&mut tx, &request.quotation_id, operation).await?;
            return denied(operation, message);
        }

        let Some(quotation) = load_quotation(&mut tx, &request.quotation_id, operation).await?
        else {
            return denied(operation, format!("quotation {} not found", request.quotation_id));
        };
        let total = match quotation.total() {
            Ok(total) => total,
            Err(error) => return denied(operation, error.to_string()),
        };
        let total_cents = to_cents(total, operation)?;
        let now = Utc::now();

        let generated = match &quotation.parent {
            QuotationParent::Appointment(appointment_id) => {
                let Some(appointment) = load_appointment(&mut tx, appointment_id, operation).await?
                else {
                    return denied(operation, format!("appointment {appointment_id} not found"));
                };

                let sequence: i64 = sqlx::query(
                    "UPDATE work_order_sequence SET last_number = last_number + 1
                     WHERE id = 1 RETURNING last_number",
                )
                .fetch_one(&mut *tx)
                .await
                .map_err(store_error(operation))?
                .try_get("last_number")
                .map_err(store_error(operation))?;
                let number = format!("{}-{:05}", self.work_order_prefix, sequence);

                sqlx::query(
                    "INSERT INTO work_order (id, number, client_id, vehicle_id, status,
                                             estimated_cost_cents, advisor_id, mechanic_id,
                                             odometer, estimated_date, estimated_duration,
                                             created_by, created_at, updated_by, updated_at)
                     VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?)",
                )
                .bind(&new_work_order_id)
                .bind(&number)
                .bind(&appointment.client_id.0)
                .bind(&appointment.vehicle_id.0)
                .bind(total_cents)
                .bind(&request.advisor_id)
                .bind(&request.mechanic_id)
                .bind(request.odometer.map(i64::from))
                .bind(request.estimated_date.map(|date| date.format(DATE_FORMAT).to_string()))
                .bind(&request.estimated_duration)
                .bind(&request.generated_by)
                .bind(now.to_rfc3339())
                .bind(now.to_rfc3339())
                .execute(&mut *tx)
                .await
                .map_err(store_error(operation))?;

                let cost_after = work_order_cost(&mut tx, &new_work_order_id, operation).await?;
                GeneratedWorkOrder {
                    work_order_id: WorkOrderId(new_work_order_id),
                    work_order_number: number,
                    status: WorkOrderStatus::Pending,
                    merged_tasks: Vec::new(),
                    cost: cost_after.map(|after| CostChange {
                        before: Decimal::ZERO,
                        after: from_cents(after),
                    }),
                }
            }
            QuotationParent::WorkOrder(work_order_id) => {
                // The claim above holds the write lock, so nothing else moves the cost
                // between this read and the one after the update.
                let cost_before = work_order_cost(&mut tx, &work_order_id.0, operation).await?;
                let merged = sqlx::query(
                    "UPDATE work_order
                     SET estimated_cost_cents = estimated_cost_cents + ?,
                         status = CASE WHEN status IN ('pending', 'on_hold')
                                       THEN 'in_progress' ELSE status END,
                         mechanic_id = COALESCE(?, mechanic_id),
                         odometer = COALESCE(?, odometer),
                         updated_by = ?,
                         updated_at = ?
                     WHERE id = ? AND status NOT IN ('closed', 'cancelled', 'invoiced')",
                )
                .bind(total_cents)
                .bind(&request.mechanic_id)
                .bind(request.odometer.map(i64::from))
                .bind(&request.generated_by)
                .bind(now.to_rfc3339())
                .bind(&work_order_id.0)
                .execute(&mut *tx)
                .await
                .map_err(store_error(operation))?
                .rows_affected();

                let Some(work_order) = load_work_order(&mut tx, work_order_id, operation).await?
                else {
                    return denied(operation, format!("work order {work_order_id} not found"));
                };
                if merged == 0 {
                    return denied(operation, closed_work_order(&work_order));
                }

                let mut merged_tasks = Vec::new();
                for item in quotation.items.iter().filter(|item| {
                    item.kind == ItemKind::Service && item.service_type_id.is_some()
                }) {
                    let task = NewWorkOrderTask {
                        work_order_id: work_order.id.clone(),
                        service_type_id: item.service_type_id.clone(),
                        description: item.description.clone(),
                        estimated_hours: item.quantity,
                        priority: TaskPriority::Normal,
                        created_by: request.generated_by.clone(),
                    };
                    merged_tasks.push(insert_task(&mut tx, task, operation).await?);
                }

                GeneratedWorkOrder {
                    cost: cost_before.map(|before| CostChange {
                        before: from_cents(before),
                        after: work_order.estimated_cost,
                    }),
                    work_order_id: work_order.id,
                    work_order_number: work_order.number,
                    status: work_order.status,
                    merged_tasks,
                }
            }
        };

        tx.commit().await.map_err(store_error(operation))?;
        debug!(
            operation,
            quotation_id = %request.quotation_id,
            work_order_id = %generated.work_order_id,
            total_cents,
            "work order generation committed"
        );
        Ok(Verdict::Allowed(generated))
    }

    async fn create_work_order_task_in(
        &self,
        task: NewWorkOrderTask,
    ) -> GatewayResult<Verdict<WorkOrderTask>> {
        let operation = ops::CREATE_WORK_ORDER_TASK;
        let mut conn = self.connection(operation).await?;
        let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM work_order WHERE id = ?)")
            .bind(&task.work_order_id.0)
            .fetch_one(&mut *conn)
            .await
            .map_err(store_error(operation))?;
        if exists == 0 {
            return denied(operation, format!("work order {} not found", task.work_order_id));
        }

        let created = insert_task(&mut conn, task, operation).await?;
        Ok(Verdict::Allowed(created))
    }
}

#[async_trait]
impl DataGateway for SqlDataGateway {
    async fn fetch_work_order(&self, id: &WorkOrderId) -> GatewayResult<Option<WorkOrder>> {
        let operation = ops::FETCH_WORK_ORDER;
        bounded(operation, self.call_timeout, async {
            let mut conn = self.connection(operation).await?;
            load_work_order(&mut conn, id, operation).await
        })
        .await
    }

    async fn fetch_appointment(&self, id: &AppointmentId) -> GatewayResult<Option<Appointment>> {
        let operation = ops::FETCH_APPOINTMENT;
        bounded(operation, self.call_timeout, async {
            let mut conn = self.connection(operation).await?;
            load_appointment(&mut conn, id, operation).await
        })
        .await
    }

    async fn fetch_quotation(&self, id: &QuotationId) -> GatewayResult<Option<Quotation>> {
        let operation = ops::FETCH_QUOTATION;
        bounded(operation, self.call_timeout, async {
            let mut conn = self.connection(operation).await?;
            load_quotation(&mut conn, id, operation).await
        })
        .await
    }

    async fn list_quotation_items(&self, id: &QuotationId) -> GatewayResult<Vec<QuotationItem>> {
        let operation = ops::LIST_QUOTATION_ITEMS;
        bounded(operation, self.call_timeout, async {
            let mut conn = self.connection(operation).await?;
            load_items(&mut conn, id, operation).await
        })
        .await
    }

    async fn list_work_order_tasks(&self, id: &WorkOrderId) -> GatewayResult<Vec<WorkOrderTask>> {
        let operation = ops::LIST_WORK_ORDER_TASKS;
        bounded(operation, self.call_timeout, async {
            let records = sqlx::query(
                "SELECT id, work_order_id, service_type_id, description, estimated_hours,
                        actual_hours, priority, status, created_by, created_at
                 FROM work_order_task WHERE work_order_id = ? ORDER BY rowid",
            )
            .bind(&id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error(operation))?;

            records.iter().map(|row| rows::task(row, operation)).collect()
        })
        .await
    }

    async fn list_awaiting_generation(&self) -> GatewayResult<Vec<QuotationId>> {
        let operation = ops::LIST_AWAITING_GENERATION;
        bounded(operation, self.call_timeout, async {
            let ids: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM quotation
                 WHERE status = 'approved' AND generated_work_order_id IS NULL
                 ORDER BY decided_at, id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(store_error(operation))?;

            Ok(ids.into_iter().map(QuotationId).collect())
        })
        .await
    }

    async fn create_quotation(&self, quotation: NewQuotation) -> GatewayResult<Verdict<Quotation>> {
        bounded(ops::CREATE_QUOTATION, self.call_timeout, self.create_quotation_in(quotation)).await
    }

    async fn add_quotation_item(
        &self,
        item: NewQuotationItem,
    ) -> GatewayResult<Verdict<QuotationItem>> {
        bounded(ops::ADD_QUOTATION_ITEM, self.call_timeout, self.add_quotation_item_in(item)).await
    }

    async fn remove_quotation_item(
        &self,
        id: &QuotationItemId,
        removed_by: &str,
    ) -> GatewayResult<Verdict<ItemRemoval>> {
        bounded(
            ops::REMOVE_QUOTATION_ITEM,
            self.call_timeout,
            self.remove_quotation_item_in(id, removed_by),
        )
        .await
    }

    async fn decide_quotation(
        &self,
        request: DecisionRequest,
    ) -> GatewayResult<Verdict<DecisionRecord>> {
        bounded(ops::DECIDE_QUOTATION, self.call_timeout, self.decide_quotation_in(request)).await
    }

    async fn generate_work_order(
        &self,
        request: GenerationRequest,
    ) -> GatewayResult<Verdict<GeneratedWorkOrder>> {
        bounded(ops::GENERATE_WORK_ORDER, self.call_timeout, self.generate_work_order_in(request))
            .await
    }

    async fn create_work_order_task(
        &self,
        task: NewWorkOrderTask,
    ) -> GatewayResult<Verdict<WorkOrderTask>> {
        bounded(
            ops::CREATE_WORK_ORDER_TASK,
            self.call_timeout,
            self.create_work_order_task_in(task),
        )
        .await
    }
}

fn denied<T>(operation: &'static str, message: String) -> GatewayResult<Verdict<T>> {
    debug!(operation, %message, "store denied the call");
    Ok(Verdict::denied(message))
}

fn closed_work_order(work_order: &WorkOrder) -> String {
    format!(
        "work order {} is {} and takes no new quotations",
        work_order.number, work_order.status
    )
}

async fn quotation_status(
    conn: &mut SqliteConnection,
    id: &QuotationId,
    operation: &'static str,
) -> GatewayResult<Option<QuotationStatus>> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM quotation WHERE id = ?")
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(store_error(operation))?;

    status
        .map(|status| {
            QuotationStatus::parse(&status).ok_or_else(|| GatewayError::Malformed {
                operation,
                message: format!("status: unknown value `{status}`"),
            })
        })
        .transpose()
}

async fn generation_refusal(
    conn: &mut SqliteConnection,
    id: &QuotationId,
    operation: &'static str,
) -> GatewayResult<String> {
    let row = sqlx::query("SELECT status, generated_work_order_id FROM quotation WHERE id = ?")
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(store_error(operation))?;

    let Some(row) = row else {
        return Ok(format!("quotation {id} not found"));
    };
    let status: String = row.try_get("status").map_err(store_error(operation))?;
    let generated: Option<String> =
        row.try_get("generated_work_order_id").map_err(store_error(operation))?;

    if status != QuotationStatus::Approved.as_str() {
        return Ok(format!("quotation {id} is {status}, not approved"));
    }
    Ok(match generated {
        Some(work_order_id) => {
            format!("quotation {id} was already generated into work order {work_order_id}")
        }
        None => format!("quotation {id} could not be claimed for generation"),
    })
}

async fn work_order_cost(
    conn: &mut SqliteConnection,
    work_order_id: &str,
    operation: &'static str,
) -> GatewayResult<Option<i64>> {
    sqlx::query_scalar("SELECT estimated_cost_cents FROM work_order WHERE id = ?")
        .bind(work_order_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(store_error(operation))
}

async fn load_work_order(
    conn: &mut SqliteConnection,
    id: &WorkOrderId,
    operation: &'static str,
) -> GatewayResult<Option<WorkOrder>> {
    let row = sqlx::query(
        "SELECT id, number, client_id, vehicle_id, status, estimated_cost_cents, advisor_id,
                mechanic_id, odometer, estimated_date, estimated_duration, created_by,
                created_at, updated_by, updated_at
         FROM work_order WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await
    .map_err(store_error(operation))?;

    row.map(|row| rows::work_order(&row, operation)).transpose()
}

async fn load_appointment(
    conn: &mut SqliteConnection,
    id: &AppointmentId,
    operation: &'static str,
) -> GatewayResult<Option<Appointment>> {
    let row = sqlx::query(
        "SELECT a.id, a.client_id, a.vehicle_id, a.scheduled_at, a.service_type_id,
                s.name AS service_type_name, s.standard_hours AS service_type_hours
         FROM appointment a LEFT JOIN service_type s ON s.id = a.service_type_id
         WHERE a.id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await
    .map_err(store_error(operation))?;

    row.map(|row| rows::appointment(&row, operation)).transpose()
}

async fn load_quotation(
    conn: &mut SqliteConnection,
    id: &QuotationId,
    operation: &'static str,
) -> GatewayResult<Option<Quotation>> {
    let row = sqlx::query(
        "SELECT id, appointment_id, work_order_id, due_date, comment, status, created_by,
                created_at, decided_by, decided_at, decision_comment, generated_work_order_id
         FROM quotation WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await
    .map_err(store_error(operation))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut quotation = rows::quotation(&row, operation)?;
    quotation.items = load_items(conn, id, operation).await?;
    Ok(Some(quotation))
}

async fn load_items(
    conn: &mut SqliteConnection,
    id: &QuotationId,
    operation: &'static str,
) -> GatewayResult<Vec<QuotationItem>> {
    let records = sqlx::query(
        "SELECT id, quotation_id, kind, description, quantity, unit_price, discount,
                service_type_id, created_at
         FROM quotation_item WHERE quotation_id = ? ORDER BY seq",
    )
    .bind(&id.0)
    .fetch_all(&mut *conn)
    .await
    .map_err(store_error(operation))?;

    records.iter().map(|row| rows::item(row, operation)).collect()
}

async fn insert_task(
    conn: &mut SqliteConnection,
    task: NewWorkOrderTask,
    operation: &'static str,
) -> GatewayResult<WorkOrderTask> {
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

    sqlx::query(
        "INSERT INTO work_order_task (id, work_order_id, service_type_id, description,
                                      estimated_hours, actual_hours, priority, status,
                                      created_by, created_at)
         VALUES (?, ?, ?, ?, ?, NULL, ?, ?, ?, ?)",
    )
    .bind(&created.id.0)
    .bind(&created.work_order_id.0)
    .bind(created.service_type_id.as_ref().map(|service_type| service_type.0.as_str()))
    .bind(&created.description)
    .bind(created.estimated_hours.to_string())
    .bind(created.priority.as_str())
    .bind(created.status.as_str())
    .bind(&created.created_by)
    .bind(created.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(store_error(operation))?;

    Ok(created)
}
