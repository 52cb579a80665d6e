use sqlx::Executor;
use thiserror::Error;

use crate::connection::DbPool;

const SEED_CLIENT_IDS: &[&str] = &["CL-100", "CL-200"];
const SEED_VEHICLE_IDS: &[&str] = &["VH-100", "VH-200"];
const SEED_SERVICE_TYPE_IDS: &[&str] = &["ST-TUNEUP", "ST-BELT", "ST-BRAKES"];
const SEED_APPOINTMENT_IDS: &[&str] = &["AP-100", "AP-200"];

/// Work orders the seed ships with, and the state each must be in.
const SEED_WORK_ORDERS: &[SeedWorkOrder] = &[
    SeedWorkOrder {
        id: "wo-42",
        number: "WO-00042",
        status: "in_progress",
        estimated_cost_cents: 50_000,
        label: "work-order-42",
    },
    SeedWorkOrder {
        id: "wo-43",
        number: "WO-00043",
        status: "invoiced",
        estimated_cost_cents: 120_000,
        label: "work-order-43",
    },
];

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seed database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Demo workshop dataset.
///
/// Provides deterministic fixtures for:
/// 1. An appointment with a service type, ready for an initial quotation
/// 2. An appointment without a service type
/// 3. An in-progress work order (`WO-00042`) that takes additional quotations
/// 4. An invoiced work order (`WO-00043`) that refuses them
pub struct WorkshopSeed;

impl WorkshopSeed {
    pub const SQL: &str = include_str!("../../../config/fixtures/workshop_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, SeedError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            appointments: SEED_APPOINTMENT_IDS.to_vec(),
            work_orders: SEED_WORK_ORDERS.iter().map(|work_order| work_order.number).collect(),
        })
    }

    /// Checks that every seeded row is present and the work orders are in their seeded state.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, SeedError> {
        let mut checks = Vec::new();

        checks.push(("clients", count_ids(pool, "client", SEED_CLIENT_IDS).await? == 2));
        checks.push(("vehicles", count_ids(pool, "vehicle", SEED_VEHICLE_IDS).await? == 2));
        checks.push((
            "service-types",
            count_ids(pool, "service_type", SEED_SERVICE_TYPE_IDS).await? == 3,
        ));
        checks.push((
            "appointments",
            count_ids(pool, "appointment", SEED_APPOINTMENT_IDS).await? == 2,
        ));

        for work_order in SEED_WORK_ORDERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM work_order
                               WHERE id = ?1 AND number = ?2 AND status = ?3
                                 AND estimated_cost_cents = ?4)",
            )
            .bind(work_order.id)
            .bind(work_order.number)
            .bind(work_order.status)
            .bind(work_order.estimated_cost_cents)
            .fetch_one(pool)
            .await?;
            checks.push((work_order.label, present == 1));
        }

        let last_number: i64 =
            sqlx::query_scalar("SELECT last_number FROM work_order_sequence WHERE id = 1")
                .fetch_one(pool)
                .await?;
        checks.push(("work-order-sequence", last_number >= 43));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows, and everything created against them, from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), SeedError> {
        let mut tx = pool.begin().await?;

        let clients = sql_array_from_ids(SEED_CLIENT_IDS);
        let appointments = sql_array_from_ids(SEED_APPOINTMENT_IDS);
        let work_orders = format!("(SELECT id FROM work_order WHERE client_id IN {clients})");
        let quotations = format!(
            "(SELECT id FROM quotation
              WHERE appointment_id IN {appointments}
                 OR work_order_id IN {work_orders}
                 OR generated_work_order_id IN {work_orders})"
        );

        sqlx::query(&format!("DELETE FROM quotation_item WHERE quotation_id IN {quotations}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM quotation WHERE id IN {quotations}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM work_order_task WHERE work_order_id IN {work_orders}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM work_order WHERE client_id IN {clients}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM appointment WHERE id IN {appointments}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM vehicle WHERE id IN {}",
            sql_array_from_ids(SEED_VEHICLE_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM client WHERE id IN {clients}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM service_type WHERE id IN {}",
            sql_array_from_ids(SEED_SERVICE_TYPE_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedWorkOrder {
    id: &'static str,
    number: &'static str,
    status: &'static str,
    estimated_cost_cents: i64,
    label: &'static str,
}

async fn count_ids(pool: &DbPool, table: &str, ids: &[&str]) -> Result<i64, SeedError> {
    let count = sqlx::query_scalar(&format!(
        "SELECT COUNT(1) FROM {table} WHERE id IN {}",
        sql_array_from_ids(ids)
    ))
    .fetch_one(pool)
    .await?;
    Ok(count)
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub appointments: Vec<&'static str>,
    pub work_orders: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!WorkshopSeed::SQL.is_empty());
    }

    #[tokio::test]
    async fn seed_is_verifiable_and_idempotent() {
        let pool = migrated_pool().await;

        let first = WorkshopSeed::load(&pool).await.expect("load seed fixtures");
        let first_verification = WorkshopSeed::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.work_orders, vec!["WO-00042", "WO-00043"]);

        WorkshopSeed::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            WorkshopSeed::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);

        let last_number: i64 =
            sqlx::query_scalar("SELECT last_number FROM work_order_sequence WHERE id = 1")
                .fetch_one(&pool)
                .await
                .expect("sequence");
        assert_eq!(last_number, 43);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = migrated_pool().await;
        WorkshopSeed::load(&pool).await.expect("load seed fixtures");

        WorkshopSeed::clean(&pool).await.expect("clean seed fixtures");

        let verification = WorkshopSeed::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);
        let work_orders: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM work_order")
            .fetch_one(&pool)
            .await
            .expect("count work orders");
        assert_eq!(work_orders, 0);
    }
}
