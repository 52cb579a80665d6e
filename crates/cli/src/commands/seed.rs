use crate::commands::{migrated_pool, prepare, CommandResult, StepFailure};
use workshop_db::WorkshopSeed;

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;

        let seed_result = WorkshopSeed::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = WorkshopSeed::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedOutput, StepFailure> = if !verification.all_present {
            Err(("seed_verification", verification_failure_message(&verification.checks), 6u8))
        } else {
            Ok(SeedOutput {
                appointments: seed_result.appointments,
                work_orders: seed_result.work_orders,
            })
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let message = format!(
                "demo workshop dataset loaded:\n  - appointments: {}\n  - work orders: {}",
                output.appointments.join(", "),
                output.work_orders.join(", ")
            );
            CommandResult::success("seed", message)
        }
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

struct SeedOutput {
    appointments: Vec<&'static str>,
    work_orders: Vec<&'static str>,
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();

    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
