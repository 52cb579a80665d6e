use serde_json::json;

use crate::commands::{migrated_pool, open_workshop, prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("pending") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let workshop = open_workshop(&config, pool.clone())?;

        let pending = workshop
            .generation()
            .pending_generation()
            .await
            .map_err(|error| ("gateway", error.to_string(), 9u8));

        pool.close().await;
        pending
    });

    match result {
        Ok(pending) => {
            let ids: Vec<&str> = pending.iter().map(|id| id.0.as_str()).collect();
            let message = if ids.is_empty() {
                "no approved quotations are waiting for generation".to_string()
            } else {
                format!("{} approved quotation(s) waiting for generation", ids.len())
            };
            CommandResult::success_with("pending", message, Some(json!({ "quotations": ids })))
        }
        Err(failure) => CommandResult::from_failure("pending", failure),
    }
}
