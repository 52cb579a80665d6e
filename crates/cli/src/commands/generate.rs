use chrono::NaiveDate;
use clap::Args;
use serde_json::json;

use workshop_core::{ErrorClass, GenerateWorkOrder, QuotationId, WorkflowError};

use crate::commands::{migrated_pool, open_workshop, prepare, CommandResult, StepFailure};

#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    #[arg(long, help = "Approved quotation to generate")]
    pub quotation: String,
    #[arg(long, help = "Service advisor opening or updating the work order")]
    pub advisor: String,
    #[arg(long, help = "Mechanic to assign")]
    pub mechanic: Option<String>,
    #[arg(long, help = "Odometer reading at reception")]
    pub odometer: Option<u32>,
    #[arg(long, help = "Estimated completion date (YYYY-MM-DD)")]
    pub estimated_date: Option<NaiveDate>,
    #[arg(long, help = "Estimated labour duration, e.g. 9, 9:30 or 09:30:00")]
    pub duration: Option<String>,
    #[arg(long, help = "Operator recorded as the author; defaults to the advisor")]
    pub generated_by: Option<String>,
}

impl GenerateArgs {
    fn into_request(self) -> GenerateWorkOrder {
        GenerateWorkOrder {
            quotation_id: QuotationId(self.quotation),
            generated_by: self.generated_by.unwrap_or_else(|| self.advisor.clone()),
            advisor_id: self.advisor,
            mechanic_id: self.mechanic,
            odometer: self.odometer,
            estimated_date: self.estimated_date,
            estimated_duration: self.duration,
        }
    }
}

pub fn run(args: GenerateArgs) -> CommandResult {
    let (config, runtime) = match prepare("generate") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let workshop = open_workshop(&config, pool.clone())?;

        let generated =
            workshop.generation().generate(args.into_request()).await.map_err(workflow_failure);

        pool.close().await;
        generated
    });

    match result {
        Ok(generated) => {
            let message = if generated.warnings.is_empty() {
                format!("work order {} is up to date", generated.work_order_number)
            } else {
                format!(
                    "work order {} generated with {} warning(s)",
                    generated.work_order_number,
                    generated.warnings.len()
                )
            };
            let data = serde_json::to_value(&generated)
                .unwrap_or_else(|error| json!({ "serialization_error": error.to_string() }));
            CommandResult::success_with("generate", message, Some(data))
        }
        Err(failure) => CommandResult::from_failure("generate", failure),
    }
}

fn workflow_failure(error: WorkflowError) -> StepFailure {
    let (error_class, exit_code) = match error.class() {
        ErrorClass::Validation => ("validation", 7u8),
        ErrorClass::Conflict => ("conflict", 8u8),
        ErrorClass::Rejected => ("rejected", 8u8),
        ErrorClass::Transport => ("transport", 9u8),
    };
    (error_class, error.to_string(), exit_code)
}

#[cfg(test)]
mod tests {
    use workshop_core::domain::quotation::{QuotationId, QuotationStatus};
    use workshop_core::errors::DomainError;
    use workshop_core::WorkflowError;

    use super::{workflow_failure, GenerateArgs};

    #[test]
    fn generated_by_defaults_to_the_advisor() {
        let args = GenerateArgs {
            quotation: "q-1".to_string(),
            advisor: "advisor-7".to_string(),
            mechanic: None,
            odometer: Some(12_000),
            estimated_date: None,
            duration: Some("2:15".to_string()),
            generated_by: None,
        };

        let request = args.into_request();
        assert_eq!(request.generated_by, "advisor-7");
        assert_eq!(request.advisor_id, "advisor-7");
        assert_eq!(request.estimated_duration.as_deref(), Some("2:15"));
    }

    #[test]
    fn workflow_errors_map_to_error_classes_and_exit_codes() {
        let (class, _, code) = workflow_failure(WorkflowError::Domain(DomainError::InvalidDuration {
            raw: "25:00".to_string(),
        }));
        assert_eq!((class, code), ("validation", 7));

        let (class, message, code) = workflow_failure(WorkflowError::NotApproved {
            quotation_id: QuotationId("q-1".to_string()),
            status: QuotationStatus::Pending,
        });
        assert_eq!((class, code), ("conflict", 8));
        assert!(message.contains("q-1"));
    }
}
