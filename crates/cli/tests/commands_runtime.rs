use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use workshop_cli::commands::generate::GenerateArgs;
use workshop_cli::commands::{config, doctor, generate, migrate, pending, seed};

#[test]
fn migrate_returns_success_with_in_memory_database() {
    with_env(&[("WORKSHOP_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("WORKSHOP_DATABASE_URL", "postgres://localhost/workshop")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_demo_records() {
    with_env(&[("WORKSHOP_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("  - appointments: AP-100, AP-200"));
        assert!(message.contains("  - work orders: WO-00042, WO-00043"));
    });
}

#[test]
fn seed_is_idempotent_against_a_file_database() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = sqlite_file_url(&dir.path().join("workshop.db"));

    with_env(&[("WORKSHOP_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        assert_eq!(
            parse_payload(&first.output)["message"],
            parse_payload(&second.output)["message"]
        );
    });
}

#[test]
fn pending_is_empty_for_the_demo_dataset() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = sqlite_file_url(&dir.path().join("workshop.db"));

    with_env(&[("WORKSHOP_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = pending::run();
        assert_eq!(result.exit_code, 0, "expected pending listing success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "pending");
        assert_eq!(payload["data"]["quotations"], Value::Array(Vec::new()));
    });
}

#[test]
fn generate_reports_unknown_quotation_as_conflict() {
    with_env(&[("WORKSHOP_DATABASE_URL", "sqlite::memory:")], || {
        let result = generate::run(GenerateArgs {
            quotation: "q-missing".to_string(),
            advisor: "advisor-1".to_string(),
            mechanic: None,
            odometer: None,
            estimated_date: None,
            duration: None,
            generated_by: None,
        });
        assert_eq!(result.exit_code, 8, "expected conflict exit code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "generate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "conflict");
        assert!(payload["message"].as_str().unwrap_or_default().contains("q-missing"));
    });
}

#[test]
fn doctor_flags_unmigrated_schema() {
    with_env(&[("WORKSHOP_DATABASE_URL", "sqlite::memory:")], || {
        let report: Value =
            serde_json::from_str(&doctor::run(true)).expect("doctor output should be JSON");
        assert_eq!(report["overall_status"], "fail");

        let checks = report["checks"].as_array().cloned().unwrap_or_default();
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("notification_channel"), "pass");
        assert_eq!(status_of("database_connectivity"), "pass");
        assert_eq!(status_of("schema_version"), "fail");
    });
}

#[test]
fn config_reports_env_sources() {
    with_env(&[("WORKSHOP_WORKFLOW_WORK_ORDER_PREFIX", "OT")], || {
        let output = config::run();
        assert!(output.starts_with("effective config"));
        assert!(output.contains(
            "- workflow.work_order_prefix = OT (source: env (WORKSHOP_WORKFLOW_WORK_ORDER_PREFIX))"
        ));
        assert!(output.contains("- notifications.webhook_token = <unset>"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn sqlite_file_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "WORKSHOP_DATABASE_URL",
        "WORKSHOP_DATABASE_MAX_CONNECTIONS",
        "WORKSHOP_DATABASE_TIMEOUT_SECS",
        "WORKSHOP_GATEWAY_CALL_TIMEOUT_MS",
        "WORKSHOP_GATEWAY_READ_RETRIES",
        "WORKSHOP_GATEWAY_RETRY_BACKOFF_MS",
        "WORKSHOP_WORKFLOW_COST_TOLERANCE",
        "WORKSHOP_WORKFLOW_WORK_ORDER_PREFIX",
        "WORKSHOP_NOTIFICATIONS_WEBHOOK_URL",
        "WORKSHOP_NOTIFICATIONS_WEBHOOK_TOKEN",
        "WORKSHOP_NOTIFICATIONS_TIMEOUT_SECS",
        "WORKSHOP_LOGGING_LEVEL",
        "WORKSHOP_LOGGING_FORMAT",
        "WORKSHOP_LOG_LEVEL",
        "WORKSHOP_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
