use serde::Serialize;

use workshop_core::config::{AppConfig, LoadOptions};
use workshop_db::{connect_with_settings, migrations};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_notification_channel(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "notification_channel",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            for name in ["database_connectivity", "schema_version"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_notification_channel(config: &AppConfig) -> DoctorCheck {
    let notifications = &config.notifications;
    let details = match (&notifications.webhook_url, &notifications.webhook_token) {
        (Some(url), Some(_)) => format!("webhook `{url}` with bearer token"),
        (Some(url), None) => format!("webhook `{url}` without authentication"),
        (None, _) => "no webhook configured; notifications are logged only".to_string(),
    };

    match crate::notifier::dispatcher(notifications) {
        Ok(_) => DoctorCheck { name: "notification_channel", status: CheckStatus::Pass, details },
        Err(error) => DoctorCheck {
            name: "notification_channel",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_database(config: &AppConfig) -> [DoctorCheck; 2] {
    let skipped_schema = |details: &str| DoctorCheck {
        name: "schema_version",
        status: CheckStatus::Skipped,
        details: details.to_string(),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return [
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                skipped_schema("skipped because the async runtime did not start"),
            ];
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let status = migrations::schema_status(&pool).await;
        pool.close().await;
        Ok::<_, String>(status)
    });

    match result {
        Ok(status) => {
            let connectivity = DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            };
            let schema = match status {
                Ok(status) if status.is_current() => DoctorCheck {
                    name: "schema_version",
                    status: CheckStatus::Pass,
                    details: format!("{} of {} migrations applied", status.applied, status.known),
                },
                Ok(status) => DoctorCheck {
                    name: "schema_version",
                    status: CheckStatus::Fail,
                    details: format!(
                        "{} of {} migrations applied; run `workshop migrate`",
                        status.applied, status.known
                    ),
                },
                Err(error) => DoctorCheck {
                    name: "schema_version",
                    status: CheckStatus::Fail,
                    details: format!("failed to read migration history: {error}"),
                },
            };
            [connectivity, schema]
        }
        Err(error) => [
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: error,
            },
            skipped_schema("skipped because the database is unreachable"),
        ],
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn human_report_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks: vec![
                DoctorCheck {
                    name: "config_validation",
                    status: CheckStatus::Pass,
                    details: "configuration loaded and validated".to_string(),
                },
                DoctorCheck {
                    name: "schema_version",
                    status: CheckStatus::Fail,
                    details: "0 of 1 migrations applied; run `workshop migrate`".to_string(),
                },
            ],
        };

        let rendered = render_human(&report);
        assert!(rendered.starts_with("doctor: one or more readiness checks failed"));
        assert!(rendered.contains("- [ok] config_validation"));
        assert!(rendered.contains("- [fail] schema_version: 0 of 1 migrations applied"));
    }
}
