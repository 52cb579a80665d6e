use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;

use workshop_core::config::{AppConfig, LoadOptions};

/// One rendered configuration field and the environment keys that can set it.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let notifications = &config.notifications;
    let webhook_token = notifications
        .webhook_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field::new("database.url", &config.database.url, &["WORKSHOP_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["WORKSHOP_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["WORKSHOP_DATABASE_TIMEOUT_SECS"],
        ),
        Field::new(
            "gateway.call_timeout_ms",
            config.gateway.call_timeout_ms.to_string(),
            &["WORKSHOP_GATEWAY_CALL_TIMEOUT_MS"],
        ),
        Field::new(
            "gateway.read_retries",
            config.gateway.read_retries.to_string(),
            &["WORKSHOP_GATEWAY_READ_RETRIES"],
        ),
        Field::new(
            "gateway.retry_backoff_ms",
            config.gateway.retry_backoff_ms.to_string(),
            &["WORKSHOP_GATEWAY_RETRY_BACKOFF_MS"],
        ),
        Field::new(
            "workflow.cost_tolerance",
            config.workflow.cost_tolerance.to_string(),
            &["WORKSHOP_WORKFLOW_COST_TOLERANCE"],
        ),
        Field::new(
            "workflow.work_order_prefix",
            &config.workflow.work_order_prefix,
            &["WORKSHOP_WORKFLOW_WORK_ORDER_PREFIX"],
        ),
        Field::new(
            "notifications.webhook_url",
            notifications.webhook_url.as_deref().unwrap_or("<unset>"),
            &["WORKSHOP_NOTIFICATIONS_WEBHOOK_URL"],
        ),
        Field::new(
            "notifications.webhook_token",
            webhook_token,
            &["WORKSHOP_NOTIFICATIONS_WEBHOOK_TOKEN"],
        ),
        Field::new(
            "notifications.timeout_secs",
            notifications.timeout_secs.to_string(),
            &["WORKSHOP_NOTIFICATIONS_TIMEOUT_SECS"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["WORKSHOP_LOGGING_LEVEL", "WORKSHOP_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["WORKSHOP_LOGGING_FORMAT", "WORKSHOP_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["workshop.toml", "config/workshop.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let visible: String = trimmed.chars().take(4).collect();
    if trimmed.chars().count() > 8 {
        format!("{visible}***")
    } else {
        "<redacted>".to_string()
    }
}
