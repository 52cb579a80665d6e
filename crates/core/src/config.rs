use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::ReadRetry;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub workflow: WorkflowConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub call_timeout_ms: u64,
    pub read_retries: u32,
    pub retry_backoff_ms: u64,
}

impl GatewayConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn read_retry(&self) -> ReadRetry {
        ReadRetry {
            retries: self.read_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Largest accepted difference between expected and stored cost after a merge.
    pub cost_tolerance: Decimal,
    pub work_order_prefix: String,
}

#[derive(Clone, Debug)]
pub struct NotificationsConfig {
    pub webhook_url: Option<String>,
    pub webhook_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub work_order_prefix: Option<String>,
    pub webhook_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://workshop.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gateway: GatewayConfig {
                call_timeout_ms: 5_000,
                read_retries: 2,
                retry_backoff_ms: 100,
            },
            workflow: WorkflowConfig {
                cost_tolerance: Decimal::new(1, 2),
                work_order_prefix: "WO".to_string(),
            },
            notifications: NotificationsConfig {
                webhook_url: None,
                webhook_token: None,
                timeout_secs: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("workshop.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(call_timeout_ms) = gateway.call_timeout_ms {
                self.gateway.call_timeout_ms = call_timeout_ms;
            }
            if let Some(read_retries) = gateway.read_retries {
                self.gateway.read_retries = read_retries;
            }
            if let Some(retry_backoff_ms) = gateway.retry_backoff_ms {
                self.gateway.retry_backoff_ms = retry_backoff_ms;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(cost_tolerance) = workflow.cost_tolerance {
                self.workflow.cost_tolerance = cost_tolerance;
            }
            if let Some(work_order_prefix) = workflow.work_order_prefix {
                self.workflow.work_order_prefix = work_order_prefix;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(webhook_url) = notifications.webhook_url {
                self.notifications.webhook_url = Some(webhook_url);
            }
            if let Some(webhook_token) = notifications.webhook_token {
                self.notifications.webhook_token = Some(webhook_token.into());
            }
            if let Some(timeout_secs) = notifications.timeout_secs {
                self.notifications.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("WORKSHOP_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("WORKSHOP_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("WORKSHOP_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("WORKSHOP_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("WORKSHOP_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WORKSHOP_GATEWAY_CALL_TIMEOUT_MS") {
            self.gateway.call_timeout_ms = parse_env("WORKSHOP_GATEWAY_CALL_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("WORKSHOP_GATEWAY_READ_RETRIES") {
            self.gateway.read_retries = parse_env("WORKSHOP_GATEWAY_READ_RETRIES", &value)?;
        }
        if let Some(value) = read_env("WORKSHOP_GATEWAY_RETRY_BACKOFF_MS") {
            self.gateway.retry_backoff_ms =
                parse_env("WORKSHOP_GATEWAY_RETRY_BACKOFF_MS", &value)?;
        }

        if let Some(value) = read_env("WORKSHOP_WORKFLOW_COST_TOLERANCE") {
            self.workflow.cost_tolerance = parse_env("WORKSHOP_WORKFLOW_COST_TOLERANCE", &value)?;
        }
        if let Some(value) = read_env("WORKSHOP_WORKFLOW_WORK_ORDER_PREFIX") {
            self.workflow.work_order_prefix = value;
        }

        if let Some(value) = read_env("WORKSHOP_NOTIFICATIONS_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(value);
        }
        if let Some(value) = read_env("WORKSHOP_NOTIFICATIONS_WEBHOOK_TOKEN") {
            self.notifications.webhook_token = Some(value.into());
        }
        if let Some(value) = read_env("WORKSHOP_NOTIFICATIONS_TIMEOUT_SECS") {
            self.notifications.timeout_secs =
                parse_env("WORKSHOP_NOTIFICATIONS_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("WORKSHOP_LOGGING_LEVEL").or_else(|| read_env("WORKSHOP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WORKSHOP_LOGGING_FORMAT").or_else(|| read_env("WORKSHOP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(work_order_prefix) = overrides.work_order_prefix {
            self.workflow.work_order_prefix = work_order_prefix;
        }
        if let Some(webhook_url) = overrides.webhook_url {
            self.notifications.webhook_url = Some(webhook_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_gateway(&self.gateway)?;
        validate_workflow(&self.workflow)?;
        validate_notifications(&self.notifications)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("workshop.toml"), PathBuf::from("config/workshop.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.call_timeout_ms == 0 || gateway.call_timeout_ms > 120_000 {
        return Err(ConfigError::Validation(
            "gateway.call_timeout_ms must be in range 1..=120000".to_string(),
        ));
    }
    if gateway.read_retries > 10 {
        return Err(ConfigError::Validation(
            "gateway.read_retries must be at most 10".to_string(),
        ));
    }
    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.cost_tolerance.is_sign_negative() {
        return Err(ConfigError::Validation(
            "workflow.cost_tolerance must not be negative".to_string(),
        ));
    }

    let prefix = workflow.work_order_prefix.trim();
    if prefix.is_empty() || !prefix.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation(
            "workflow.work_order_prefix must be a non-empty alphanumeric string".to_string(),
        ));
    }
    Ok(())
}

fn validate_notifications(notifications: &NotificationsConfig) -> Result<(), ConfigError> {
    if let Some(url) = &notifications.webhook_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "notifications.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }

    let blank_token = notifications
        .webhook_token
        .as_ref()
        .map(|token| token.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if blank_token {
        return Err(ConfigError::Validation(
            "notifications.webhook_token must not be blank when set".to_string(),
        ));
    }

    if notifications.timeout_secs == 0 || notifications.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "notifications.timeout_secs must be in range 1..=120".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    workflow: Option<WorkflowPatch>,
    notifications: Option<NotificationsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    call_timeout_ms: Option<u64>,
    read_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    cost_tolerance: Option<Decimal>,
    work_order_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    webhook_url: Option<String>,
    webhook_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.workflow.cost_tolerance == Decimal::new(1, 2), "tolerance defaults to 0.01")?;
        ensure(config.workflow.work_order_prefix == "WO", "prefix defaults to WO")?;
        ensure(
            config.gateway.read_retry().backoff == Duration::from_millis(100),
            "read retry backoff comes from gateway.retry_backoff_ms",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WEBHOOK_TOKEN", "tok-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("workshop.toml");
            fs::write(
                &path,
                r#"
[notifications]
webhook_url = "https://hooks.example.test/workshop"
webhook_token = "${TEST_WEBHOOK_TOKEN}"

[workflow]
cost_tolerance = "0.05"
work_order_prefix = "OT"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config
                .notifications
                .webhook_token
                .as_ref()
                .map(|token| token.expose_secret().to_string());
            ensure(token.as_deref() == Some("tok-from-env"), "token should come from environment")?;
            ensure(config.workflow.cost_tolerance == Decimal::new(5, 2), "tolerance from file")?;
            ensure(config.workflow.work_order_prefix == "OT", "prefix from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_WEBHOOK_TOKEN"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("workshop.toml");
        fs::write(&path, "[database]\nurl = \"${WORKSHOP_TEST_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
            Err(ConfigError::MissingEnvInterpolation { var }) => {
                ensure(var == "WORKSHOP_TEST_UNSET_VAR", "error should name the variable")
            }
            other => Err(format!("expected interpolation failure, got {other:?}")),
        }
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WORKSHOP_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("WORKSHOP_GATEWAY_READ_RETRIES", "4");
        env::set_var("WORKSHOP_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("workshop.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[gateway]
read_retries = 1
call_timeout_ms = 2500

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.gateway.read_retries == 4, "env read retries should win over file")?;
            ensure(config.gateway.call_timeout_ms == 2500, "file timeout should win over default")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "env alias sets log format")?;
            Ok(())
        })();

        clear_vars(&[
            "WORKSHOP_DATABASE_URL",
            "WORKSHOP_GATEWAY_READ_RETRIES",
            "WORKSHOP_LOG_FORMAT",
        ]);
        result
    }

    #[test]
    fn invalid_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WORKSHOP_WORKFLOW_COST_TOLERANCE", "a lot");
        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "WORKSHOP_WORKFLOW_COST_TOLERANCE", "error should name the key")
            }
            other => Err(format!("expected invalid override, got {other:?}")),
        };

        clear_vars(&["WORKSHOP_WORKFLOW_COST_TOLERANCE"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WORKSHOP_NOTIFICATIONS_WEBHOOK_URL", "ftp://hooks.example.test");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("notifications.webhook_url")
            );
            ensure(has_message, "validation failure should mention notifications.webhook_url")
        })();

        clear_vars(&["WORKSHOP_NOTIFICATIONS_WEBHOOK_URL"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("WORKSHOP_NOTIFICATIONS_WEBHOOK_TOKEN", "tok-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("tok-secret-value"),
                "debug output should not contain the webhook token",
            )
        })();

        clear_vars(&["WORKSHOP_NOTIFICATIONS_WEBHOOK_TOKEN"]);
        result
    }
}
