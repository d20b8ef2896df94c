use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::thresholds::{AnalyticsThresholds, RepeatWindow};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub analytics: AnalyticsThresholds,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub server_port: Option<u16>,
    pub repeat_window: Option<RepeatWindow>,
    pub trend_months: Option<u32>,
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
                url: "sqlite://claimlens.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            analytics: AnalyticsThresholds::default(),
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("claimlens.toml"));
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

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(analytics) = patch.analytics {
            let thresholds = &mut self.analytics;
            if let Some(value) = analytics.amount_band_ratio {
                thresholds.amount_band_ratio = value;
            }
            if let Some(value) = analytics.similar_claims_limit {
                thresholds.similar_claims_limit = value;
            }
            if let Some(value) = analytics.employee_history_limit {
                thresholds.employee_history_limit = value;
            }
            if let Some(value) = analytics.amount_deviation_pct {
                thresholds.amount_deviation_pct = value;
            }
            if let Some(value) = analytics.category_approval_floor_pct {
                thresholds.category_approval_floor_pct = value;
            }
            if let Some(value) = analytics.reliable_approval_pct {
                thresholds.reliable_approval_pct = value;
            }
            if let Some(value) = analytics.caution_approval_pct {
                thresholds.caution_approval_pct = value;
            }
            if let Some(value) = analytics.repeat_window {
                thresholds.repeat_window = value;
            }
            if let Some(value) = analytics.repeat_window_size {
                thresholds.repeat_window_size = value;
            }
            if let Some(value) = analytics.repeat_min_matches {
                thresholds.repeat_min_matches = value;
            }
            if let Some(value) = analytics.top_categories_limit {
                thresholds.top_categories_limit = value;
            }
            if let Some(value) = analytics.recent_activity_limit {
                thresholds.recent_activity_limit = value;
            }
            if let Some(value) = analytics.estimated_budget_multiplier {
                thresholds.estimated_budget_multiplier = value;
            }
            if let Some(value) = analytics.trend_months {
                thresholds.trend_months = value;
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
        if let Some(value) = read_env("CLAIMLENS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CLAIMLENS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("CLAIMLENS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("CLAIMLENS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CLAIMLENS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CLAIMLENS_SERVER_PORT") {
            self.server.port = parse_env("CLAIMLENS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("CLAIMLENS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let thresholds = &mut self.analytics;
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_AMOUNT_BAND_RATIO") {
            thresholds.amount_band_ratio =
                parse_env::<Decimal>("CLAIMLENS_ANALYTICS_AMOUNT_BAND_RATIO", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_SIMILAR_CLAIMS_LIMIT") {
            thresholds.similar_claims_limit =
                parse_env("CLAIMLENS_ANALYTICS_SIMILAR_CLAIMS_LIMIT", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_EMPLOYEE_HISTORY_LIMIT") {
            thresholds.employee_history_limit =
                parse_env("CLAIMLENS_ANALYTICS_EMPLOYEE_HISTORY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_AMOUNT_DEVIATION_PCT") {
            thresholds.amount_deviation_pct =
                parse_env("CLAIMLENS_ANALYTICS_AMOUNT_DEVIATION_PCT", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_CATEGORY_APPROVAL_FLOOR_PCT") {
            thresholds.category_approval_floor_pct =
                parse_env("CLAIMLENS_ANALYTICS_CATEGORY_APPROVAL_FLOOR_PCT", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_RELIABLE_APPROVAL_PCT") {
            thresholds.reliable_approval_pct =
                parse_env("CLAIMLENS_ANALYTICS_RELIABLE_APPROVAL_PCT", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_CAUTION_APPROVAL_PCT") {
            thresholds.caution_approval_pct =
                parse_env("CLAIMLENS_ANALYTICS_CAUTION_APPROVAL_PCT", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_REPEAT_WINDOW") {
            thresholds.repeat_window = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "CLAIMLENS_ANALYTICS_REPEAT_WINDOW".to_string(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_TREND_MONTHS") {
            thresholds.trend_months = parse_env("CLAIMLENS_ANALYTICS_TREND_MONTHS", &value)?;
        }
        if let Some(value) = read_env("CLAIMLENS_ANALYTICS_ESTIMATED_BUDGET_MULTIPLIER") {
            thresholds.estimated_budget_multiplier =
                parse_env::<Decimal>("CLAIMLENS_ANALYTICS_ESTIMATED_BUDGET_MULTIPLIER", &value)?;
        }

        let log_level =
            read_env("CLAIMLENS_LOGGING_LEVEL").or_else(|| read_env("CLAIMLENS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLAIMLENS_LOGGING_FORMAT").or_else(|| read_env("CLAIMLENS_LOG_FORMAT"));
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
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(repeat_window) = overrides.repeat_window {
            self.analytics.repeat_window = repeat_window;
        }
        if let Some(trend_months) = overrides.trend_months {
            self.analytics.trend_months = trend_months;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        self.analytics.check().map_err(ConfigError::Validation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    default_config_paths().into_iter().find(|path| path.exists())
}

pub fn default_config_paths() -> [PathBuf; 2] {
    [PathBuf::from("claimlens.toml"), PathBuf::from("config/claimlens.toml")]
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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
    server: Option<ServerPatch>,
    analytics: Option<AnalyticsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyticsPatch {
    amount_band_ratio: Option<Decimal>,
    similar_claims_limit: Option<usize>,
    employee_history_limit: Option<usize>,
    amount_deviation_pct: Option<f64>,
    category_approval_floor_pct: Option<f64>,
    reliable_approval_pct: Option<f64>,
    caution_approval_pct: Option<f64>,
    repeat_window: Option<RepeatWindow>,
    repeat_window_size: Option<usize>,
    repeat_min_matches: Option<usize>,
    top_categories_limit: Option<usize>,
    recent_activity_limit: Option<usize>,
    estimated_budget_multiplier: Option<Decimal>,
    trend_months: Option<u32>,
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

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use crate::analytics::thresholds::RepeatWindow;

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
    fn defaults_load_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.database.url == "sqlite://claimlens.db", "default database url")?;
        ensure(config.analytics.similar_claims_limit == 10, "default similar claims cap")?;
        ensure(
            config.analytics.repeat_window == RepeatWindow::IncludingCurrent,
            "default repeat window includes the current claim",
        )?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "default format is compact")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CLAIMLENS_DB", "sqlite://interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("claimlens.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_CLAIMLENS_DB}"

[analytics]
amount_band_ratio = "0.25"
repeat_window = "before_current"
trend_months = 12
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://interpolated.db",
                "database url should be interpolated from environment",
            )?;
            ensure(
                config.analytics.amount_band_ratio == Decimal::new(25, 2),
                "amount band ratio should come from the file",
            )?;
            ensure(
                config.analytics.repeat_window == RepeatWindow::BeforeCurrent,
                "repeat window should come from the file",
            )?;
            ensure(config.analytics.trend_months == 12, "trend months should come from the file")
        })();

        clear_vars(&["TEST_CLAIMLENS_DB"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLAIMLENS_LOG_LEVEL", "warn");
        env::set_var("CLAIMLENS_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["CLAIMLENS_LOG_LEVEL", "CLAIMLENS_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLAIMLENS_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CLAIMLENS_ANALYTICS_TREND_MONTHS", "9");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("claimlens.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[analytics]
trend_months = 3
similar_claims_limit = 8

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
            ensure(config.analytics.trend_months == 9, "env trend months should win over file")?;
            ensure(
                config.analytics.similar_claims_limit == 8,
                "file value should win over default",
            )
        })();

        clear_vars(&["CLAIMLENS_DATABASE_URL", "CLAIMLENS_ANALYTICS_TREND_MONTHS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLAIMLENS_ANALYTICS_CAUTION_APPROVAL_PCT", "95");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("analytics.caution_approval_pct")
            );
            ensure(has_message, "validation failure should name the offending threshold")
        })();

        clear_vars(&["CLAIMLENS_ANALYTICS_CAUTION_APPROVAL_PCT"]);
        result
    }

    #[test]
    fn malformed_env_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLAIMLENS_ANALYTICS_REPEAT_WINDOW", "sometimes");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "CLAIMLENS_ANALYTICS_REPEAT_WINDOW",
                "error should name the env key",
            ),
            Ok(_) => Err("expected invalid override error".to_string()),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["CLAIMLENS_ANALYTICS_REPEAT_WINDOW"]);
        result
    }

    #[test]
    fn required_file_missing_is_an_error() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some("does/not/exist.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("missing file should fail");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }
}
