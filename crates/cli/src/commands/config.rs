use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use toml::Value;

use claimlens_core::config::{default_config_paths, AppConfig, LoadOptions};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    command: &'static str,
    status: &'static str,
    precedence: &'static str,
    config_file: Option<String>,
    entries: Vec<ConfigEntry>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let entry = |key: &'static str, env_keys: &[&str], value: String| ConfigEntry {
        key,
        value,
        source: field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
    };

    let analytics = &config.analytics;
    let entries = vec![
        entry("database.url", &["CLAIMLENS_DATABASE_URL"], config.database.url.clone()),
        entry(
            "database.max_connections",
            &["CLAIMLENS_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        entry(
            "database.timeout_secs",
            &["CLAIMLENS_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        entry(
            "server.bind_address",
            &["CLAIMLENS_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        entry("server.port", &["CLAIMLENS_SERVER_PORT"], config.server.port.to_string()),
        entry(
            "server.graceful_shutdown_secs",
            &["CLAIMLENS_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        entry(
            "analytics.amount_band_ratio",
            &["CLAIMLENS_ANALYTICS_AMOUNT_BAND_RATIO"],
            analytics.amount_band_ratio.to_string(),
        ),
        entry(
            "analytics.similar_claims_limit",
            &["CLAIMLENS_ANALYTICS_SIMILAR_CLAIMS_LIMIT"],
            analytics.similar_claims_limit.to_string(),
        ),
        entry(
            "analytics.employee_history_limit",
            &["CLAIMLENS_ANALYTICS_EMPLOYEE_HISTORY_LIMIT"],
            analytics.employee_history_limit.to_string(),
        ),
        entry(
            "analytics.amount_deviation_pct",
            &["CLAIMLENS_ANALYTICS_AMOUNT_DEVIATION_PCT"],
            analytics.amount_deviation_pct.to_string(),
        ),
        entry(
            "analytics.category_approval_floor_pct",
            &["CLAIMLENS_ANALYTICS_CATEGORY_APPROVAL_FLOOR_PCT"],
            analytics.category_approval_floor_pct.to_string(),
        ),
        entry(
            "analytics.reliable_approval_pct",
            &["CLAIMLENS_ANALYTICS_RELIABLE_APPROVAL_PCT"],
            analytics.reliable_approval_pct.to_string(),
        ),
        entry(
            "analytics.caution_approval_pct",
            &["CLAIMLENS_ANALYTICS_CAUTION_APPROVAL_PCT"],
            analytics.caution_approval_pct.to_string(),
        ),
        entry(
            "analytics.repeat_window",
            &["CLAIMLENS_ANALYTICS_REPEAT_WINDOW"],
            format!("{:?}", analytics.repeat_window),
        ),
        entry("analytics.repeat_window_size", &[], analytics.repeat_window_size.to_string()),
        entry("analytics.repeat_min_matches", &[], analytics.repeat_min_matches.to_string()),
        entry("analytics.top_categories_limit", &[], analytics.top_categories_limit.to_string()),
        entry("analytics.recent_activity_limit", &[], analytics.recent_activity_limit.to_string()),
        entry(
            "analytics.estimated_budget_multiplier",
            &["CLAIMLENS_ANALYTICS_ESTIMATED_BUDGET_MULTIPLIER"],
            analytics.estimated_budget_multiplier.to_string(),
        ),
        entry(
            "analytics.trend_months",
            &["CLAIMLENS_ANALYTICS_TREND_MONTHS"],
            analytics.trend_months.to_string(),
        ),
        entry(
            "logging.level",
            &["CLAIMLENS_LOGGING_LEVEL", "CLAIMLENS_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        entry(
            "logging.format",
            &["CLAIMLENS_LOGGING_FORMAT", "CLAIMLENS_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ];

    let report = ConfigReport {
        command: "config",
        status: "ok",
        precedence: "env > file > default",
        config_file: config_file_path.map(|path| path.display().to_string()),
        entries,
    };
    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 6),
    }
}

fn detect_config_path() -> Option<PathBuf> {
    default_config_paths().into_iter().find(|path| path.exists())
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
