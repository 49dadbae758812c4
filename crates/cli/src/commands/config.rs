use std::env;
use std::fs;
use std::path::Path;

use riskgate_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

/// Settings shown by `riskgate config`, with the env keys that can set them.
const FIELDS: &[(&str, &[&str])] = &[
    ("database.url", &["RISKGATE_DATABASE_URL"]),
    ("database.max_connections", &["RISKGATE_DATABASE_MAX_CONNECTIONS"]),
    ("database.timeout_secs", &["RISKGATE_DATABASE_TIMEOUT_SECS"]),
    ("server.bind_address", &["RISKGATE_SERVER_BIND_ADDRESS"]),
    ("server.port", &["RISKGATE_SERVER_PORT"]),
    ("server.graceful_shutdown_secs", &["RISKGATE_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ("auth.token_ttl_days", &["RISKGATE_AUTH_TOKEN_TTL_DAYS"]),
    ("approval.approver_groups", &["RISKGATE_APPROVAL_APPROVER_GROUPS"]),
    ("logging.level", &["RISKGATE_LOGGING_LEVEL", "RISKGATE_LOG_LEVEL"]),
    ("logging.format", &["RISKGATE_LOGGING_FORMAT", "RISKGATE_LOG_FORMAT"]),
];

pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_keys) in FIELDS {
        lines.push(render_line(
            key_path,
            &display_value(&config, key_path),
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    }

    lines.join("\n")
}

fn display_value(config: &AppConfig, key_path: &str) -> String {
    match key_path {
        "database.url" => redact_url(&config.database.url),
        "database.max_connections" => config.database.max_connections.to_string(),
        "database.timeout_secs" => config.database.timeout_secs.to_string(),
        "server.bind_address" => config.server.bind_address.clone(),
        "server.port" => config.server.port.to_string(),
        "server.graceful_shutdown_secs" => config.server.graceful_shutdown_secs.to_string(),
        "auth.token_ttl_days" => match config.auth.token_ttl_days {
            0 => "0 (tokens never expire)".to_string(),
            days => days.to_string(),
        },
        "approval.approver_groups" => config.approval.approver_groups.join(", "),
        "logging.level" => config.logging.level.clone(),
        "logging.format" => format!("{:?}", config.logging.format),
        _ => "<unknown>".to_string(),
    }
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

/// Hides credentials embedded in a database URL (`user:password@`).
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((_, host)) => format!("{scheme}://<redacted>@{host}"),
        None => url.to_string(),
    }
}
