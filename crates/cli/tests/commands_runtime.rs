use std::env;
use std::sync::{Mutex, OnceLock};

use riskgate_cli::commands::{config, doctor, issue_token, migrate, seed};
use riskgate_core::config::LoadOptions;
use riskgate_core::identity::hash_token;
use riskgate_db::connect_with_settings;
use riskgate_db::repositories::{DirectoryRepository, SqlDirectoryRepository};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("RISKGATE_DATABASE_URL", &database_url(&dir))], || {
        let result = migrate::run(LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("RISKGATE_DATABASE_URL", "postgres://localhost/riskgate")], || {
        let result = migrate::run(LoadOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn missing_explicit_config_file_is_a_config_failure() {
    with_env(&[], || {
        let result = migrate::run(LoadOptions {
            config_path: Some("does/not/exist.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        });
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_demo_acceptances_and_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("RISKGATE_DATABASE_URL", &database_url(&dir))], || {
        let first = seed::run(LoadOptions::default());
        assert_eq!(first.exit_code, 0, "expected first seed invocation success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");

        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains(
            "  - 00000000-0000-4000-8000-000000000501 [submitted] Legacy VPN exception"
        ));
        assert!(message.contains("approver@riskgate.local"));

        let second = seed::run(LoadOptions::default());
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        assert_eq!(first_payload["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn doctor_flags_pending_migrations_then_passes() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("RISKGATE_DATABASE_URL", &database_url(&dir))], || {
        let before = doctor::run(LoadOptions::default(), true);
        assert_eq!(before.exit_code, 6);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");
        let schema = report["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .find(|check| check["name"] == "database_schema")
            .expect("schema check")
            .clone();
        assert_eq!(schema["status"], "fail");

        assert_eq!(migrate::run(LoadOptions::default()).exit_code, 0);

        let after = doctor::run(LoadOptions::default(), true);
        assert_eq!(after.exit_code, 0, "{}", after.output);
        assert_eq!(parse_payload(&after.output)["overall_status"], "pass");
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("RISKGATE_LOG_LEVEL", "chatty")], || {
        let result = doctor::run(LoadOptions::default(), false);
        assert_eq!(result.exit_code, 6);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn issue_token_prints_a_token_that_authenticates() {
    let dir = TempDir::new().expect("tempdir");
    let url = database_url(&dir);
    with_env(&[("RISKGATE_DATABASE_URL", &url), ("RISKGATE_AUTH_TOKEN_TTL_DAYS", "7")], || {
        assert_eq!(seed::run(LoadOptions::default()).exit_code, 0);

        let result =
            issue_token::run(LoadOptions::default(), "Approver@riskgate.local", "laptop");
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        let raw = payload["data"]["token"].as_str().expect("raw token").to_string();
        assert_eq!(raw.len(), 64);
        assert!(payload["data"]["expires_at"].is_string());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let identity = runtime.block_on(async {
            let pool = connect_with_settings(&url, 1, 5).await.expect("connect");
            let identity = SqlDirectoryRepository::new(pool.clone())
                .find_identity_by_token_hash(&hash_token(&raw), chrono::Utc::now())
                .await
                .expect("lookup");
            pool.close().await;
            identity
        });
        assert_eq!(identity.expect("identity").email, "approver@riskgate.local");
    });
}

#[test]
fn issue_token_rejects_unknown_users() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("RISKGATE_DATABASE_URL", &database_url(&dir))], || {
        let result = issue_token::run(LoadOptions::default(), "nobody@riskgate.local", "cli");
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "unknown_user");
        assert!(payload.get("data").is_none());
    });
}

#[test]
fn config_attributes_env_sources_and_defaults() {
    with_env(&[("RISKGATE_SERVER_PORT", "9090"), ("RISKGATE_LOG_LEVEL", "debug")], || {
        let output = config::run(LoadOptions::default());

        assert!(output.contains("- server.port = 9090 (source: env (RISKGATE_SERVER_PORT))"));
        assert!(output.contains("- logging.level = debug (source: env (RISKGATE_LOG_LEVEL))"));
        assert!(output.contains("- approval.approver_groups = BI-UG-GVA (source: default)"));
    });
}

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("riskgate.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "RISKGATE_DATABASE_URL",
        "RISKGATE_DATABASE_MAX_CONNECTIONS",
        "RISKGATE_DATABASE_TIMEOUT_SECS",
        "RISKGATE_SERVER_BIND_ADDRESS",
        "RISKGATE_SERVER_PORT",
        "RISKGATE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "RISKGATE_AUTH_TOKEN_TTL_DAYS",
        "RISKGATE_APPROVAL_APPROVER_GROUPS",
        "RISKGATE_LOGGING_LEVEL",
        "RISKGATE_LOGGING_FORMAT",
        "RISKGATE_LOG_LEVEL",
        "RISKGATE_LOG_FORMAT",
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
