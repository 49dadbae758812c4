use chrono::{Duration, Utc};
use riskgate_core::config::LoadOptions;
use riskgate_core::domain::directory::{ApiToken, ApiTokenId};
use riskgate_core::identity::{generate_token, hash_token};
use riskgate_db::repositories::{DirectoryRepository, SqlDirectoryRepository};
use secrecy::ExposeSecret;
use serde_json::json;

use crate::commands::{exit, load_config, migrated_pool, runtime, CommandResult, StepError};

pub fn run(options: LoadOptions, email: &str, label: &str) -> CommandResult {
    let config = match load_config("issue-token", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("issue-token") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let directory = SqlDirectoryRepository::new(pool.clone());

        let user = directory
            .find_user_by_email(email)
            .await
            .map_err(|error| ("db_query", error.to_string(), exit::DB_CONNECTIVITY))?
            .ok_or_else(|| {
                ("unknown_user", format!("no user with email `{email}`"), exit::NOT_FOUND)
            })?;
        if !user.is_active {
            return Err((
                "inactive_user",
                format!("user `{}` is inactive", user.email),
                exit::NOT_FOUND,
            ));
        }

        let raw = generate_token();
        let now = Utc::now();
        let token = ApiToken {
            id: ApiTokenId::new(),
            user_id: user.id,
            token_hash: hash_token(raw.expose_secret()),
            label: label.trim().to_string(),
            created_at: now,
            expires_at: match config.auth.token_ttl_days {
                0 => None,
                days => Some(now + Duration::days(i64::from(days))),
            },
        };
        directory
            .save_token(token.clone())
            .await
            .map_err(|error| ("db_write", error.to_string(), exit::DB_CONNECTIVITY))?;

        pool.close().await;
        Ok::<_, StepError>((user.email, token, raw))
    });

    match result {
        Ok((email, token, raw)) => CommandResult::success_with(
            "issue-token",
            format!("issued token `{}` for {email}; it is shown only once", token.label),
            Some(json!({
                "token": raw.expose_secret(),
                "token_id": token.id.to_string(),
                "expires_at": token.expires_at.map(|at| at.to_rfc3339()),
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("issue-token", error_class, message, exit_code)
        }
    }
}
