use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of embedded migrations not yet applied to `pool`.
pub async fn pending_count(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied: Vec<i64> = if tracked == 0 {
        Vec::new()
    } else {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
    };

    Ok(MIGRATOR
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .filter(|migration| !applied.contains(&migration.version))
        .count())
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{pending_count, run_pending};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "folder",
        "app_user",
        "user_group",
        "user_group_member",
        "api_token",
        "project",
        "risk_matrix",
        "threat",
        "risk_assessment",
        "risk_scenario",
        "risk_acceptance",
        "risk_acceptance_scenario",
        "audit_event",
        "idx_folder_parent_id",
        "idx_user_group_member_user_id",
        "idx_api_token_user_id",
        "idx_project_folder_id",
        "idx_risk_assessment_project_id",
        "idx_risk_scenario_assessment_id",
        "idx_risk_acceptance_folder_id",
        "idx_risk_acceptance_state",
        "idx_risk_acceptance_created_at",
        "idx_risk_acceptance_scenario_scenario_id",
        "idx_audit_event_object_id",
        "idx_audit_event_occurred_at",
    ];

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let signature = managed_schema_signature(&pool).await;
        assert_eq!(signature.len(), MANAGED_SCHEMA_OBJECTS.len());
    }

    #[tokio::test]
    async fn baseline_seeds_global_folder_and_builtin_groups() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let global_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM folder WHERE name = 'Global' AND parent_id IS NULL AND builtin = 1",
        )
        .fetch_one(&pool)
        .await
        .expect("count global folder");
        assert_eq!(global_count, 1);

        let groups: Vec<String> =
            sqlx::query_scalar("SELECT name FROM user_group WHERE builtin = 1 ORDER BY name")
                .fetch_all(&pool)
                .await
                .expect("load builtin groups");
        assert_eq!(groups, vec!["BI-UG-ADM", "BI-UG-GAN", "BI-UG-GRE", "BI-UG-GVA"]);
    }

    #[tokio::test]
    async fn pending_count_drops_to_zero_after_migrating() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert_eq!(pending_count(&pool).await.expect("count before"), 1);

        run_pending(&pool).await.expect("run migrations");
        assert_eq!(pending_count(&pool).await.expect("count after"), 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
