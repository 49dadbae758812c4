use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use riskgate_core::audit::{AuditEvent, AuditOutcome};
use riskgate_core::domain::folder::FolderId;

use super::{decode_id, decode_timestamp, AuditRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Writes an audit row on the caller's connection so it commits or rolls
/// back together with the change it describes.
pub(crate) async fn record_event(
    conn: &mut SqliteConnection,
    event: &AuditEvent,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO audit_event (id, occurred_at, correlation_id, actor, event_type, object_id,
                                  folder_id, outcome, payload_json)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.event_id)
    .bind(event.occurred_at.to_rfc3339())
    .bind(&event.correlation_id)
    .bind(&event.actor)
    .bind(&event.event_type)
    .bind(&event.object_id)
    .bind(event.folder_id.map(|id| id.to_string()))
    .bind(event.outcome.as_str())
    .bind(event.payload_json())
    .execute(conn)
    .await?;

    Ok(())
}

fn decode_outcome(raw: &str) -> Result<AuditOutcome, RepositoryError> {
    match raw {
        "success" => Ok(AuditOutcome::Success),
        "rejected" => Ok(AuditOutcome::Rejected),
        "failed" => Ok(AuditOutcome::Failed),
        other => Err(RepositoryError::Decode(format!("unknown audit outcome `{other}`"))),
    }
}

fn row_to_event(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let occurred_at: String = row.try_get("occurred_at")?;
    let folder_id: Option<String> = row.try_get("folder_id")?;
    let outcome: String = row.try_get("outcome")?;
    let payload_json: String = row.try_get("payload_json")?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&payload_json)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(AuditEvent {
        event_id: row.try_get("id")?,
        correlation_id: row.try_get("correlation_id")?,
        event_type: row.try_get("event_type")?,
        actor: row.try_get("actor")?,
        object_id: row.try_get("object_id")?,
        folder_id: folder_id
            .as_deref()
            .map(|raw| decode_id::<FolderId>("audit_event.folder_id", raw))
            .transpose()?,
        outcome: decode_outcome(&outcome)?,
        metadata,
        occurred_at: decode_timestamp("audit_event.occurred_at", &occurred_at)?,
    })
}

#[async_trait::async_trait]
impl AuditRepository for SqlAuditRepository {
    async fn list_for_object(&self, object_id: &str) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, occurred_at, correlation_id, actor, event_type, object_id, folder_id,
                    outcome, payload_json
             FROM audit_event WHERE object_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(object_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}
