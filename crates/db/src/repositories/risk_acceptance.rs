use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use riskgate_core::audit::AuditEvent;
use riskgate_core::domain::directory::UserId;
use riskgate_core::domain::risk::RiskScenarioId;
use riskgate_core::domain::risk_acceptance::{AcceptanceState, RiskAcceptance, RiskAcceptanceId};

use super::audit::record_event;
use super::{
    decode_date, decode_id, decode_timestamp, encode_date, AcceptanceFilter, RepositoryError,
    RiskAcceptanceRepository,
};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT id, name, description, expiry_date, accepted_date,
        rejected_date, revoked_date, justification, state, folder_id, approver_id,
        created_at, updated_at
     FROM risk_acceptance";

pub struct SqlRiskAcceptanceRepository {
    pool: DbPool,
}

impl SqlRiskAcceptanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn scenario_links(
        &self,
        ids: &[RiskAcceptanceId],
    ) -> Result<HashMap<RiskAcceptanceId, Vec<RiskScenarioId>>, RepositoryError> {
        let mut links: HashMap<RiskAcceptanceId, Vec<RiskScenarioId>> = HashMap::new();
        if ids.is_empty() {
            return Ok(links);
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT risk_acceptance_id, risk_scenario_id
             FROM risk_acceptance_scenario
             WHERE risk_acceptance_id IN (",
        );
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(") ORDER BY rowid ASC");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        for row in &rows {
            let acceptance_id: String = row.try_get("risk_acceptance_id")?;
            let scenario_id: String = row.try_get("risk_scenario_id")?;
            links
                .entry(decode_id("risk_acceptance_scenario.risk_acceptance_id", &acceptance_id)?)
                .or_default()
                .push(decode_id("risk_acceptance_scenario.risk_scenario_id", &scenario_id)?);
        }

        Ok(links)
    }
}

fn decode_state(raw: &str) -> Result<AcceptanceState, RepositoryError> {
    raw.parse::<AcceptanceState>().map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn row_to_acceptance(row: &SqliteRow) -> Result<RiskAcceptance, RepositoryError> {
    let id: String = row.try_get("id")?;
    let state: String = row.try_get("state")?;
    let folder_id: String = row.try_get("folder_id")?;
    let approver_id: Option<String> = row.try_get("approver_id")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(RiskAcceptance {
        id: decode_id("risk_acceptance.id", &id)?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        expiry_date: decode_date("risk_acceptance.expiry_date", row.try_get("expiry_date")?)?,
        accepted_date: decode_date(
            "risk_acceptance.accepted_date",
            row.try_get("accepted_date")?,
        )?,
        rejected_date: decode_date(
            "risk_acceptance.rejected_date",
            row.try_get("rejected_date")?,
        )?,
        revoked_date: decode_date("risk_acceptance.revoked_date", row.try_get("revoked_date")?)?,
        justification: row.try_get("justification")?,
        state: decode_state(&state)?,
        folder_id: decode_id("risk_acceptance.folder_id", &folder_id)?,
        approver_id: approver_id
            .as_deref()
            .map(|raw| decode_id::<UserId>("risk_acceptance.approver_id", raw))
            .transpose()?,
        risk_scenario_ids: Vec::new(),
        created_at: decode_timestamp("risk_acceptance.created_at", &created_at)?,
        updated_at: decode_timestamp("risk_acceptance.updated_at", &updated_at)?,
    })
}

async fn replace_scenario_links(
    conn: &mut SqliteConnection,
    acceptance: &RiskAcceptance,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM risk_acceptance_scenario WHERE risk_acceptance_id = ?")
        .bind(acceptance.id.to_string())
        .execute(&mut *conn)
        .await?;

    for scenario_id in &acceptance.risk_scenario_ids {
        sqlx::query(
            "INSERT INTO risk_acceptance_scenario (risk_acceptance_id, risk_scenario_id)
             VALUES (?, ?)",
        )
        .bind(acceptance.id.to_string())
        .bind(scenario_id.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl RiskAcceptanceRepository for SqlRiskAcceptanceRepository {
    async fn find_by_id(
        &self,
        id: RiskAcceptanceId,
    ) -> Result<Option<RiskAcceptance>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(mut acceptance) = row.as_ref().map(row_to_acceptance).transpose()? else {
            return Ok(None);
        };
        let mut links = self.scenario_links(&[acceptance.id]).await?;
        acceptance.risk_scenario_ids = links.remove(&acceptance.id).unwrap_or_default();

        Ok(Some(acceptance))
    }

    async fn list(&self, filter: &AcceptanceFilter) -> Result<Vec<RiskAcceptance>, RepositoryError> {
        if filter.folder_ids.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        query_builder.push(" WHERE 1=1");

        if let Some(folder_ids) = &filter.folder_ids {
            query_builder.push(" AND folder_id IN (");
            let mut separated = query_builder.separated(", ");
            for folder_id in folder_ids {
                separated.push_bind(folder_id.to_string());
            }
            separated.push_unseparated(")");
        }
        if let Some(state) = filter.state {
            query_builder.push(" AND state = ").push_bind(state.as_str());
        }
        if let Some(approver_id) = filter.approver_id {
            query_builder.push(" AND approver_id = ").push_bind(approver_id.to_string());
        }
        query_builder.push(" ORDER BY created_at ASC, rowid ASC");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        let mut acceptances =
            rows.iter().map(row_to_acceptance).collect::<Result<Vec<_>, _>>()?;

        let ids = acceptances.iter().map(|acceptance| acceptance.id).collect::<Vec<_>>();
        let mut links = self.scenario_links(&ids).await?;
        for acceptance in &mut acceptances {
            acceptance.risk_scenario_ids = links.remove(&acceptance.id).unwrap_or_default();
        }

        Ok(acceptances)
    }

    async fn create(
        &self,
        acceptance: &RiskAcceptance,
        event: &AuditEvent,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO risk_acceptance (id, name, description, expiry_date, accepted_date,
                                          rejected_date, revoked_date, justification, state,
                                          folder_id, approver_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(acceptance.id.to_string())
        .bind(&acceptance.name)
        .bind(&acceptance.description)
        .bind(encode_date(acceptance.expiry_date))
        .bind(encode_date(acceptance.accepted_date))
        .bind(encode_date(acceptance.rejected_date))
        .bind(encode_date(acceptance.revoked_date))
        .bind(&acceptance.justification)
        .bind(acceptance.state.as_str())
        .bind(acceptance.folder_id.to_string())
        .bind(acceptance.approver_id.map(|id| id.to_string()))
        .bind(acceptance.created_at.to_rfc3339())
        .bind(acceptance.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        replace_scenario_links(&mut tx, acceptance).await?;
        record_event(&mut tx, event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update(
        &self,
        acceptance: &RiskAcceptance,
        event: &AuditEvent,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE risk_acceptance SET
                 name = ?, description = ?, expiry_date = ?, accepted_date = ?,
                 rejected_date = ?, revoked_date = ?, justification = ?, state = ?,
                 folder_id = ?, approver_id = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&acceptance.name)
        .bind(&acceptance.description)
        .bind(encode_date(acceptance.expiry_date))
        .bind(encode_date(acceptance.accepted_date))
        .bind(encode_date(acceptance.rejected_date))
        .bind(encode_date(acceptance.revoked_date))
        .bind(&acceptance.justification)
        .bind(acceptance.state.as_str())
        .bind(acceptance.folder_id.to_string())
        .bind(acceptance.approver_id.map(|id| id.to_string()))
        .bind(acceptance.updated_at.to_rfc3339())
        .bind(acceptance.id.to_string())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        replace_scenario_links(&mut tx, acceptance).await?;
        record_event(&mut tx, event).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete(
        &self,
        id: RiskAcceptanceId,
        event: &AuditEvent,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM risk_acceptance WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        record_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use riskgate_core::audit::{AuditContext, AuditEvent, AuditOutcome};
    use riskgate_core::domain::risk_acceptance::{AcceptanceState, Decision, RiskAcceptance};

    use super::SqlRiskAcceptanceRepository;
    use crate::repositories::test_support::{child_folder, global_folder, scenario_in, setup};
    use crate::repositories::{
        AcceptanceFilter, AuditRepository, RiskAcceptanceRepository, SqlAuditRepository,
    };

    fn event(acceptance: &RiskAcceptance, event_type: &str) -> AuditEvent {
        AuditEvent::new(
            &AuditContext::new("req-test", "analyst@test.com"),
            event_type,
            acceptance.id,
            Some(acceptance.folder_id),
            AuditOutcome::Success,
        )
    }

    #[tokio::test]
    async fn create_round_trips_with_scenarios_and_audit_row() {
        let pool = setup().await;
        let global = global_folder(&pool).await;
        let domain = child_folder(&pool, "Domain A", global.id).await;
        let scenario_id = scenario_in(&pool, domain.id, "Ransomware").await;
        let repo = SqlRiskAcceptanceRepository::new(pool.clone());

        let mut acceptance = RiskAcceptance::new("Legacy VPN", domain.id);
        acceptance.expiry_date = NaiveDate::from_ymd_opt(2030, 1, 1);
        acceptance.risk_scenario_ids = vec![scenario_id];
        repo.create(&acceptance, &event(&acceptance, "risk_acceptance.created"))
            .await
            .expect("create");

        let loaded = repo.find_by_id(acceptance.id).await.expect("find").expect("exists");
        assert_eq!(loaded.name, "Legacy VPN");
        assert_eq!(loaded.state, AcceptanceState::Submitted);
        assert_eq!(loaded.expiry_date, NaiveDate::from_ymd_opt(2030, 1, 1));
        assert_eq!(loaded.risk_scenario_ids, vec![scenario_id]);

        let audit = SqlAuditRepository::new(pool)
            .list_for_object(&acceptance.id.to_string())
            .await
            .expect("audit");
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].event_type, "risk_acceptance.created");
    }

    #[tokio::test]
    async fn update_replaces_links_and_delete_cascades_them() {
        let pool = setup().await;
        let global = global_folder(&pool).await;
        let first = scenario_in(&pool, global.id, "First").await;
        let second = scenario_in(&pool, global.id, "Second").await;
        let repo = SqlRiskAcceptanceRepository::new(pool.clone());

        let mut acceptance = RiskAcceptance::new("Shared admin account", global.id);
        acceptance.risk_scenario_ids = vec![first];
        repo.create(&acceptance, &event(&acceptance, "risk_acceptance.created"))
            .await
            .expect("create");

        acceptance.risk_scenario_ids = vec![second];
        acceptance
            .decide(Decision::Reject, NaiveDate::from_ymd_opt(2024, 5, 1).expect("date"))
            .expect("reject");
        let updated = repo
            .update(&acceptance, &event(&acceptance, "risk_acceptance.rejected"))
            .await
            .expect("update");
        assert!(updated);

        let loaded = repo.find_by_id(acceptance.id).await.expect("find").expect("exists");
        assert_eq!(loaded.risk_scenario_ids, vec![second]);
        assert_eq!(loaded.state, AcceptanceState::Rejected);
        assert_eq!(loaded.rejected_date, NaiveDate::from_ymd_opt(2024, 5, 1));

        assert!(repo
            .delete(acceptance.id, &event(&acceptance, "risk_acceptance.deleted"))
            .await
            .expect("delete"));
        assert!(!repo
            .delete(acceptance.id, &event(&acceptance, "risk_acceptance.deleted"))
            .await
            .expect("second delete"));

        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM risk_acceptance_scenario")
            .fetch_one(&pool)
            .await
            .expect("count links");
        assert_eq!(links, 0);
        let scenarios: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM risk_scenario")
            .fetch_one(&pool)
            .await
            .expect("count scenarios");
        assert_eq!(scenarios, 2);
    }

    #[tokio::test]
    async fn list_filters_by_folder_and_state_in_creation_order() {
        let pool = setup().await;
        let global = global_folder(&pool).await;
        let domain_a = child_folder(&pool, "Domain A", global.id).await;
        let domain_b = child_folder(&pool, "Domain B", global.id).await;
        let repo = SqlRiskAcceptanceRepository::new(pool);

        let first = RiskAcceptance::new("first", domain_a.id);
        let mut second = RiskAcceptance::new("second", domain_a.id);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let third = RiskAcceptance::new("third", domain_b.id);
        for acceptance in [&first, &second, &third] {
            repo.create(acceptance, &event(acceptance, "risk_acceptance.created"))
                .await
                .expect("create");
        }

        let in_a = repo
            .list(&AcceptanceFilter {
                folder_ids: Some(BTreeSet::from([domain_a.id])),
                ..AcceptanceFilter::default()
            })
            .await
            .expect("list");
        assert_eq!(
            in_a.iter().map(|acceptance| acceptance.name.as_str()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );

        let everything = repo.list(&AcceptanceFilter::default()).await.expect("list all");
        assert_eq!(everything.len(), 3);

        let none_visible = repo
            .list(&AcceptanceFilter {
                folder_ids: Some(BTreeSet::new()),
                ..AcceptanceFilter::default()
            })
            .await
            .expect("list none");
        assert!(none_visible.is_empty());

        let accepted = repo
            .list(&AcceptanceFilter {
                state: Some(AcceptanceState::Accepted),
                ..AcceptanceFilter::default()
            })
            .await
            .expect("list accepted");
        assert!(accepted.is_empty());
    }
}
