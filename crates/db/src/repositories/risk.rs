use sqlx::{QueryBuilder, Row, Sqlite};

use riskgate_core::domain::risk::{
    Project, RiskAssessment, RiskMatrix, RiskScenario, RiskScenarioId, ScenarioSummary, Threat,
};

use super::{decode_id, RepositoryError, RiskRepository};
use crate::DbPool;

pub struct SqlRiskRepository {
    pool: DbPool,
}

impl SqlRiskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RiskRepository for SqlRiskRepository {
    async fn save_project(&self, project: Project) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO project (id, name, folder_id) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, folder_id = excluded.folder_id",
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(project.folder_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_risk_matrix(&self, matrix: RiskMatrix) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO risk_matrix (id, name, folder_id) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, folder_id = excluded.folder_id",
        )
        .bind(matrix.id.to_string())
        .bind(&matrix.name)
        .bind(matrix.folder_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_threat(&self, threat: Threat) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO threat (id, name, folder_id) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, folder_id = excluded.folder_id",
        )
        .bind(threat.id.to_string())
        .bind(&threat.name)
        .bind(threat.folder_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_assessment(&self, assessment: RiskAssessment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO risk_assessment (id, name, project_id, risk_matrix_id) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 project_id = excluded.project_id,
                 risk_matrix_id = excluded.risk_matrix_id",
        )
        .bind(assessment.id.to_string())
        .bind(&assessment.name)
        .bind(assessment.project_id.to_string())
        .bind(assessment.risk_matrix_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_scenario(&self, scenario: RiskScenario) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO risk_scenario (id, name, description, risk_assessment_id, threat_id)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 risk_assessment_id = excluded.risk_assessment_id,
                 threat_id = excluded.threat_id",
        )
        .bind(scenario.id.to_string())
        .bind(&scenario.name)
        .bind(&scenario.description)
        .bind(scenario.risk_assessment_id.to_string())
        .bind(scenario.threat_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_scenarios(
        &self,
        ids: &[RiskScenarioId],
    ) -> Result<Vec<ScenarioSummary>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(
            "SELECT s.id, s.name, p.name AS project_name, p.folder_id
             FROM risk_scenario s
             JOIN risk_assessment a ON a.id = s.risk_assessment_id
             JOIN project p ON p.id = a.project_id
             WHERE s.id IN (",
        );
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(") ORDER BY p.name ASC, s.name ASC");

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<ScenarioSummary, RepositoryError> {
                let id: String = row.try_get("id")?;
                let folder_id: String = row.try_get("folder_id")?;
                Ok(ScenarioSummary {
                    id: decode_id("risk_scenario.id", &id)?,
                    name: row.try_get("name")?,
                    project_name: row.try_get("project_name")?,
                    folder_id: decode_id("project.folder_id", &folder_id)?,
                })
            })
            .collect()
    }
}
