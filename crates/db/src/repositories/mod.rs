use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use riskgate_core::approvals::ApproverCandidate;
use riskgate_core::audit::AuditEvent;
use riskgate_core::authz::Identity;
use riskgate_core::domain::directory::{ApiToken, GroupId, User, UserGroup, UserId};
use riskgate_core::domain::folder::{Folder, FolderId};
use riskgate_core::domain::risk::{
    Project, RiskAssessment, RiskMatrix, RiskScenario, RiskScenarioId, ScenarioSummary, Threat,
};
use riskgate_core::domain::risk_acceptance::{AcceptanceState, RiskAcceptance, RiskAcceptanceId};

pub mod audit;
pub mod directory;
pub mod folder;
pub mod risk;
pub mod risk_acceptance;

pub use audit::SqlAuditRepository;
pub use directory::SqlDirectoryRepository;
pub use folder::SqlFolderRepository;
pub use risk::SqlRiskRepository;
pub use risk_acceptance::SqlRiskAcceptanceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait FolderRepository: Send + Sync {
    async fn find_by_id(&self, id: FolderId) -> Result<Option<Folder>, RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Folder>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Folder>, RepositoryError>;
    async fn save(&self, folder: Folder) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn save_user(&self, user: User) -> Result<(), RepositoryError>;
    async fn find_group_by_name(&self, name: &str) -> Result<Option<UserGroup>, RepositoryError>;
    async fn save_group(&self, group: UserGroup) -> Result<(), RepositoryError>;
    async fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<(), RepositoryError>;
    async fn group_names_for_user(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<String>, RepositoryError>;
    async fn approver_candidate(
        &self,
        user_id: UserId,
    ) -> Result<Option<ApproverCandidate>, RepositoryError>;
    async fn save_token(&self, token: ApiToken) -> Result<(), RepositoryError>;

    /// Resolves a token digest to the identity of an active user. Unknown
    /// and expired tokens resolve to `None`.
    async fn find_identity_by_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, RepositoryError>;
}

#[async_trait]
pub trait RiskRepository: Send + Sync {
    async fn save_project(&self, project: Project) -> Result<(), RepositoryError>;
    async fn save_risk_matrix(&self, matrix: RiskMatrix) -> Result<(), RepositoryError>;
    async fn save_threat(&self, threat: Threat) -> Result<(), RepositoryError>;
    async fn save_assessment(&self, assessment: RiskAssessment) -> Result<(), RepositoryError>;
    async fn save_scenario(&self, scenario: RiskScenario) -> Result<(), RepositoryError>;

    /// Loads the requested scenarios with their owning project. Ids that do
    /// not exist are simply missing from the result.
    async fn find_scenarios(
        &self,
        ids: &[RiskScenarioId],
    ) -> Result<Vec<ScenarioSummary>, RepositoryError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptanceFilter {
    /// `None` lifts the folder restriction entirely.
    pub folder_ids: Option<BTreeSet<FolderId>>,
    pub state: Option<AcceptanceState>,
    pub approver_id: Option<UserId>,
}

#[async_trait]
pub trait RiskAcceptanceRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: RiskAcceptanceId,
    ) -> Result<Option<RiskAcceptance>, RepositoryError>;
    async fn list(&self, filter: &AcceptanceFilter) -> Result<Vec<RiskAcceptance>, RepositoryError>;
    async fn create(
        &self,
        acceptance: &RiskAcceptance,
        event: &AuditEvent,
    ) -> Result<(), RepositoryError>;

    /// Returns `false` when the row no longer exists.
    async fn update(
        &self,
        acceptance: &RiskAcceptance,
        event: &AuditEvent,
    ) -> Result<bool, RepositoryError>;

    /// Returns `false` when the row no longer exists.
    async fn delete(&self, id: RiskAcceptanceId, event: &AuditEvent)
        -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn list_for_object(&self, object_id: &str) -> Result<Vec<AuditEvent>, RepositoryError>;
}

pub(crate) fn decode_id<T>(column: &str, raw: &str) -> Result<T, RepositoryError>
where
    T: FromStr,
{
    raw.parse::<T>()
        .map_err(|_| RepositoryError::Decode(format!("invalid id `{raw}` in column `{column}`")))
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).map_err(|error| {
        RepositoryError::Decode(format!("invalid timestamp in column `{column}`: {error}"))
    })
}

pub(crate) fn decode_date(column: &str, raw: Option<String>) -> Result<Option<NaiveDate>, RepositoryError> {
    raw.map(|value| {
        NaiveDate::parse_from_str(&value, riskgate_core::domain::risk_acceptance::DATE_FORMAT)
            .map_err(|error| {
                RepositoryError::Decode(format!("invalid date in column `{column}`: {error}"))
            })
    })
    .transpose()
}

pub(crate) fn encode_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|value| value.format(riskgate_core::domain::risk_acceptance::DATE_FORMAT).to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use riskgate_core::domain::folder::{Folder, FolderId};
    use riskgate_core::domain::risk::{
        Project, RiskAssessment, RiskMatrix, RiskMatrixId, RiskScenario, RiskScenarioId,
        ProjectId, RiskAssessmentId,
    };

    use super::{FolderRepository, RiskRepository, SqlFolderRepository, SqlRiskRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    pub async fn global_folder(pool: &DbPool) -> Folder {
        SqlFolderRepository::new(pool.clone())
            .find_by_name("Global")
            .await
            .expect("query global")
            .expect("global folder is seeded")
    }

    pub async fn child_folder(pool: &DbPool, name: &str, parent: FolderId) -> Folder {
        let folder = Folder::new(name, Some(parent));
        SqlFolderRepository::new(pool.clone()).save(folder.clone()).await.expect("save folder");
        folder
    }

    /// Builds project -> matrix -> assessment -> scenario inside `folder_id`.
    pub async fn scenario_in(pool: &DbPool, folder_id: FolderId, name: &str) -> RiskScenarioId {
        let risks = SqlRiskRepository::new(pool.clone());
        let project =
            Project { id: ProjectId::new(), name: format!("{name} project"), folder_id };
        let matrix = RiskMatrix { id: RiskMatrixId::new(), name: "4x4".to_string(), folder_id };
        let assessment = RiskAssessment {
            id: RiskAssessmentId::new(),
            name: format!("{name} assessment"),
            project_id: project.id,
            risk_matrix_id: matrix.id,
        };
        let scenario = RiskScenario {
            id: RiskScenarioId::new(),
            name: name.to_string(),
            description: None,
            risk_assessment_id: assessment.id,
            threat_id: None,
        };
        let scenario_id = scenario.id;

        risks.save_project(project).await.expect("save project");
        risks.save_risk_matrix(matrix).await.expect("save matrix");
        risks.save_assessment(assessment).await.expect("save assessment");
        risks.save_scenario(scenario).await.expect("save scenario");
        scenario_id
    }
}
