//! The risk chain a risk acceptance can point at:
//! scenario -> assessment -> project (folder-owned) and matrix, plus threats.

use serde::{Deserialize, Serialize};

use super::folder::FolderId;
use super::uuid_id;

uuid_id!(ProjectId);
uuid_id!(RiskMatrixId);
uuid_id!(ThreatId);
uuid_id!(RiskAssessmentId);
uuid_id!(RiskScenarioId);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub folder_id: FolderId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskMatrix {
    pub id: RiskMatrixId,
    pub name: String,
    pub folder_id: FolderId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threat {
    pub id: ThreatId,
    pub name: String,
    pub folder_id: FolderId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: RiskAssessmentId,
    pub name: String,
    pub project_id: ProjectId,
    pub risk_matrix_id: RiskMatrixId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScenario {
    pub id: RiskScenarioId,
    pub name: String,
    pub description: Option<String>,
    pub risk_assessment_id: RiskAssessmentId,
    pub threat_id: Option<ThreatId>,
}

/// A scenario joined with the project that scopes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub id: RiskScenarioId,
    pub name: String,
    pub project_name: String,
    pub folder_id: FolderId,
}

impl ScenarioSummary {
    pub fn display_label(&self) -> String {
        format!("{}: {}", self.project_name, self.name)
    }
}
