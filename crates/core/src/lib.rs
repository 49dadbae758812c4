pub mod approvals;
pub mod audit;
pub mod authz;
pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod validation;

pub use approvals::{
    ApproverCandidate, ApproverCheck, ApproverFailure, ApproverPolicy, GLOBAL_APPROVERS_GROUP,
};
pub use audit::{AuditContext, AuditEvent, AuditOutcome};
pub use authz::{authorize, AccessDecision, Action, FolderGrant, FolderScope, FolderTree, Identity, Role};
pub use domain::directory::{ApiToken, ApiTokenId, GroupId, User, UserGroup, UserId};
pub use domain::folder::{Folder, FolderId, GLOBAL_FOLDER_NAME};
pub use domain::risk::{
    Project, ProjectId, RiskAssessment, RiskAssessmentId, RiskMatrix, RiskMatrixId, RiskScenario,
    RiskScenarioId, ScenarioSummary, Threat, ThreatId,
};
pub use domain::risk_acceptance::{
    AcceptanceState, Decision, InputMode, RiskAcceptance, RiskAcceptanceChanges,
    RiskAcceptanceId, RiskAcceptanceInput,
};
pub use domain::RelatedObject;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use validation::{Field, ValidationErrors};
