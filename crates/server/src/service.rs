//! Risk acceptance use cases. Every public operation authorizes the caller
//! against the target folder before touching anything else.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use riskgate_core::approvals::ApproverPolicy;
use riskgate_core::audit::{AuditContext, AuditEvent, AuditOutcome};
use riskgate_core::authz::{authorize, Action, FolderTree};
use riskgate_core::domain::directory::UserId;
use riskgate_core::domain::folder::FolderId;
use riskgate_core::domain::risk::{RiskScenarioId, ScenarioSummary};
use riskgate_core::domain::risk_acceptance::{
    check_lifecycle, AcceptanceState, Decision, InputMode, RiskAcceptance, RiskAcceptanceId,
    RiskAcceptanceInput,
};
use riskgate_core::domain::RelatedObject;
use riskgate_core::errors::{ApplicationError, DomainError};
use riskgate_core::validation::{Field, ValidationErrors};
use riskgate_db::repositories::{
    AcceptanceFilter, DirectoryRepository, FolderRepository, RepositoryError,
    RiskAcceptanceRepository, RiskRepository, SqlDirectoryRepository, SqlFolderRepository,
    SqlRiskAcceptanceRepository, SqlRiskRepository,
};
use riskgate_db::DbPool;
use tracing::info;

use crate::auth::Caller;

const RESOURCE: &str = "risk acceptance";

/// Raw list filters as they arrive on the query string.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct ListFilter {
    pub folder: Option<String>,
    pub state: Option<String>,
    pub approver: Option<String>,
}

/// A risk acceptance with its relations resolved to display labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAcceptance {
    pub acceptance: RiskAcceptance,
    pub folder: RelatedObject,
    pub approver: Option<RelatedObject>,
    pub risk_scenarios: Vec<RelatedObject>,
}

pub struct RiskAcceptanceService {
    folders: Arc<dyn FolderRepository>,
    directory: Arc<dyn DirectoryRepository>,
    risks: Arc<dyn RiskRepository>,
    acceptances: Arc<dyn RiskAcceptanceRepository>,
    approver_policy: ApproverPolicy,
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn not_found(id: impl ToString) -> ApplicationError {
    ApplicationError::NotFound { resource: RESOURCE, id: id.to_string() }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

impl RiskAcceptanceService {
    pub fn new(
        folders: Arc<dyn FolderRepository>,
        directory: Arc<dyn DirectoryRepository>,
        risks: Arc<dyn RiskRepository>,
        acceptances: Arc<dyn RiskAcceptanceRepository>,
        approver_policy: ApproverPolicy,
    ) -> Self {
        Self { folders, directory, risks, acceptances, approver_policy }
    }

    pub fn from_pool(pool: DbPool, approver_policy: ApproverPolicy) -> Self {
        Self::new(
            Arc::new(SqlFolderRepository::new(pool.clone())),
            Arc::new(SqlDirectoryRepository::new(pool.clone())),
            Arc::new(SqlRiskRepository::new(pool.clone())),
            Arc::new(SqlRiskAcceptanceRepository::new(pool)),
            approver_policy,
        )
    }

    pub async fn list(
        &self,
        caller: &Caller,
        filter: ListFilter,
    ) -> Result<Vec<ResolvedAcceptance>, ApplicationError> {
        let tree = self.folder_tree().await?;
        let mut errors = ValidationErrors::new();

        let mut folder_ids = tree.permitted(&caller.identity, Action::View);
        if let Some(raw) = filter.folder.as_deref() {
            match raw.parse::<FolderId>() {
                Ok(folder_id) => folder_ids.retain(|id| *id == folder_id),
                Err(_) => errors.add("folder", format!("`{raw}` is not a valid UUID")),
            }
        }
        let state = match filter.state.as_deref() {
            Some(raw) => match raw.parse::<AcceptanceState>() {
                Ok(state) => Some(state),
                Err(_) => {
                    errors.add("state", format!("`{raw}` is not a valid choice"));
                    None
                }
            },
            None => None,
        };
        let approver_id = match filter.approver.as_deref() {
            Some(raw) => match raw.parse::<UserId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("approver", format!("`{raw}` is not a valid UUID"));
                    None
                }
            },
            None => None,
        };
        errors.into_result()?;

        let acceptances = self
            .acceptances
            .list(&AcceptanceFilter { folder_ids: Some(folder_ids), state, approver_id })
            .await
            .map_err(persistence)?;

        self.resolve_all(&tree, acceptances).await
    }

    pub async fn retrieve(
        &self,
        caller: &Caller,
        raw_id: &str,
    ) -> Result<ResolvedAcceptance, ApplicationError> {
        let (acceptance, tree) = self.load_for(caller, raw_id, Action::View).await?;
        self.resolve(&tree, acceptance).await
    }

    pub async fn create(
        &self,
        caller: &Caller,
        input: RiskAcceptanceInput,
    ) -> Result<ResolvedAcceptance, ApplicationError> {
        let mut errors = ValidationErrors::new();
        let changes = input.parse(InputMode::Create, &mut errors);
        let tree = self.folder_tree().await?;

        let folder_id = match changes.folder_id {
            Some(folder_id) => self.target_folder(caller, &tree, folder_id, Action::Add, &mut errors)?,
            None => None,
        };

        if let Field::Value(approver_id) = changes.approver_id {
            self.check_approver(approver_id, &mut errors).await?;
        }
        if let Some(scenario_ids) = changes.risk_scenario_ids.as_deref() {
            self.check_scenarios(caller, &tree, scenario_ids, folder_id, &mut errors).await?;
        }

        let (Some(name), Some(folder_id)) = (changes.name.clone(), folder_id) else {
            return Err(errors.into());
        };
        errors.into_result()?;

        let mut acceptance = RiskAcceptance::new(name, folder_id);
        acceptance.apply(changes);
        acceptance.updated_at = acceptance.created_at;
        check_lifecycle(None, &acceptance).into_result()?;

        let event = self.audit_event(caller, &acceptance, "risk_acceptance.created");
        self.acceptances.create(&acceptance, &event).await.map_err(persistence)?;

        info!(
            event_name = "risk_acceptance.created",
            correlation_id = %caller.correlation_id,
            risk_acceptance_id = %acceptance.id,
            folder_id = %acceptance.folder_id,
            "risk acceptance created"
        );

        self.resolve(&tree, acceptance).await
    }

    pub async fn update(
        &self,
        caller: &Caller,
        raw_id: &str,
        input: RiskAcceptanceInput,
    ) -> Result<ResolvedAcceptance, ApplicationError> {
        let (current, tree) = self.load_for(caller, raw_id, Action::Change).await?;
        let mut errors = ValidationErrors::new();
        let changes = input.parse(InputMode::Update, &mut errors);

        let mut target_folder = current.folder_id;
        if let Some(folder_id) = changes.folder_id.filter(|id| *id != current.folder_id) {
            if let Some(folder_id) =
                self.target_folder(caller, &tree, folder_id, Action::Change, &mut errors)?
            {
                target_folder = folder_id;
            }
        }

        let approver_changes = match changes.approver_id {
            Field::Absent => false,
            Field::Null => current.approver_id.is_some(),
            Field::Value(approver_id) => Some(approver_id) != current.approver_id,
        };
        if approver_changes && current.state != AcceptanceState::Submitted {
            errors.add(
                "approver",
                format!("the approver cannot change once the acceptance is `{}`", current.state),
            );
        } else if let Field::Value(approver_id) = changes.approver_id {
            if approver_changes {
                self.check_approver(approver_id, &mut errors).await?;
            }
        }

        // a folder move re-checks the existing links as well
        let scenario_ids = match changes.risk_scenario_ids.as_deref() {
            Some(ids) => Some(ids.to_vec()),
            None if target_folder != current.folder_id => Some(current.risk_scenario_ids.clone()),
            None => None,
        };
        if let Some(scenario_ids) = scenario_ids {
            self.check_scenarios(caller, &tree, &scenario_ids, Some(target_folder), &mut errors)
                .await?;
        }

        let mut next = current.clone();
        next.apply(changes);
        errors.merge(check_lifecycle(Some(&current), &next));

        let state_changed = next.state != current.state;
        if state_changed && needs_approver(next.state) && next.approver_id.is_none() {
            errors.add("approver", format!("an approver is required to move to `{}`", next.state));
        }
        errors.into_result()?;

        if state_changed {
            self.authorize_decision(caller, &tree, &next)?;
        }

        let mut event = self.audit_event(caller, &next, "risk_acceptance.updated");
        if state_changed {
            event = event
                .with_metadata("from_state", current.state.as_str())
                .with_metadata("to_state", next.state.as_str());
        }
        if next.folder_id != current.folder_id {
            event = event.with_metadata("from_folder", current.folder_id.to_string());
        }
        if !self.acceptances.update(&next, &event).await.map_err(persistence)? {
            return Err(not_found(next.id));
        }

        info!(
            event_name = "risk_acceptance.updated",
            correlation_id = %caller.correlation_id,
            risk_acceptance_id = %next.id,
            state = next.state.as_str(),
            "risk acceptance updated"
        );

        self.resolve(&tree, next).await
    }

    pub async fn delete(&self, caller: &Caller, raw_id: &str) -> Result<(), ApplicationError> {
        let (acceptance, _) = self.load_for(caller, raw_id, Action::Delete).await?;

        let event = self.audit_event(caller, &acceptance, "risk_acceptance.deleted");
        if !self.acceptances.delete(acceptance.id, &event).await.map_err(persistence)? {
            return Err(not_found(acceptance.id));
        }

        info!(
            event_name = "risk_acceptance.deleted",
            correlation_id = %caller.correlation_id,
            risk_acceptance_id = %acceptance.id,
            "risk acceptance deleted"
        );
        Ok(())
    }

    /// Applies an approver decision and stamps today's date on the record.
    pub async fn decide(
        &self,
        caller: &Caller,
        raw_id: &str,
        decision: Decision,
    ) -> Result<ResolvedAcceptance, ApplicationError> {
        let (current, tree) = self.load_for(caller, raw_id, Action::Approve).await?;

        let target = decision.target_state();
        if needs_approver(target) && current.approver_id.is_none() {
            return Err(ValidationErrors::single(
                "approver",
                format!("an approver is required to move to `{target}`"),
            )
            .into());
        }
        self.authorize_decision(caller, &tree, &current)?;

        let mut next = current.clone();
        next.decide(decision, today())?;
        check_lifecycle(Some(&current), &next).into_result()?;

        let event = self
            .audit_event(caller, &next, format!("risk_acceptance.{}", decision.as_str()))
            .with_metadata("from_state", current.state.as_str())
            .with_metadata("to_state", next.state.as_str());
        if !self.acceptances.update(&next, &event).await.map_err(persistence)? {
            return Err(not_found(next.id));
        }

        info!(
            event_name = "risk_acceptance.decided",
            correlation_id = %caller.correlation_id,
            risk_acceptance_id = %next.id,
            decision = decision.as_str(),
            "risk acceptance decision recorded"
        );

        self.resolve(&tree, next).await
    }

    async fn folder_tree(&self) -> Result<FolderTree, ApplicationError> {
        Ok(FolderTree::new(self.folders.list().await.map_err(persistence)?))
    }

    /// Loads an acceptance the caller can see, then checks `action` on its
    /// folder. Invisible records are reported exactly like missing ones.
    async fn load_for(
        &self,
        caller: &Caller,
        raw_id: &str,
        action: Action,
    ) -> Result<(RiskAcceptance, FolderTree), ApplicationError> {
        let id = raw_id.parse::<RiskAcceptanceId>().map_err(|_| not_found(raw_id))?;
        let acceptance =
            self.acceptances.find_by_id(id).await.map_err(persistence)?.ok_or_else(|| not_found(id))?;
        let tree = self.folder_tree().await?;
        let scope = tree.scope(acceptance.folder_id).ok_or_else(|| not_found(id))?;

        if !authorize(&caller.identity, Action::View, &scope).is_allowed() {
            return Err(not_found(id));
        }
        if !authorize(&caller.identity, action, &scope).is_allowed() {
            return Err(ApplicationError::Authorization {
                action,
                folder: folder_label(&tree, acceptance.folder_id),
            });
        }

        Ok((acceptance, tree))
    }

    /// Resolves a folder named in a payload. Unknown and invisible folders
    /// become field errors; a visible folder without `action` is a 403.
    fn target_folder(
        &self,
        caller: &Caller,
        tree: &FolderTree,
        folder_id: FolderId,
        action: Action,
        errors: &mut ValidationErrors,
    ) -> Result<Option<FolderId>, ApplicationError> {
        let visible = tree
            .scope(folder_id)
            .filter(|scope| authorize(&caller.identity, Action::View, scope).is_allowed());
        let Some(scope) = visible else {
            errors.add("folder", format!("folder `{folder_id}` does not exist"));
            return Ok(None);
        };

        if !authorize(&caller.identity, action, &scope).is_allowed() {
            return Err(ApplicationError::Authorization {
                action,
                folder: folder_label(tree, folder_id),
            });
        }
        Ok(Some(folder_id))
    }

    async fn check_approver(
        &self,
        approver_id: UserId,
        errors: &mut ValidationErrors,
    ) -> Result<(), ApplicationError> {
        let candidate = self.directory.approver_candidate(approver_id).await.map_err(persistence)?;
        let check = self.approver_policy.check(approver_id, candidate.as_ref());
        if !check.allowed {
            errors.add("approver", check.reason);
        }
        Ok(())
    }

    async fn check_scenarios(
        &self,
        caller: &Caller,
        tree: &FolderTree,
        scenario_ids: &[RiskScenarioId],
        folder_id: Option<FolderId>,
        errors: &mut ValidationErrors,
    ) -> Result<(), ApplicationError> {
        let found = self.risks.find_scenarios(scenario_ids).await.map_err(persistence)?;
        let by_id = found.iter().map(|scenario| (scenario.id, scenario)).collect::<HashMap<_, _>>();

        for scenario_id in scenario_ids {
            let visible = by_id.get(scenario_id).copied().and_then(|scenario| {
                let scope = tree.scope(scenario.folder_id)?;
                authorize(&caller.identity, Action::View, &scope)
                    .is_allowed()
                    .then_some((scenario, scope))
            });
            let Some((scenario, scope)) = visible else {
                errors.add("risk_scenarios", format!("risk scenario `{scenario_id}` does not exist"));
                continue;
            };

            if let Some(folder_id) = folder_id {
                if !scope.is_within(folder_id) {
                    errors.add(
                        "risk_scenarios",
                        format!(
                            "risk scenario `{}` is outside folder `{}`",
                            scenario.display_label(),
                            folder_label(tree, folder_id)
                        ),
                    );
                }
            }
        }
        Ok(())
    }

    /// Decisions belong to the assigned approver; superusers may act for them.
    fn authorize_decision(
        &self,
        caller: &Caller,
        tree: &FolderTree,
        acceptance: &RiskAcceptance,
    ) -> Result<(), ApplicationError> {
        let denied = || ApplicationError::Authorization {
            action: Action::Approve,
            folder: folder_label(tree, acceptance.folder_id),
        };
        let scope = tree.scope(acceptance.folder_id).ok_or_else(denied)?;

        if !authorize(&caller.identity, Action::Approve, &scope).is_allowed() {
            return Err(denied());
        }
        if !caller.identity.is_superuser && acceptance.approver_id != Some(caller.identity.user_id)
        {
            return Err(denied());
        }
        Ok(())
    }

    fn audit_event(
        &self,
        caller: &Caller,
        acceptance: &RiskAcceptance,
        event_type: impl Into<String>,
    ) -> AuditEvent {
        AuditEvent::new(
            &AuditContext::new(caller.correlation_id.clone(), caller.actor()),
            event_type,
            acceptance.id,
            Some(acceptance.folder_id),
            AuditOutcome::Success,
        )
    }

    async fn resolve(
        &self,
        tree: &FolderTree,
        acceptance: RiskAcceptance,
    ) -> Result<ResolvedAcceptance, ApplicationError> {
        let mut resolved = self.resolve_all(tree, vec![acceptance]).await?;
        resolved.pop().ok_or_else(|| {
            ApplicationError::Domain(DomainError::InvariantViolation(
                "resolved acceptance went missing".to_string(),
            ))
        })
    }

    async fn resolve_all(
        &self,
        tree: &FolderTree,
        acceptances: Vec<RiskAcceptance>,
    ) -> Result<Vec<ResolvedAcceptance>, ApplicationError> {
        let scenario_ids = acceptances
            .iter()
            .flat_map(|acceptance| acceptance.risk_scenario_ids.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let scenarios: HashMap<RiskScenarioId, ScenarioSummary> = self
            .risks
            .find_scenarios(&scenario_ids)
            .await
            .map_err(persistence)?
            .into_iter()
            .map(|scenario| (scenario.id, scenario))
            .collect();

        let mut approvers: HashMap<UserId, RelatedObject> = HashMap::new();
        for approver_id in acceptances.iter().filter_map(|acceptance| acceptance.approver_id) {
            if approvers.contains_key(&approver_id) {
                continue;
            }
            if let Some(user) =
                self.directory.find_user_by_id(approver_id).await.map_err(persistence)?
            {
                approvers.insert(approver_id, RelatedObject::new(user.id, user.display_label()));
            }
        }

        Ok(acceptances
            .into_iter()
            .map(|acceptance| ResolvedAcceptance {
                folder: RelatedObject::new(
                    acceptance.folder_id,
                    folder_label(tree, acceptance.folder_id),
                ),
                approver: acceptance.approver_id.and_then(|id| approvers.get(&id).cloned()),
                risk_scenarios: acceptance
                    .risk_scenario_ids
                    .iter()
                    .filter_map(|id| scenarios.get(id))
                    .map(|scenario| RelatedObject::new(scenario.id, scenario.display_label()))
                    .collect(),
                acceptance,
            })
            .collect())
    }
}

fn needs_approver(state: AcceptanceState) -> bool {
    matches!(state, AcceptanceState::Accepted | AcceptanceState::Rejected)
}

fn folder_label(tree: &FolderTree, folder_id: FolderId) -> String {
    tree.get(folder_id)
        .map(|folder| folder.display_label().to_string())
        .unwrap_or_else(|| folder_id.to_string())
}
