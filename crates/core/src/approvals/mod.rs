use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::directory::UserId;

/// Group whose members may approve risk acceptances out of the box.
pub const GLOBAL_APPROVERS_GROUP: &str = "BI-UG-GVA";

/// The approver-relevant facts about a user, as loaded from the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverCandidate {
    pub user_id: UserId,
    pub email: String,
    pub is_active: bool,
    pub groups: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApproverFailure {
    UnknownUser { user_id: String },
    InactiveUser { email: String },
    MissingApproverGroup { email: String, required_groups: Vec<String> },
}

impl ApproverFailure {
    pub fn reason(&self) -> String {
        match self {
            Self::UnknownUser { user_id } => format!("user `{user_id}` does not exist"),
            Self::InactiveUser { email } => format!("user `{email}` is inactive"),
            Self::MissingApproverGroup { email, required_groups } => format!(
                "user `{email}` is not a member of an approver group ({})",
                required_groups.join(", ")
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverCheck {
    pub allowed: bool,
    pub reason: String,
    pub failure: Option<ApproverFailure>,
}

impl ApproverCheck {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), failure: None }
    }

    fn deny(failure: ApproverFailure) -> Self {
        Self { allowed: false, reason: failure.reason(), failure: Some(failure) }
    }
}

/// Approval gate expressed as set membership: a user may be designated
/// approver when their groups intersect the configured approver groups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApproverPolicy {
    approver_groups: BTreeSet<String>,
}

impl Default for ApproverPolicy {
    fn default() -> Self {
        Self::new([GLOBAL_APPROVERS_GROUP])
    }
}

impl ApproverPolicy {
    pub fn new<I, S>(approver_groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            approver_groups: approver_groups
                .into_iter()
                .map(Into::into)
                .map(|group: String| group.trim().to_string())
                .filter(|group| !group.is_empty())
                .collect(),
        }
    }

    pub fn approver_groups(&self) -> &BTreeSet<String> {
        &self.approver_groups
    }

    /// `candidate` is `None` when the referenced user does not exist.
    pub fn check(&self, user_id: UserId, candidate: Option<&ApproverCandidate>) -> ApproverCheck {
        let Some(candidate) = candidate else {
            return ApproverCheck::deny(ApproverFailure::UnknownUser {
                user_id: user_id.to_string(),
            });
        };

        if !candidate.is_active {
            return ApproverCheck::deny(ApproverFailure::InactiveUser {
                email: candidate.email.clone(),
            });
        }

        if candidate.groups.is_disjoint(&self.approver_groups) {
            return ApproverCheck::deny(ApproverFailure::MissingApproverGroup {
                email: candidate.email.clone(),
                required_groups: self.approver_groups.iter().cloned().collect(),
            });
        }

        ApproverCheck::allow(format!("user `{}` may approve risk acceptances", candidate.email))
    }
}
