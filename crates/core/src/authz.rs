//! Folder-scoped authorization.
//!
//! Every handler calls [`authorize`] with the caller identity, the action it
//! is about to perform and the scope of the target folder. No other code path
//! grants access.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::directory::UserId;
use crate::domain::folder::{Folder, FolderId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
    Approve,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Add => "add",
            Self::Change => "change",
            Self::Delete => "delete",
            Self::Approve => "approve",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named bundle of actions granted through group membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Approver,
    Analyst,
    Reader,
}

impl Role {
    pub fn allows(self, action: Action) -> bool {
        match self {
            Self::Administrator => true,
            Self::Approver => matches!(action, Action::View | Action::Approve),
            Self::Analyst => {
                matches!(action, Action::View | Action::Add | Action::Change | Action::Delete)
            }
            Self::Reader => action == Action::View,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Approver => "approver",
            Self::Analyst => "analyst",
            Self::Reader => "reader",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "administrator" => Ok(Self::Administrator),
            "approver" => Ok(Self::Approver),
            "analyst" => Ok(Self::Analyst),
            "reader" => Ok(Self::Reader),
            other => Err(DomainError::InvariantViolation(format!("unknown role `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderGrant {
    pub folder_id: FolderId,
    pub role: Role,
    pub recursive: bool,
}

/// The authenticated caller attached to every request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub is_superuser: bool,
    pub grants: Vec<FolderGrant>,
}

/// A folder together with its ancestor chain, parent first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderScope {
    pub folder_id: FolderId,
    pub ancestors: Vec<FolderId>,
}

impl FolderScope {
    /// True when `folder_id` is this folder or one of its ancestors.
    pub fn is_within(&self, folder_id: FolderId) -> bool {
        self.folder_id == folder_id || self.ancestors.contains(&folder_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny,
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

pub fn authorize(identity: &Identity, action: Action, scope: &FolderScope) -> AccessDecision {
    if identity.is_superuser {
        return AccessDecision::Allow;
    }

    let granted = identity.grants.iter().any(|grant| {
        let covers = grant.folder_id == scope.folder_id
            || (grant.recursive && scope.ancestors.contains(&grant.folder_id));
        covers && grant.role.allows(action)
    });

    if granted {
        AccessDecision::Allow
    } else {
        AccessDecision::Deny
    }
}

/// In-memory view of the folder hierarchy used to build scopes.
#[derive(Clone, Debug, Default)]
pub struct FolderTree {
    folders: HashMap<FolderId, Folder>,
}

impl FolderTree {
    pub fn new(folders: Vec<Folder>) -> Self {
        Self { folders: folders.into_iter().map(|folder| (folder.id, folder)).collect() }
    }

    pub fn get(&self, id: FolderId) -> Option<&Folder> {
        self.folders.get(&id)
    }

    pub fn scope(&self, id: FolderId) -> Option<FolderScope> {
        let folder = self.folders.get(&id)?;
        let mut ancestors = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut cursor = folder.parent_id;

        while let Some(parent_id) = cursor {
            // a cycle in stored data must not hang the request
            if !seen.insert(parent_id) {
                break;
            }
            ancestors.push(parent_id);
            cursor = self.folders.get(&parent_id).and_then(|parent| parent.parent_id);
        }

        Some(FolderScope { folder_id: id, ancestors })
    }

    /// Every folder on which `identity` may perform `action`.
    pub fn permitted(&self, identity: &Identity, action: Action) -> BTreeSet<FolderId> {
        self.folders
            .keys()
            .filter_map(|id| self.scope(*id))
            .filter(|scope| authorize(identity, action, scope).is_allowed())
            .map(|scope| scope.folder_id)
            .collect()
    }
}
