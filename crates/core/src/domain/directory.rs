use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::folder::FolderId;
use super::uuid_id;
use crate::authz::Role;

uuid_id!(UserId);
uuid_id!(GroupId);
uuid_id!(ApiTokenId);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into().trim().to_ascii_lowercase(),
            first_name: None,
            last_name: None,
            is_active: true,
            is_superuser: false,
            created_at: Utc::now(),
        }
    }

    pub fn display_label(&self) -> &str {
        &self.email
    }
}

/// A role group. Members receive `role` on `folder_id`, and on every
/// descendant folder when `recursive` is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: GroupId,
    pub name: String,
    pub folder_id: FolderId,
    pub role: Role,
    pub recursive: bool,
    pub builtin: bool,
}

/// Persisted API token. Only the SHA-256 digest of the raw token is stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: ApiTokenId,
    pub user_id: UserId,
    pub token_hash: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}
