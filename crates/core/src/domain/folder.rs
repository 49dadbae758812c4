use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::uuid_id;

uuid_id!(
    /// Identifier of a tenancy folder.
    FolderId
);

/// Name of the root folder created by the baseline migration.
pub const GLOBAL_FOLDER_NAME: &str = "Global";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<FolderId>,
    pub builtin: bool,
    pub created_at: DateTime<Utc>,
}

impl Folder {
    pub fn new(name: impl Into<String>, parent_id: Option<FolderId>) -> Self {
        Self {
            id: FolderId::new(),
            name: name.into(),
            description: None,
            parent_id,
            builtin: false,
            created_at: Utc::now(),
        }
    }

    pub fn display_label(&self) -> &str {
        &self.name
    }
}
