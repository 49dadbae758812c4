use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::folder::FolderId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(correlation_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), actor: actor.into() }
    }
}

/// Audit trail entry written in the same transaction as the change it records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub correlation_id: String,
    pub event_type: String,
    pub actor: String,
    pub object_id: String,
    pub folder_id: Option<FolderId>,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        context: &AuditContext,
        event_type: impl Into<String>,
        object_id: impl ToString,
        folder_id: Option<FolderId>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id: context.correlation_id.clone(),
            event_type: event_type.into(),
            actor: context.actor.clone(),
            object_id: object_id.to_string(),
            folder_id,
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn payload_json(&self) -> String {
        serde_json::to_string(&self.metadata).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, AuditEvent, AuditOutcome};
    use crate::domain::folder::FolderId;

    #[test]
    fn event_carries_context_and_metadata() {
        let context = AuditContext::new("req-123", "analyst@example.com");
        let folder_id = FolderId::new();
        let event = AuditEvent::new(
            &context,
            "risk_acceptance.updated",
            "RA-1",
            Some(folder_id),
            AuditOutcome::Success,
        )
        .with_metadata("from", "submitted")
        .with_metadata("to", "accepted");

        assert_eq!(event.correlation_id, "req-123");
        assert_eq!(event.actor, "analyst@example.com");
        assert_eq!(event.folder_id, Some(folder_id));
        assert_eq!(event.payload_json(), r#"{"from":"submitted","to":"accepted"}"#);
    }
}
