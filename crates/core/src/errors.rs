use std::collections::BTreeMap;

use thiserror::Error;

use crate::authz::Action;
use crate::domain::risk_acceptance::AcceptanceState;
use crate::validation::ValidationErrors;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("illegal state transition from `{from}` to `{to}`")]
    InvalidAcceptanceTransition { from: AcceptanceState, to: AcceptanceState },
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("authentication required: {0}")]
    Authentication(String),
    #[error("permission denied: `{action}` on folder `{folder}`")]
    Authorization { action: Action, folder: String },
    #[error("{resource} `{id}` not found")]
    NotFound { resource: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<ValidationErrors> for ApplicationError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Domain(DomainError::Validation(errors))
    }
}

/// Error as surfaced to API callers: a machine-readable kind, a user-safe
/// message and, for validation failures, per-field detail.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("unauthenticated: {message}")]
    Unauthenticated { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("bad request: {message}")]
    BadRequest { message: String, fields: BTreeMap<String, Vec<String>>, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "authentication_error",
            Self::Forbidden { .. } => "authorization_error",
            Self::BadRequest { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal_error",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "Authentication credentials were not provided or are invalid.",
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested resource was not found.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Unauthenticated { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn fields(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        match self {
            Self::BadRequest { fields, .. } if !fields.is_empty() => Some(fields),
            _ => None,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::Unauthenticated { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Validation(errors)) => Self::BadRequest {
                message: "validation failed".to_owned(),
                fields: errors.fields().clone(),
                correlation_id,
            },
            ApplicationError::Domain(error @ DomainError::InvalidAcceptanceTransition { .. }) => {
                Self::BadRequest {
                    message: "validation failed".to_owned(),
                    fields: ValidationErrors::single("state", error.to_string()).fields().clone(),
                    correlation_id,
                }
            }
            ApplicationError::Domain(DomainError::InvariantViolation(message)) => {
                Self::BadRequest { message, fields: BTreeMap::new(), correlation_id }
            }
            ApplicationError::Authentication(message) => {
                Self::Unauthenticated { message, correlation_id }
            }
            error @ ApplicationError::Authorization { .. } => {
                Self::Forbidden { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::authz::Action;
    use crate::domain::risk_acceptance::AcceptanceState;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::validation::ValidationErrors;

    #[test]
    fn validation_error_maps_to_bad_request_with_fields() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "this field is required");
        errors.add("folder", "this field is required");

        let interface = ApplicationError::from(errors).into_interface("req-1");

        assert_eq!(interface.kind(), "validation_error");
        assert_eq!(interface.correlation_id(), "req-1");
        let fields = interface.fields().expect("fields");
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn illegal_transition_is_reported_on_state_field() {
        let interface = ApplicationError::from(DomainError::InvalidAcceptanceTransition {
            from: AcceptanceState::Revoked,
            to: AcceptanceState::Submitted,
        })
        .into_interface("req-2");

        let fields = interface.fields().expect("fields");
        assert_eq!(fields["state"], vec!["illegal state transition from `revoked` to `submitted`"]);
    }

    #[test]
    fn auth_errors_keep_their_kinds() {
        let unauthenticated =
            ApplicationError::Authentication("missing token".to_owned()).into_interface("req-3");
        let forbidden = ApplicationError::Authorization {
            action: Action::Delete,
            folder: "Global".to_owned(),
        }
        .into_interface("req-4");

        assert!(matches!(unauthenticated, InterfaceError::Unauthenticated { .. }));
        assert_eq!(unauthenticated.kind(), "authentication_error");
        assert!(matches!(forbidden, InterfaceError::Forbidden { .. }));
        assert_eq!(forbidden.user_message(), "You do not have permission to perform this action.");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn not_found_message_names_the_resource() {
        let interface = ApplicationError::NotFound { resource: "risk acceptance", id: "abc".into() }
            .into_interface("req-6");

        assert!(matches!(
            interface,
            InterfaceError::NotFound { ref message, .. } if message == "risk acceptance `abc` not found"
        ));
    }
}
