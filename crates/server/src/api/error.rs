use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use riskgate_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
    pub correlation_id: String,
}

/// HTTP wrapper around [`InterfaceError`].
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        let interface = error.clone().into_interface(correlation_id);
        match &interface {
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
                error!(
                    event_name = "api.request.failed",
                    correlation_id = %correlation_id,
                    kind = interface.kind(),
                    error = %error,
                    "request failed"
                );
            }
            _ => {
                warn!(
                    event_name = "api.request.rejected",
                    correlation_id = %correlation_id,
                    kind = interface.kind(),
                    error = %error,
                    "request rejected"
                );
            }
        }
        Self(interface)
    }

    pub fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            fields: BTreeMap::new(),
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        // failures below the API never leak their detail
        let message = match &self.0 {
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
                self.0.user_message().to_string()
            }
            InterfaceError::Unauthenticated { message, .. }
            | InterfaceError::Forbidden { message, .. }
            | InterfaceError::BadRequest { message, .. }
            | InterfaceError::NotFound { message, .. } => message.clone(),
        };

        ErrorBody {
            kind: self.0.kind(),
            message,
            fields: self.0.fields().cloned(),
            correlation_id: self.0.correlation_id().to_string(),
        }
    }
}

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
