//! Bearer-token authentication for the REST surface.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use riskgate_core::authz::Identity;
use riskgate_core::errors::ApplicationError;
use riskgate_core::identity::{hash_token, parse_authorization_header};
use riskgate_db::repositories::DirectoryRepository;
use tracing::debug;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::AppState;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Resolves raw bearer tokens to identities.
pub struct Authenticator {
    directory: Arc<dyn DirectoryRepository>,
}

impl Authenticator {
    pub fn new(directory: Arc<dyn DirectoryRepository>) -> Self {
        Self { directory }
    }

    pub async fn authenticate(&self, header: Option<&str>) -> Result<Identity, ApplicationError> {
        let raw = header
            .and_then(parse_authorization_header)
            .ok_or_else(|| ApplicationError::Authentication("missing bearer token".to_string()))?;

        self.directory
            .find_identity_by_token_hash(&hash_token(raw), Utc::now())
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?
            .ok_or_else(|| ApplicationError::Authentication("invalid or expired token".to_string()))
    }
}

/// The authenticated caller of a request. Extract it before any other
/// request input so that anonymous calls fail the same way everywhere.
#[derive(Clone, Debug)]
pub struct Caller {
    pub identity: Identity,
    pub correlation_id: String,
}

impl Caller {
    pub fn actor(&self) -> &str {
        &self.identity.email
    }
}

fn correlation_id(parts: &Parts) -> String {
    parts
        .headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);
        let header = parts.headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());

        let identity = state
            .authenticator
            .authenticate(header)
            .await
            .map_err(|error| ApiError::from_application(error, &correlation_id))?;

        debug!(
            event_name = "api.request.authenticated",
            correlation_id = %correlation_id,
            user_id = %identity.user_id,
            "caller authenticated"
        );

        Ok(Self { identity, correlation_id })
    }
}
