use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use riskgate_core::domain::risk_acceptance::{Decision, RiskAcceptanceInput};
use riskgate_core::domain::RelatedObject;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::auth::Caller;
use crate::service::{ListFilter, ResolvedAcceptance};

/// Read shape of a risk acceptance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RiskAcceptanceView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub folder: RelatedObject,
    pub approver: Option<RelatedObject>,
    pub risk_scenarios: Vec<RelatedObject>,
    pub expiry_date: Option<NaiveDate>,
    pub accepted_date: Option<NaiveDate>,
    pub rejected_date: Option<NaiveDate>,
    pub revoked_date: Option<NaiveDate>,
    pub justification: Option<String>,
    pub state: &'static str,
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RiskAcceptanceView {
    pub fn new(resolved: ResolvedAcceptance, today: NaiveDate) -> Self {
        let ResolvedAcceptance { acceptance, folder, approver, risk_scenarios } = resolved;
        Self {
            id: acceptance.id.to_string(),
            is_expired: acceptance.is_expired_on(today),
            state: acceptance.state.label(),
            name: acceptance.name,
            description: acceptance.description,
            folder,
            approver,
            risk_scenarios,
            expiry_date: acceptance.expiry_date,
            accepted_date: acceptance.accepted_date,
            rejected_date: acceptance.rejected_date,
            revoked_date: acceptance.revoked_date,
            justification: acceptance.justification,
            created_at: acceptance.created_at,
            updated_at: acceptance.updated_at,
        }
    }
}

fn view(resolved: ResolvedAcceptance) -> RiskAcceptanceView {
    RiskAcceptanceView::new(resolved, Utc::now().date_naive())
}

fn payload(
    caller: &Caller,
    body: Result<Json<RiskAcceptanceInput>, JsonRejection>,
) -> Result<RiskAcceptanceInput, ApiError> {
    body.map(|Json(input)| input)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text(), &caller.correlation_id))
}

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<ListFilter>, QueryRejection>,
) -> Result<Json<Vec<RiskAcceptanceView>>, ApiError> {
    let Query(filter) = query
        .map_err(|rejection| ApiError::bad_request(rejection.body_text(), &caller.correlation_id))?;

    let acceptances = state
        .service
        .list(&caller, filter)
        .await
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))?;

    Ok(Json(acceptances.into_iter().map(view).collect()))
}

pub async fn retrieve(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<RiskAcceptanceView>, ApiError> {
    state
        .service
        .retrieve(&caller, &id)
        .await
        .map(|resolved| Json(view(resolved)))
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<RiskAcceptanceInput>, JsonRejection>,
) -> Result<(StatusCode, Json<RiskAcceptanceView>), ApiError> {
    let input = payload(&caller, body)?;

    state
        .service
        .create(&caller, input)
        .await
        .map(|resolved| (StatusCode::CREATED, Json(view(resolved))))
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<RiskAcceptanceInput>, JsonRejection>,
) -> Result<Json<RiskAcceptanceView>, ApiError> {
    let input = payload(&caller, body)?;

    state
        .service
        .update(&caller, &id, input)
        .await
        .map(|resolved| Json(view(resolved)))
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

pub async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .delete(&caller, &id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

async fn decide(
    state: AppState,
    caller: Caller,
    id: String,
    decision: Decision,
) -> Result<Json<RiskAcceptanceView>, ApiError> {
    state
        .service
        .decide(&caller, &id, decision)
        .await
        .map(|resolved| Json(view(resolved)))
        .map_err(|error| ApiError::from_application(error, &caller.correlation_id))
}

pub async fn accept(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<RiskAcceptanceView>, ApiError> {
    decide(state, caller, id, Decision::Accept).await
}

pub async fn reject(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<RiskAcceptanceView>, ApiError> {
    decide(state, caller, id, Decision::Reject).await
}

pub async fn revoke(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<RiskAcceptanceView>, ApiError> {
    decide(state, caller, id, Decision::Revoke).await
}
