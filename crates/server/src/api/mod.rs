pub mod error;
pub mod risk_acceptances;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use riskgate_core::approvals::ApproverPolicy;
use riskgate_core::config::ApprovalConfig;
use riskgate_db::repositories::SqlDirectoryRepository;
use riskgate_db::DbPool;

use crate::auth::Authenticator;
use crate::service::RiskAcceptanceService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RiskAcceptanceService>,
    pub authenticator: Arc<Authenticator>,
}

impl AppState {
    pub fn from_pool(pool: DbPool, approval: &ApprovalConfig) -> Self {
        let policy = ApproverPolicy::new(approval.approver_groups.iter().cloned());
        Self {
            authenticator: Arc::new(Authenticator::new(Arc::new(SqlDirectoryRepository::new(
                pool.clone(),
            )))),
            service: Arc::new(RiskAcceptanceService::from_pool(pool, policy)),
        }
    }
}

/// Risk acceptance routes, each reachable with and without a trailing slash.
pub fn router(state: AppState) -> Router {
    use risk_acceptances::{accept, create, delete, list, reject, retrieve, revoke, update};

    Router::new()
        .route("/risk-acceptances", get(list).post(create))
        .route("/risk-acceptances/", get(list).post(create))
        .route("/risk-acceptances/{id}", get(retrieve).patch(update).delete(delete))
        .route("/risk-acceptances/{id}/", get(retrieve).patch(update).delete(delete))
        .route("/risk-acceptances/{id}/accept", post(accept))
        .route("/risk-acceptances/{id}/accept/", post(accept))
        .route("/risk-acceptances/{id}/reject", post(reject))
        .route("/risk-acceptances/{id}/reject/", post(reject))
        .route("/risk-acceptances/{id}/revoke", post(revoke))
        .route("/risk-acceptances/{id}/revoke/", post(revoke))
        .with_state(state)
}
