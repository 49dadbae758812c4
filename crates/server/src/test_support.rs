//! Shared fixtures for handler tests: a migrated in-memory database, two
//! sibling folders under `Global` and one user per access profile.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use riskgate_core::authz::Role;
use riskgate_core::config::ApprovalConfig;
use riskgate_core::domain::directory::{ApiToken, ApiTokenId, GroupId, User, UserGroup};
use riskgate_core::domain::folder::{Folder, FolderId};
use riskgate_core::domain::risk::{
    Project, ProjectId, RiskAssessment, RiskAssessmentId, RiskMatrix, RiskMatrixId, RiskScenario,
    RiskScenarioId,
};
use riskgate_core::identity::hash_token;
use riskgate_db::repositories::{
    DirectoryRepository, FolderRepository, RiskRepository, SqlDirectoryRepository,
    SqlFolderRepository, SqlRiskRepository,
};
use riskgate_db::{connect_with_settings, migrations, DbPool};
use serde_json::Value;
use tower::ServiceExt;

use crate::api::{self, AppState};

pub struct TestUser {
    pub user: User,
    pub token: String,
}

pub struct TestWorld {
    pub pool: DbPool,
    pub app: Router,
    pub folder_a: Folder,
    pub folder_b: Folder,
    /// Analyst on every folder.
    pub analyst: TestUser,
    /// Member of the approver group.
    pub approver: TestUser,
    /// Another approver-group member, never assigned by the fixtures.
    pub backup_approver: TestUser,
    pub reader: TestUser,
    pub admin: TestUser,
    /// Analyst on folder B only.
    pub outsider: TestUser,
    /// Analyst on folder A, reader on folder B.
    pub mover: TestUser,
}

impl TestWorld {
    pub async fn new() -> Self {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let folders = SqlFolderRepository::new(pool.clone());
        let global = folders.find_by_name("Global").await.expect("query").expect("global");
        let folder_a = Folder::new("Folder A", Some(global.id));
        let folder_b = Folder::new("Folder B", Some(global.id));
        folders.save(folder_a.clone()).await.expect("save folder a");
        folders.save(folder_b.clone()).await.expect("save folder b");

        let directory = SqlDirectoryRepository::new(pool.clone());
        let b_analysts = local_group(&directory, "B analysts", folder_b.id, Role::Analyst).await;
        let a_analysts = local_group(&directory, "A analysts", folder_a.id, Role::Analyst).await;
        let b_readers = local_group(&directory, "B readers", folder_b.id, Role::Reader).await;

        let analyst = user_in(&directory, "analyst@test.com", &["BI-UG-GAN"], &[]).await;
        let approver = user_in(&directory, "approver@test.com", &["BI-UG-GVA"], &[]).await;
        let backup_approver = user_in(&directory, "backup@test.com", &["BI-UG-GVA"], &[]).await;
        let reader = user_in(&directory, "reader@test.com", &["BI-UG-GRE"], &[]).await;
        let outsider = user_in(&directory, "outsider@test.com", &[], &[b_analysts]).await;
        let mover = user_in(&directory, "mover@test.com", &[], &[a_analysts, b_readers]).await;

        let mut admin_user = User::new("admin@test.com");
        admin_user.is_superuser = true;
        let admin = with_token(&directory, admin_user).await;

        let app = api::router(AppState::from_pool(
            pool.clone(),
            &ApprovalConfig { approver_groups: vec!["BI-UG-GVA".to_string()] },
        ));

        Self {
            pool,
            app,
            folder_a,
            folder_b,
            analyst,
            approver,
            backup_approver,
            reader,
            admin,
            outsider,
            mover,
        }
    }

    pub async fn scenario_in(&self, folder_id: FolderId, name: &str) -> RiskScenarioId {
        let risks = SqlRiskRepository::new(self.pool.clone());
        let project = Project { id: ProjectId::new(), name: format!("{name} project"), folder_id };
        let matrix = RiskMatrix { id: RiskMatrixId::new(), name: "4x4".to_string(), folder_id };
        let assessment = RiskAssessment {
            id: RiskAssessmentId::new(),
            name: format!("{name} assessment"),
            project_id: project.id,
            risk_matrix_id: matrix.id,
        };
        let scenario = RiskScenario {
            id: RiskScenarioId::new(),
            name: name.to_string(),
            description: None,
            risk_assessment_id: assessment.id,
            threat_id: None,
        };
        let scenario_id = scenario.id;

        risks.save_project(project).await.expect("save project");
        risks.save_risk_matrix(matrix).await.expect("save matrix");
        risks.save_assessment(assessment).await.expect("save assessment");
        risks.save_scenario(scenario).await.expect("save scenario");
        scenario_id
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = self.app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }
}

async fn local_group(
    directory: &SqlDirectoryRepository,
    name: &str,
    folder_id: FolderId,
    role: Role,
) -> GroupId {
    let group = UserGroup {
        id: GroupId::new(),
        name: name.to_string(),
        folder_id,
        role,
        recursive: false,
        builtin: false,
    };
    let id = group.id;
    directory.save_group(group).await.expect("save group");
    id
}

async fn user_in(
    directory: &SqlDirectoryRepository,
    email: &str,
    builtin_groups: &[&str],
    groups: &[GroupId],
) -> TestUser {
    let user = with_token(directory, User::new(email)).await;
    for name in builtin_groups {
        let group = directory.find_group_by_name(name).await.expect("query").expect("builtin group");
        directory.add_member(group.id, user.user.id).await.expect("add member");
    }
    for group_id in groups {
        directory.add_member(*group_id, user.user.id).await.expect("add member");
    }
    user
}

async fn with_token(directory: &SqlDirectoryRepository, user: User) -> TestUser {
    let token = format!("token-{}", user.email);
    directory.save_user(user.clone()).await.expect("save user");
    directory
        .save_token(ApiToken {
            id: ApiTokenId::new(),
            user_id: user.id,
            token_hash: hash_token(&token),
            label: "test".to_string(),
            created_at: Utc::now(),
            expires_at: None,
        })
        .await
        .expect("save token");
    TestUser { user, token }
}
