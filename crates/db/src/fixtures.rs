use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Seeded risk acceptances and the facts `verify` checks about them.
const SEED_ACCEPTANCES: &[AcceptanceSeedContract] = &[
    AcceptanceSeedContract {
        id: "00000000-0000-4000-8000-000000000501",
        name: "Legacy VPN exception",
        state: "submitted",
        folder_id: DEMO_DOMAIN_ID,
        scenario_count: 1,
        description: "Submitted acceptance awaiting the demo approver",
    },
    AcceptanceSeedContract {
        id: "00000000-0000-4000-8000-000000000502",
        name: "Unsupported OS exception",
        state: "accepted",
        folder_id: DEMO_DOMAIN_ID,
        scenario_count: 0,
        description: "Accepted acceptance that has already expired",
    },
];

const DEMO_DOMAIN_ID: &str = "00000000-0000-4000-8000-000000000201";

const SEED_FOLDER_IDS: &[&str] = &[DEMO_DOMAIN_ID, "00000000-0000-4000-8000-000000000202"];

/// Demo users and the built-in group each one belongs to.
const SEED_USERS: &[(&str, &str)] = &[
    ("admin@riskgate.local", "BI-UG-ADM"),
    ("approver@riskgate.local", "BI-UG-GVA"),
    ("analyst@riskgate.local", "BI-UG-GAN"),
    ("reader@riskgate.local", "BI-UG-GRE"),
];

/// Demo dataset: two folders under `Global`, one user per built-in group,
/// a scenario chain and two risk acceptances.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let acceptances_seeded = SEED_ACCEPTANCES
            .iter()
            .map(|acceptance| AcceptanceSeedInfo {
                id: acceptance.id,
                name: acceptance.name,
                state: acceptance.state,
                description: acceptance.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult {
            folders_seeded: SEED_FOLDER_IDS.len(),
            users_seeded: SEED_USERS.iter().map(|(email, _)| *email).collect(),
            acceptances_seeded,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for folder_id in SEED_FOLDER_IDS {
            let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM folder WHERE id = ?1)")
                .bind(*folder_id)
                .fetch_one(pool)
                .await?;
            checks.push((*folder_id, exists == 1));
        }

        for (email, group) in SEED_USERS {
            let member: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM app_user u
                     JOIN user_group_member m ON m.user_id = u.id
                     JOIN user_group g ON g.id = m.group_id
                     WHERE u.email = ?1 AND g.name = ?2 AND u.is_active = 1
                 )",
            )
            .bind(*email)
            .bind(*group)
            .fetch_one(pool)
            .await?;
            checks.push((*email, member == 1));
        }

        for acceptance in SEED_ACCEPTANCES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM risk_acceptance WHERE id = ?1 AND state = ?2 AND folder_id = ?3
                 )",
            )
            .bind(acceptance.id)
            .bind(acceptance.state)
            .bind(acceptance.folder_id)
            .fetch_one(pool)
            .await?;
            checks.push((acceptance.name, exists == 1));

            let links: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM risk_acceptance_scenario WHERE risk_acceptance_id = ?1",
            )
            .bind(acceptance.id)
            .fetch_one(pool)
            .await?;
            checks.push((acceptance.scenario_label(), links == acceptance.scenario_count));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct AcceptanceSeedContract {
    id: &'static str,
    name: &'static str,
    state: &'static str,
    folder_id: &'static str,
    scenario_count: i64,
    description: &'static str,
}

impl AcceptanceSeedContract {
    fn scenario_label(&self) -> &'static str {
        match self.state {
            "submitted" => "submitted-acceptance-scenarios",
            _ => "accepted-acceptance-scenarios",
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub folders_seeded: usize,
    pub users_seeded: Vec<&'static str>,
    pub acceptances_seeded: Vec<AcceptanceSeedInfo>,
}

#[derive(Debug)]
pub struct AcceptanceSeedInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub state: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
