use riskgate_core::config::LoadOptions;
use riskgate_db::{AcceptanceSeedInfo, DemoDataset};

use crate::commands::{exit, load_config, migrated_pool, runtime, CommandResult, StepError};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;

        let seed_result = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), exit::MIGRATION))?;
        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), exit::VERIFICATION))?;

        let run_result: Result<SeedOutput, StepError> = if verification.all_present {
            Ok(SeedOutput {
                users: seed_result.users_seeded,
                acceptances: seed_result.acceptances_seeded,
            })
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), exit::VERIFICATION))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => CommandResult::success("seed", output.render()),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

struct SeedOutput {
    users: Vec<&'static str>,
    acceptances: Vec<AcceptanceSeedInfo>,
}

impl SeedOutput {
    fn render(&self) -> String {
        let acceptances = self
            .acceptances
            .iter()
            .map(|seed| format!("  - {} [{}] {} ({})", seed.id, seed.state, seed.name, seed.description))
            .collect::<Vec<_>>();
        format!(
            "demo dataset loaded\nusers: {}\nrisk acceptances:\n{}",
            self.users.join(", "),
            acceptances.join("\n")
        )
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
