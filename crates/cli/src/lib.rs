pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use riskgate_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "riskgate",
    about = "Riskgate operator CLI",
    long_about = "Operate the Riskgate database, demo fixtures, config inspection and API tokens.",
    after_help = "Examples:\n  riskgate migrate\n  riskgate doctor --json\n  riskgate issue-token --email approver@riskgate.local"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a riskgate.toml file (must exist when given)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset and verify it")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Issue an API token for an existing user; the raw token is printed once")]
    IssueToken {
        #[arg(long, help = "Email of the user the token authenticates as")]
        email: String,
        #[arg(long, default_value = "cli", help = "Free-form label stored with the token")]
        label: String,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            ..LoadOptions::default()
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Seed => commands::seed::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::IssueToken { email, label } => commands::issue_token::run(options, &email, &label),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
