use std::process::ExitCode;

fn main() -> ExitCode {
    riskgate_cli::run()
}
