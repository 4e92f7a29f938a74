mod cli;
mod commands;
mod error;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable. `PROVEX_LOG` takes
/// the usual `EnvFilter` directives.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("PROVEX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let outcome = commands::run(&cli).await?;
    output::render(&outcome, cli.format, cli.pretty)?;

    if outcome.failed() {
        return Ok(ExitCode::from(3));
    }

    if cli.strict && outcome.warning_count() > 0 {
        return Err(CliError::StrictModeViolation {
            warning_count: outcome.warning_count(),
        });
    }

    Ok(ExitCode::SUCCESS)
}
