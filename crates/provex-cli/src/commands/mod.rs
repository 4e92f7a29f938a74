mod catalog;
mod providers;
mod run;

use std::sync::Arc;

use provex_core::{builtin_catalog, Catalog, Credentials, ExecutorConfig, ResultEnvelope};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// What a subcommand produced.
pub enum Outcome {
    Envelope(ResultEnvelope),
    Listing(Value),
}

impl Outcome {
    pub fn warning_count(&self) -> usize {
        match self {
            Self::Envelope(envelope) => envelope.warnings().len(),
            Self::Listing(_) => 0,
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self, Self::Envelope(envelope) if !envelope.is_success())
    }
}

/// Shared state built once per process.
pub struct Context {
    pub catalog: Arc<Catalog>,
    pub credentials: Credentials,
    pub config: ExecutorConfig,
}

impl Context {
    pub fn load(cli: &Cli) -> Result<Self, CliError> {
        let config = ExecutorConfig::from_env()?;
        let catalog = builtin_catalog(&config)?;

        let mut credentials = Credentials::from_env(
            catalog
                .providers()
                .iter()
                .map(|info| (info.name.as_str(), info.credentials.as_slice())),
        );
        if let Some(path) = &cli.credentials {
            credentials = credentials.merge(Credentials::from_json_file(path)?);
        }
        debug!(?credentials, "credentials loaded");

        Ok(Self {
            catalog: Arc::new(catalog),
            credentials,
            config,
        })
    }
}

pub async fn run(cli: &Cli) -> Result<Outcome, CliError> {
    let context = Context::load(cli)?;
    match &cli.command {
        Command::Run(args) => run::run(args, &context).await,
        Command::Commands(args) => catalog::run(args, &context),
        Command::Providers => providers::run(&context),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use super::*;

    #[test]
    fn credentials_file_configures_keyed_providers() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"fred": {{"api_key": "test-key"}}}}"#).expect("write credentials");
        let path = file.path().to_string_lossy().into_owned();

        let cli = Cli::try_parse_from(["provex", "--credentials", path.as_str(), "providers"])
            .expect("valid invocation");
        let context = Context::load(&cli).expect("context loads");

        assert!(context
            .catalog
            .registry()
            .is_usable("fred", &context.credentials));
        assert!(!format!("{:?}", context.credentials).contains("test-key"));
    }

    #[test]
    fn unreadable_credentials_file_is_a_config_error() {
        let cli = Cli::try_parse_from([
            "provex",
            "--credentials",
            "/nonexistent/provex-credentials.json",
            "providers",
        ])
        .expect("valid invocation");
        let error = Context::load(&cli).err().expect("missing file fails");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn listing_outcomes_never_fail() {
        let outcome = Outcome::Listing(Value::Array(Vec::new()));
        assert!(!outcome.failed());
        assert_eq!(outcome.warning_count(), 0);
    }
}
