//! CLI argument definitions for provex.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Execute a command path and print its result envelope |
//! | `commands` | List commands under a path prefix with provider coverage |
//! | `providers` | List providers and whether their credentials are configured |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings as failures |
//! | `--credentials` | none | JSON credentials file, overrides the environment |
//!
//! # Examples
//!
//! ```bash
//! provex run /fixedincome/rate/sofr --arg start_date=2023-01-01 --arg end_date=2023-06-06
//! provex run /regulators/sec/symbol_map --arg query=0000789019 --pretty
//! provex run /equity/price/historical --provider yfinance --arg symbol=AAPL,MSFT
//! provex commands /equity
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Provider-neutral data commands.
#[derive(Debug, Parser)]
#[command(name = "provex", author, version, about = "Provider-neutral data commands")]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// JSON file of `{"provider": {"field": "secret"}}` credentials.
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Summary lines followed by indented JSON data.
    Table,
    /// Single JSON document.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a command path.
    ///
    /// # Examples
    ///
    ///   provex run /fixedincome/rate/sofr --arg start_date=2023-01-01
    ///   provex run /equity/price/historical --arg symbol=AAPL --arg interval=1W
    Run(RunArgs),

    /// List registered commands under a path prefix.
    Commands(CommandsArgs),

    /// List providers, their credentials and the commands they serve.
    Providers,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Command path, e.g. /equity/price/historical.
    pub path: String,

    /// Provider to use instead of priority fallback.
    #[arg(long)]
    pub provider: Option<String>,

    /// Command argument as key=value. Values that parse as JSON keep their
    /// JSON type; anything else is passed as a string.
    #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_argument)]
    pub arguments: Vec<(String, String)>,

    /// Deadline for the whole invocation in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Neither read nor write the response cache.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,
}

#[derive(Debug, Args)]
pub struct CommandsArgs {
    /// Path prefix to list.
    #[arg(default_value = "/")]
    pub prefix: String,
}

fn parse_argument(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("argument '{raw}' has an empty key"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
