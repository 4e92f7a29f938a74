//! Installation of the built-in providers and standard commands.

use tracing::info;

use crate::catalog::{Catalog, CatalogBuilder, CommandSpec};
use crate::config::ExecutorConfig;
use crate::error::{LoadingError, SchemaError};
use crate::providers::{federal_reserve, fmp, fred, sec, yfinance};
use crate::registry::ProviderInfo;
use crate::standard_models::{equity_historical, sofr, symbol_map};

/// Metadata of every built-in provider, in registration order.
pub fn builtin_providers() -> Vec<ProviderInfo> {
    vec![
        fred::provider_info(),
        federal_reserve::provider_info(),
        sec::provider_info(),
        fmp::provider_info(),
        yfinance::provider_info(),
    ]
}

/// Built-in commands. Binding order is the default fallback order.
pub fn builtin_commands() -> Result<Vec<CommandSpec>, SchemaError> {
    Ok(vec![
        sofr::command([fred::sofr_binding(), federal_reserve::sofr_binding()])?,
        symbol_map::command([sec::symbol_map_binding()])?,
        equity_historical::command([fmp::historical_binding(), yfinance::historical_binding()])?,
    ])
}

/// Register every built-in extension and freeze the result.
pub fn builtin_catalog(config: &ExecutorConfig) -> Result<Catalog, LoadingError> {
    let mut builder = CatalogBuilder::new(config.load_mode)
        .with_priorities(config.provider_priorities.clone());
    for provider in builtin_providers() {
        builder.provider(provider)?;
    }
    for command in builtin_commands()? {
        builder.register(command)?;
    }
    let catalog = builder.build();
    info!(
        commands = catalog.commands().len(),
        providers = catalog.providers().len(),
        skipped = catalog.skipped().len(),
        "catalog loaded"
    );
    Ok(catalog)
}
