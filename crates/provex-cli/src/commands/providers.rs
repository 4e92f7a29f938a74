use serde_json::{json, Value};

use crate::error::CliError;

use super::{Context, Outcome};

pub fn run(context: &Context) -> Result<Outcome, CliError> {
    let catalog = &context.catalog;
    let mut coverage = catalog.provider_coverage();
    let entries = catalog
        .providers()
        .iter()
        .map(|info| {
            json!({
                "name": info.name,
                "description": info.description,
                "website": info.website,
                "credentials": info.credentials,
                "configured": catalog.registry().is_usable(&info.name, &context.credentials),
                "commands": coverage.remove(&info.name).unwrap_or_default(),
            })
        })
        .collect();
    Ok(Outcome::Listing(Value::Array(entries)))
}
