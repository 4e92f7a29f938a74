use serde_json::{json, Value};

use crate::cli::CommandsArgs;
use crate::error::CliError;

use super::{Context, Outcome};

pub fn run(args: &CommandsArgs, context: &Context) -> Result<Outcome, CliError> {
    let catalog = &context.catalog;
    if catalog.tree().find(&args.prefix).is_none() {
        return Err(CliError::InvalidArgument(format!(
            "no commands under '{}'",
            args.prefix
        )));
    }

    let registry = catalog.registry();
    let entries = catalog
        .commands_under(&args.prefix)
        .into_iter()
        .map(|command| -> Result<Value, serde_json::Error> {
            Ok(json!({
                "path": command.path(),
                "description": command.description(),
                "providers": command.providers(),
                "query": serde_json::to_value(command.combined_query_schema())?,
                "record": serde_json::to_value(command.record_schema())?,
                "field_providers": registry.field_providers(command),
            }))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Outcome::Listing(Value::Array(entries)))
}
