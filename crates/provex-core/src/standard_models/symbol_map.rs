//! CIK to ticker symbol mapping.

use crate::catalog::{CommandHandler, CommandSpec};
use crate::error::SchemaError;
use crate::registry::BindingSpec;
use crate::schema::{FieldSpec, FieldType, Schema};

pub const PATH: &str = "/regulators/sec/symbol_map";

pub fn query_schema() -> Result<Schema, SchemaError> {
    Schema::new(
        "SymbolMapQueryParams",
        vec![FieldSpec::new("query", FieldType::String)
            .required()
            .with_description("Central Index Key (CIK), with or without leading zeros.")],
    )
}

pub fn record_schema() -> Result<Schema, SchemaError> {
    Schema::new(
        "SymbolMapData",
        vec![FieldSpec::new("symbol", FieldType::String)
            .required()
            .with_description("Ticker symbol registered for the CIK.")],
    )
}

pub fn command(bindings: impl IntoIterator<Item = BindingSpec>) -> Result<CommandSpec, SchemaError> {
    let handler = CommandHandler::new("symbol_map", "SymbolMapData").with_inputs(["query"]);
    let spec = CommandSpec::new(PATH, query_schema()?, record_schema()?, handler)
        .with_description("Map a CIK number to its ticker symbol.");
    Ok(bindings
        .into_iter()
        .fold(spec, |spec, binding| spec.with_binding(binding)))
}
