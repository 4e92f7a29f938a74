//! Secured Overnight Financing Rate.

use crate::catalog::{CommandHandler, CommandSpec};
use crate::error::SchemaError;
use crate::registry::BindingSpec;
use crate::schema::{FieldSpec, FieldType, Schema};

pub const PATH: &str = "/fixedincome/rate/sofr";

pub fn query_schema() -> Result<Schema, SchemaError> {
    Schema::new(
        "SOFRQueryParams",
        vec![
            FieldSpec::new("start_date", FieldType::Date)
                .with_description("First observation date, inclusive. Defaults to 90 days before end_date."),
            FieldSpec::new("end_date", FieldType::Date)
                .with_description("Last observation date, inclusive. Defaults to today."),
        ],
    )
}

pub fn record_schema() -> Result<Schema, SchemaError> {
    Schema::new(
        "SOFRData",
        vec![
            FieldSpec::new("date", FieldType::Date).required(),
            FieldSpec::new("rate", FieldType::Number)
                .required()
                .with_description("Rate as a decimal fraction (0.0531 is 5.31%)."),
        ],
    )
}

pub fn command(bindings: impl IntoIterator<Item = BindingSpec>) -> Result<CommandSpec, SchemaError> {
    let handler = CommandHandler::new("sofr", "SOFRData")
        .with_inputs(["start_date", "end_date", "provider"])
        .with_post_process(super::clip_to_range);
    let spec = CommandSpec::new(PATH, query_schema()?, record_schema()?, handler)
        .with_description("Secured Overnight Financing Rate, daily.");
    Ok(bindings
        .into_iter()
        .fold(spec, |spec, binding| spec.with_binding(binding)))
}
