//! Historical OHLCV bars for one or more equities.

use crate::catalog::{CommandHandler, CommandSpec};
use crate::error::SchemaError;
use crate::registry::BindingSpec;
use crate::schema::{FieldSpec, FieldType, Schema};

pub const PATH: &str = "/equity/price/historical";

pub const INTERVALS: [&str; 8] = ["1m", "5m", "15m", "30m", "1h", "1d", "1W", "1M"];

pub fn query_schema() -> Result<Schema, SchemaError> {
    Schema::new(
        "EquityHistoricalQueryParams",
        vec![
            FieldSpec::new("symbol", FieldType::StringList)
                .required()
                .with_description("One or more tickers; a comma-separated string is accepted."),
            FieldSpec::new("start_date", FieldType::Date),
            FieldSpec::new("end_date", FieldType::Date),
            FieldSpec::new("interval", FieldType::String)
                .with_default("1d")
                .with_choices(INTERVALS),
        ],
    )
}

pub fn record_schema() -> Result<Schema, SchemaError> {
    Schema::new(
        "EquityHistoricalData",
        vec![
            FieldSpec::new("date", FieldType::String)
                .required()
                .with_description("ISO date for daily bars, RFC3339 UTC timestamp for intraday bars."),
            FieldSpec::new("open", FieldType::Number).required(),
            FieldSpec::new("high", FieldType::Number).required(),
            FieldSpec::new("low", FieldType::Number).required(),
            FieldSpec::new("close", FieldType::Number).required(),
            FieldSpec::new("volume", FieldType::Integer),
            FieldSpec::new("symbol", FieldType::String)
                .with_description("Set when more than one symbol was requested."),
        ],
    )
}

pub fn command(bindings: impl IntoIterator<Item = BindingSpec>) -> Result<CommandSpec, SchemaError> {
    let handler = CommandHandler::new("historical", "EquityHistoricalData").with_inputs([
        "symbol",
        "start_date",
        "end_date",
        "interval",
        "provider",
    ]);
    let spec = CommandSpec::new(PATH, query_schema()?, record_schema()?, handler)
        .with_description("Historical price bars.");
    Ok(bindings
        .into_iter()
        .fold(spec, |spec, binding| spec.with_binding(binding)))
}
