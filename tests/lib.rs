// Shared fixtures for the integration tests.
use provex_core::{
    BindingSpec, BoxFuture, CommandError, CommandHandler, CommandSpec, ExtractContext, FieldSpec,
    FieldType, Fetcher, QueryParams, RawPayload, Schema, SourceError, TransformedData,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct ConstantQuery {
    pub series: String,
}

/// Offline plugin that answers every query with two fixed observations.
pub struct ConstantFetcher;

impl Fetcher for ConstantFetcher {
    type Query = ConstantQuery;

    fn transform_query(&self, params: &QueryParams) -> Result<ConstantQuery, CommandError> {
        let series = params
            .str("series")?
            .ok_or_else(|| CommandError::invalid_option("'series' is required"))?;
        Ok(ConstantQuery {
            series: series.to_owned(),
        })
    }

    fn extract_data<'a>(
        &'a self,
        query: &'a ConstantQuery,
        _ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>> {
        Box::pin(async move {
            Ok(RawPayload::single(
                json!([
                    {"when": "2024-01-02", "level": "1.5", "series": query.series},
                    {"when": "2024-01-03", "level": 1.75, "series": query.series},
                ])
                .to_string(),
            ))
        })
    }

    fn transform_data(
        &self,
        _query: &ConstantQuery,
        raw: &RawPayload,
    ) -> Result<TransformedData, SourceError> {
        let mut data = TransformedData::default();
        for part in &raw.parts {
            let rows: Vec<Value> = serde_json::from_str(&part.body)
                .map_err(|error| SourceError::decode(error.to_string()))?;
            for row in rows {
                if let Value::Object(record) = row {
                    data.push(record);
                }
            }
        }
        Ok(data)
    }
}

pub fn constant_query_schema() -> Schema {
    Schema::new(
        "ConstantQueryParams",
        vec![FieldSpec::new("series", FieldType::String).required()],
    )
    .expect("valid query schema")
}

pub fn constant_record_schema() -> Schema {
    Schema::new(
        "ConstantData",
        vec![
            FieldSpec::new("date", FieldType::Date)
                .required()
                .with_alias("when"),
            FieldSpec::new("value", FieldType::Number)
                .required()
                .with_alias("level"),
        ],
    )
    .expect("valid record schema")
}

/// A constant command at `path` with no bindings yet.
pub fn constant_command(path: &str) -> CommandSpec {
    CommandSpec::new(
        path,
        constant_query_schema(),
        constant_record_schema(),
        CommandHandler::new("constant", "ConstantData").with_inputs(["series"]),
    )
    .with_description("Fixed observations for tests.")
}

/// A constant command at `path` served by `provider`.
pub fn constant_spec(path: &str, provider: &str) -> CommandSpec {
    constant_command(path).with_binding(BindingSpec::new(provider, ConstantFetcher))
}
