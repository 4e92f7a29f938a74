//! Federal Reserve Economic Data (FRED).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_json, percent_to_fraction, record};
use crate::adapter::{BoxFuture, ExtractContext, Fetcher, QueryParams, RawPayload, TransformedData};
use crate::error::CommandError;
use crate::http_client::{HttpAuth, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::registry::{BindingSpec, ProviderInfo};
use crate::schema::{FieldSpec, FieldType};
use crate::source::SourceError;
use crate::standard_models::DateRange;

pub const NAME: &str = "fred";

const OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// Marker FRED uses for an observation without a value.
const MISSING_VALUE: &str = ".";

pub fn provider_info() -> ProviderInfo {
    ProviderInfo::new(NAME, "Federal Reserve Economic Data, St. Louis Fed.")
        .with_website("https://fred.stlouisfed.org")
        .with_credential("api_key")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservationsQuery {
    pub series_id: String,
    pub observation_start: String,
    pub observation_end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// Single FRED series rendered as `{date, rate}` records.
#[derive(Debug, Clone)]
pub struct SeriesFetcher {
    series_id: &'static str,
}

impl SeriesFetcher {
    pub const fn new(series_id: &'static str) -> Self {
        Self { series_id }
    }
}

impl Fetcher for SeriesFetcher {
    type Query = ObservationsQuery;

    fn transform_query(&self, params: &QueryParams) -> Result<ObservationsQuery, CommandError> {
        let range = DateRange::from_params(params)?;
        let aggregation_method = params.str("aggregation_method")?.map(str::to_owned);
        let frequency = params.str("frequency")?.map(str::to_owned);
        if aggregation_method.is_some() && frequency.is_none() {
            return Err(CommandError::invalid_option(
                "'aggregation_method' requires 'frequency' to be set",
            ));
        }
        Ok(ObservationsQuery {
            series_id: self.series_id.to_owned(),
            observation_start: range.start_str(),
            observation_end: range.end_str(),
            frequency,
            aggregation_method,
        })
    }

    fn extract_data<'a>(
        &'a self,
        query: &'a ObservationsQuery,
        ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>> {
        Box::pin(async move {
            let api_key = ctx.credential("api_key")?;
            let mut request = HttpRequest::get(OBSERVATIONS_URL)
                .with_query("series_id", &query.series_id)
                .with_query("file_type", "json")
                .with_query("observation_start", &query.observation_start)
                .with_query("observation_end", &query.observation_end);
            if let Some(frequency) = &query.frequency {
                request = request.with_query("frequency", frequency);
            }
            if let Some(method) = &query.aggregation_method {
                request = request.with_query("aggregation_method", method);
            }
            let request = request.with_auth(&HttpAuth::QueryParam {
                name: String::from("api_key"),
                value: api_key.to_owned(),
            });
            Ok(RawPayload::single(ctx.send(request).await?))
        })
    }

    fn transform_data(
        &self,
        _query: &ObservationsQuery,
        raw: &RawPayload,
    ) -> Result<TransformedData, SourceError> {
        let mut data = TransformedData::default();
        for part in &raw.parts {
            let response: ObservationsResponse = parse_json(NAME, &part.body)?;
            for observation in response.observations {
                if observation.value.trim() == MISSING_VALUE {
                    continue;
                }
                let rate = match observation.value.trim().parse::<f64>() {
                    Ok(percent) => percent_to_fraction(Some(percent)),
                    Err(_) => Value::from(observation.value),
                };
                data.push(record([("date", Value::from(observation.date)), ("rate", rate)]));
            }
        }
        Ok(data)
    }

    fn policy(&self) -> ProviderPolicy {
        ProviderPolicy::keyed_api(120)
    }
}

pub fn sofr_binding() -> BindingSpec {
    BindingSpec::new(NAME, SeriesFetcher::new("SOFR"))
        .with_query_field(
            FieldSpec::new("frequency", FieldType::String)
                .with_choices(["d", "w", "bw", "m", "q", "a"])
                .with_description("Aggregate observations to a lower frequency."),
        )
        .with_query_field(
            FieldSpec::new("aggregation_method", FieldType::String)
                .with_choices(["avg", "sum", "eop"])
                .with_description("How observations are aggregated when 'frequency' is set."),
        )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::Params;

    fn params(value: Value) -> QueryParams {
        match value {
            Value::Object(map) => QueryParams::new("/fixedincome/rate/sofr", Params::new(), map),
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn aggregation_requires_frequency() {
        let fetcher = SeriesFetcher::new("SOFR");
        let error = fetcher
            .transform_query(&params(json!({"aggregation_method": "avg"})))
            .expect_err("frequency missing");
        assert!(matches!(error, CommandError::InvalidOption(_)));

        let query = fetcher
            .transform_query(&params(json!({"frequency": "w", "aggregation_method": "eop"})))
            .expect("valid combination");
        assert_eq!(query.frequency.as_deref(), Some("w"));
    }

    #[test]
    fn missing_observations_are_skipped() {
        let raw = RawPayload::single(
            r#"{"observations":[
                {"date":"2023-01-02","value":"."},
                {"date":"2023-01-03","value":"4.30"}
            ]}"#,
        );
        let query = SeriesFetcher::new("SOFR")
            .transform_query(&params(json!({"start_date": "2023-01-01", "end_date": "2023-01-03"})))
            .expect("valid query");
        let data = SeriesFetcher::new("SOFR")
            .transform_data(&query, &raw)
            .expect("valid payload");

        assert_eq!(data.records.len(), 1);
        let rate = data.records[0]["rate"].as_f64().expect("numeric");
        assert!((rate - 0.043).abs() < 1e-12);
    }
}
