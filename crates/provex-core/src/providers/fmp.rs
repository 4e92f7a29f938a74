//! Financial Modeling Prep.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode_parts, number, percent_to_fraction, record};
use crate::adapter::{BoxFuture, ExtractContext, Fetcher, QueryParams, RawPayload, TransformedData};
use crate::envelope::Warning;
use crate::error::CommandError;
use crate::fan_out::{collect_payload, fan_out};
use crate::http_client::{HttpAuth, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::registry::{BindingSpec, ProviderInfo};
use crate::schema::{FieldSpec, FieldType};
use crate::source::SourceError;
use crate::standard_models::DateRange;

pub const NAME: &str = "fmp";

const HISTORICAL_URL: &str = "https://financialmodelingprep.com/api/v3/historical-price-full";

pub fn provider_info() -> ProviderInfo {
    ProviderInfo::new(NAME, "Financial Modeling Prep market data.")
        .with_website("https://financialmodelingprep.com")
        .with_credential("api_key")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalQuery {
    pub symbols: Vec<String>,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Default, Deserialize)]
struct HistoricalResponse {
    #[serde(default)]
    historical: Vec<HistoricalBar>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoricalBar {
    date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    vwap: Option<f64>,
    change_percent: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoricalFetcher;

impl Fetcher for HistoricalFetcher {
    type Query = HistoricalQuery;

    fn transform_query(&self, params: &QueryParams) -> Result<HistoricalQuery, CommandError> {
        if let Some(interval) = params.str("interval")? {
            if interval != "1d" {
                return Err(CommandError::invalid_option(format!(
                    "{NAME} only serves daily bars; interval '{interval}' is not available"
                )));
            }
        }
        let range = DateRange::from_params(params)?;
        Ok(HistoricalQuery {
            symbols: params
                .symbols("symbol")?
                .into_iter()
                .map(String::from)
                .collect(),
            from: range.start_str(),
            to: range.end_str(),
        })
    }

    fn extract_data<'a>(
        &'a self,
        query: &'a HistoricalQuery,
        ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>> {
        Box::pin(async move {
            let auth = HttpAuth::QueryParam {
                name: String::from("apikey"),
                value: ctx.credential("api_key")?.to_owned(),
            };
            let items = fan_out(
                query.symbols.clone(),
                ctx.fan_out_limit(),
                ctx.item_deadline(),
                |symbol| {
                    let request = HttpRequest::get(format!(
                        "{HISTORICAL_URL}/{}",
                        urlencoding::encode(&symbol)
                    ))
                    .with_query("from", &query.from)
                    .with_query("to", &query.to)
                    .with_auth(&auth);
                    async move { ctx.send(request).await }
                },
            )
            .await;
            collect_payload(items)
        })
    }

    fn transform_data(
        &self,
        query: &HistoricalQuery,
        raw: &RawPayload,
    ) -> Result<TransformedData, SourceError> {
        let mut data = TransformedData::default();
        let tag_symbols = query.symbols.len() > 1;
        for (key, response) in decode_parts::<HistoricalResponse>(NAME, raw, &mut data)? {
            // Unknown symbols come back as `{}`.
            if response.historical.is_empty() {
                if let Some(symbol) = key {
                    data.warn(Warning::partial_fetch(symbol, "no data returned"));
                }
                continue;
            }
            // Newest first on the wire.
            for bar in response.historical.into_iter().rev() {
                let mut row = record([
                    ("date", Value::from(bar.date)),
                    ("open", number(bar.open)),
                    ("high", number(bar.high)),
                    ("low", number(bar.low)),
                    ("close", number(bar.close)),
                    ("volume", number(bar.volume)),
                    ("vwap", number(bar.vwap)),
                    ("change_percent", percent_to_fraction(bar.change_percent)),
                ]);
                if tag_symbols {
                    if let Some(symbol) = key {
                        row.insert(String::from("symbol"), Value::from(symbol));
                    }
                }
                data.push(row);
            }
        }
        Ok(data)
    }

    fn policy(&self) -> ProviderPolicy {
        ProviderPolicy::keyed_api(300)
    }
}

pub fn historical_binding() -> BindingSpec {
    BindingSpec::new(NAME, HistoricalFetcher)
        .with_record_field(
            FieldSpec::new("vwap", FieldType::Number)
                .with_description("Volume weighted average price of the day."),
        )
        .with_record_field(
            FieldSpec::new("change_percent", FieldType::Number)
                .with_description("Change from the previous close as a decimal fraction."),
        )
}
