//! Yahoo Finance chart API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, Time};

use super::{decode_parts, number, record};
use crate::adapter::{BoxFuture, ExtractContext, Fetcher, QueryParams, RawPayload, TransformedData};
use crate::domain::{format_date, UtcDateTime};
use crate::envelope::Warning;
use crate::error::CommandError;
use crate::fan_out::{collect_payload, fan_out};
use crate::http_client::HttpRequest;
use crate::provider_policy::ProviderPolicy;
use crate::registry::{BindingSpec, ProviderInfo};
use crate::schema::{FieldSpec, FieldType};
use crate::source::SourceError;
use crate::standard_models::DateRange;

pub const NAME: &str = "yfinance";

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

pub fn provider_info() -> ProviderInfo {
    ProviderInfo::new(NAME, "Yahoo Finance public chart data.")
        .with_website("https://finance.yahoo.com")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    /// Prices adjusted for splits only, as Yahoo reports them.
    SplitsOnly,
    /// Prices additionally back-adjusted for dividends.
    SplitsAndDividends,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartQuery {
    pub symbols: Vec<String>,
    /// Yahoo interval code, e.g. `1d`, `60m`, `1wk`.
    pub interval: String,
    pub period1: i64,
    pub period2: i64,
    pub include_prepost: bool,
    pub adjustment: Adjustment,
}

impl ChartQuery {
    fn is_intraday(&self) -> bool {
        self.interval.ends_with('m')
    }
}

fn yahoo_interval(interval: &str) -> Result<&'static str, CommandError> {
    Ok(match interval {
        "1m" => "1m",
        "5m" => "5m",
        "15m" => "15m",
        "30m" => "30m",
        "1h" => "60m",
        "1d" => "1d",
        "1W" => "1wk",
        "1M" => "1mo",
        other => {
            return Err(CommandError::invalid_option(format!(
                "interval '{other}' is not supported by {NAME}"
            )))
        }
    })
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
    #[serde(default)]
    events: Events,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
    #[serde(default)]
    adjclose: Vec<AdjCloseSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseSeries {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct Events {
    #[serde(default)]
    dividends: HashMap<String, Dividend>,
    #[serde(default)]
    splits: HashMap<String, Split>,
}

#[derive(Debug, Deserialize)]
struct Dividend {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct Split {
    numerator: f64,
    denominator: f64,
    date: i64,
}

fn at(series: &[Option<f64>], index: usize) -> Option<f64> {
    series.get(index).copied().flatten()
}

#[derive(Debug, Clone, Default)]
pub struct ChartFetcher;

impl ChartFetcher {
    fn push_records(
        &self,
        query: &ChartQuery,
        symbol: Option<&str>,
        result: ChartResult,
        data: &mut TransformedData,
    ) {
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
        let adjclose = result
            .indicators
            .adjclose
            .into_iter()
            .next()
            .map(|series| series.adjclose)
            .unwrap_or_default();
        let dividends: HashMap<i64, f64> = result
            .events
            .dividends
            .into_values()
            .map(|dividend| (dividend.date, dividend.amount))
            .collect();
        let splits: HashMap<i64, f64> = result
            .events
            .splits
            .into_values()
            .filter(|split| split.denominator != 0.0)
            .map(|split| (split.date, split.numerator / split.denominator))
            .collect();

        for (index, timestamp) in result.timestamp.iter().copied().enumerate() {
            let Some(moment) = UtcDateTime::from_unix_timestamp(timestamp) else {
                continue;
            };
            let date = if query.is_intraday() {
                moment.format_rfc3339()
            } else {
                format_date(moment.date())
            };

            let close = at(&quote.close, index);
            let factor = match (query.adjustment, close, at(&adjclose, index)) {
                (Adjustment::SplitsAndDividends, Some(close), Some(adjusted)) if close != 0.0 => {
                    adjusted / close
                }
                _ => 1.0,
            };
            let scaled = |value: Option<f64>| number(value.map(|price| price * factor));

            let mut bar = record([
                ("date", Value::from(date)),
                ("open", scaled(at(&quote.open, index))),
                ("high", scaled(at(&quote.high, index))),
                ("low", scaled(at(&quote.low, index))),
                ("close", scaled(close)),
                (
                    "volume",
                    quote
                        .volume
                        .get(index)
                        .copied()
                        .flatten()
                        .map_or(Value::Null, Value::from),
                ),
                ("split_ratio", number(splits.get(&timestamp).copied())),
                ("dividend", number(dividends.get(&timestamp).copied())),
            ]);
            if let Some(symbol) = symbol {
                bar.insert(String::from("symbol"), Value::from(symbol));
            }
            data.push(bar);
        }
    }
}

impl Fetcher for ChartFetcher {
    type Query = ChartQuery;

    fn transform_query(&self, params: &QueryParams) -> Result<ChartQuery, CommandError> {
        let symbols = params
            .symbols("symbol")?
            .into_iter()
            .map(String::from)
            .collect();
        let range = DateRange::from_params(params)?;
        let interval = yahoo_interval(params.str("interval")?.unwrap_or("1d"))?;

        let adjustment = match (params.str("adjustment")?, params.bool("adjusted")?) {
            (Some("splits_and_dividends"), _) | (None, Some(true)) => Adjustment::SplitsAndDividends,
            (Some("splits_only") | None, _) => Adjustment::SplitsOnly,
            (Some(other), _) => {
                return Err(CommandError::invalid_option(format!(
                    "adjustment '{other}' is not supported by {NAME}"
                )))
            }
        };

        let period1 = range.start.with_time(Time::MIDNIGHT).assume_utc().unix_timestamp();
        // Yahoo's period2 is exclusive.
        let period2 = (range.end + Duration::days(1))
            .with_time(Time::MIDNIGHT)
            .assume_utc()
            .unix_timestamp();

        Ok(ChartQuery {
            symbols,
            interval: interval.to_owned(),
            period1,
            period2,
            include_prepost: params.bool("prepost")?.unwrap_or(false),
            adjustment,
        })
    }

    fn extract_data<'a>(
        &'a self,
        query: &'a ChartQuery,
        ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>> {
        Box::pin(async move {
            let items = fan_out(
                query.symbols.clone(),
                ctx.fan_out_limit(),
                ctx.item_deadline(),
                |symbol| {
                    let request = HttpRequest::get(format!(
                        "{CHART_URL}/{}",
                        urlencoding::encode(&symbol)
                    ))
                    .with_query("interval", &query.interval)
                    .with_query("period1", &query.period1.to_string())
                    .with_query("period2", &query.period2.to_string())
                    .with_query("includePrePost", if query.include_prepost { "true" } else { "false" })
                    .with_query("events", "div,splits");
                    async move { ctx.send(request).await }
                },
            )
            .await;
            collect_payload(items)
        })
    }

    fn transform_data(
        &self,
        query: &ChartQuery,
        raw: &RawPayload,
    ) -> Result<TransformedData, SourceError> {
        let mut data = TransformedData::default();
        let tag_symbols = query.symbols.len() > 1;
        for (key, response) in decode_parts::<ChartResponse>(NAME, raw, &mut data)? {
            let symbol = key.unwrap_or_default();
            if let Some(error) = response.chart.error {
                data.warn(Warning::partial_fetch(symbol, error.description));
                continue;
            }
            for result in response.chart.result.unwrap_or_default() {
                self.push_records(query, tag_symbols.then_some(symbol), result, &mut data);
            }
        }
        Ok(data)
    }

    fn policy(&self) -> ProviderPolicy {
        ProviderPolicy::public_api()
    }
}

pub fn historical_binding() -> BindingSpec {
    BindingSpec::new(NAME, ChartFetcher)
        .with_query_field(
            FieldSpec::new("adjustment", FieldType::String)
                .with_choices(["splits_only", "splits_and_dividends"])
                .with_description("Price adjustment applied to the bars. Defaults to splits_only."),
        )
        .with_query_field(
            FieldSpec::new("prepost", FieldType::Boolean)
                .with_default(false)
                .with_description("Include pre and post market bars for intraday intervals."),
        )
        .with_query_field(
            FieldSpec::new("adjusted", FieldType::Boolean)
                .deprecated("use 'adjustment' = 'splits_and_dividends' instead"),
        )
        .with_record_field(
            FieldSpec::new("split_ratio", FieldType::Number)
                .with_description("Split ratio effective on this bar."),
        )
        .with_record_field(
            FieldSpec::new("dividend", FieldType::Number)
                .with_description("Dividend paid on this bar, per share."),
        )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::Params;

    fn params(value: Value) -> QueryParams {
        match value {
            Value::Object(map) => QueryParams::new("/equity/price/historical", map, Params::new()),
            _ => panic!("params must be an object"),
        }
    }

    const BODY: &str = r#"{"chart":{"result":[{
        "timestamp":[1704205800,1704292200],
        "indicators":{
            "quote":[{"open":[187.15,184.22],"high":[188.44,185.88],"low":[183.89,183.43],
                      "close":[185.64,184.25],"volume":[82488700,58414500]}],
            "adjclose":[{"adjclose":[184.73,183.35]}]
        },
        "events":{"dividends":{"1704292200":{"amount":0.24,"date":1704292200}}}
    }],"error":null}}"#;

    #[test]
    fn intervals_map_to_yahoo_codes() {
        let query = ChartFetcher
            .transform_query(&params(json!({"symbol": ["AAPL"], "interval": "1W",
                "start_date": "2024-01-01", "end_date": "2024-01-31"})))
            .expect("valid query");
        assert_eq!(query.interval, "1wk");
        assert_eq!(query.period1, 1_704_067_200);
        assert_eq!(query.period2, 1_706_745_600);
    }

    #[test]
    fn deprecated_adjusted_flag_selects_dividend_adjustment() {
        let query = ChartFetcher
            .transform_query(&params(json!({"symbol": ["AAPL"], "adjusted": true})))
            .expect("valid query");
        assert_eq!(query.adjustment, Adjustment::SplitsAndDividends);
    }

    #[test]
    fn bars_carry_events_and_optional_adjustment() {
        let mut query = ChartFetcher
            .transform_query(&params(json!({"symbol": ["AAPL"], "start_date": "2024-01-02",
                "end_date": "2024-01-03"})))
            .expect("valid query");
        let mut raw = RawPayload::default();
        raw.push("AAPL", BODY);

        let data = ChartFetcher.transform_data(&query, &raw).expect("valid payload");
        assert_eq!(data.records.len(), 2);
        assert_eq!(data.records[0]["date"], "2024-01-02");
        assert_eq!(data.records[0]["close"], json!(185.64));
        assert_eq!(data.records[0]["dividend"], Value::Null);
        assert_eq!(data.records[1]["dividend"], json!(0.24));
        assert!(data.records[0].get("symbol").is_none());

        query.adjustment = Adjustment::SplitsAndDividends;
        let adjusted = ChartFetcher.transform_data(&query, &raw).expect("valid payload");
        let close = adjusted.records[0]["close"].as_f64().expect("numeric");
        assert!((close - 184.73).abs() < 1e-9);
    }

    #[test]
    fn vendor_error_becomes_partial_warning() {
        let query = ChartFetcher
            .transform_query(&params(json!({"symbol": ["AAPL", "ZZZZ"]})))
            .expect("valid query");
        let mut raw = RawPayload::default();
        raw.push("AAPL", BODY);
        raw.push(
            "ZZZZ",
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#,
        );

        let data = ChartFetcher.transform_data(&query, &raw).expect("valid payload");
        assert_eq!(data.records.len(), 2);
        assert_eq!(data.records[0]["symbol"], "AAPL");
        assert_eq!(data.warnings.len(), 1);
        assert!(data.warnings[0].message.contains("ZZZZ"));
    }

    #[test]
    fn undecodable_part_is_dropped_unless_every_part_is() {
        let query = ChartFetcher
            .transform_query(&params(json!({"symbol": ["AAPL", "NVDA"]})))
            .expect("valid query");
        let mut raw = RawPayload::default();
        raw.push("AAPL", BODY);
        raw.push("NVDA", "<html>rate limited</html>");

        let data = ChartFetcher.transform_data(&query, &raw).expect("one part decoded");
        assert_eq!(data.records.len(), 2);
        assert_eq!(data.warnings.len(), 1);
        assert!(data.warnings[0].message.contains("NVDA"));

        let mut broken = RawPayload::default();
        broken.push("NVDA", "<html>rate limited</html>");
        let error = ChartFetcher
            .transform_data(&query, &broken)
            .expect_err("nothing decoded");
        assert_eq!(error.code(), "source.decode");
    }
}
