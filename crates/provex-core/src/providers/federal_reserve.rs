//! Federal Reserve Bank of New York markets API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{number, parse_json, percent_to_fraction, record};
use crate::adapter::{BoxFuture, ExtractContext, Fetcher, QueryParams, RawPayload, TransformedData};
use crate::error::CommandError;
use crate::http_client::HttpRequest;
use crate::provider_policy::ProviderPolicy;
use crate::registry::{BindingSpec, ProviderInfo};
use crate::schema::{FieldSpec, FieldType};
use crate::source::SourceError;
use crate::standard_models::DateRange;

pub const NAME: &str = "federal_reserve";

const SOFR_URL: &str = "https://markets.newyorkfed.org/api/rates/secured/sofr/search.json";

pub fn provider_info() -> ProviderInfo {
    ProviderInfo::new(NAME, "Federal Reserve Bank of New York reference rates.")
        .with_website("https://markets.newyorkfed.org")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SofrQuery {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Deserialize)]
struct RefRatesResponse {
    #[serde(rename = "refRates", default)]
    ref_rates: Vec<RefRate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefRate {
    effective_date: String,
    percent_rate: Option<f64>,
    percent_percentile1: Option<f64>,
    percent_percentile25: Option<f64>,
    percent_percentile75: Option<f64>,
    percent_percentile99: Option<f64>,
    volume_in_billions: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct SofrFetcher;

impl Fetcher for SofrFetcher {
    type Query = SofrQuery;

    fn transform_query(&self, params: &QueryParams) -> Result<SofrQuery, CommandError> {
        let range = DateRange::from_params(params)?;
        Ok(SofrQuery {
            start_date: range.start_str(),
            end_date: range.end_str(),
        })
    }

    fn extract_data<'a>(
        &'a self,
        query: &'a SofrQuery,
        ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>> {
        Box::pin(async move {
            let request = HttpRequest::get(SOFR_URL)
                .with_query("startDate", &query.start_date)
                .with_query("endDate", &query.end_date);
            Ok(RawPayload::single(ctx.send(request).await?))
        })
    }

    fn transform_data(
        &self,
        _query: &SofrQuery,
        raw: &RawPayload,
    ) -> Result<TransformedData, SourceError> {
        let mut data = TransformedData::default();
        for part in &raw.parts {
            let response: RefRatesResponse = parse_json(NAME, &part.body)?;
            for rate in response.ref_rates {
                data.push(record([
                    ("date", Value::from(rate.effective_date)),
                    ("rate", percent_to_fraction(rate.percent_rate)),
                    ("percentile_1", percent_to_fraction(rate.percent_percentile1)),
                    ("percentile_25", percent_to_fraction(rate.percent_percentile25)),
                    ("percentile_75", percent_to_fraction(rate.percent_percentile75)),
                    ("percentile_99", percent_to_fraction(rate.percent_percentile99)),
                    ("volume", number(rate.volume_in_billions.map(|billions| billions * 1e9))),
                ]));
            }
        }
        Ok(data)
    }

    fn policy(&self) -> ProviderPolicy {
        ProviderPolicy::public_api()
    }
}

pub fn sofr_binding() -> BindingSpec {
    let percentile = |name: &str, description: &str| {
        FieldSpec::new(name, FieldType::Number).with_description(description)
    };
    BindingSpec::new(NAME, SofrFetcher)
        .with_record_field(percentile("percentile_1", "Rate at the 1st volume-weighted percentile."))
        .with_record_field(percentile("percentile_25", "Rate at the 25th volume-weighted percentile."))
        .with_record_field(percentile("percentile_75", "Rate at the 75th volume-weighted percentile."))
        .with_record_field(percentile("percentile_99", "Rate at the 99th volume-weighted percentile."))
        .with_record_field(
            FieldSpec::new("volume", FieldType::Number)
                .with_description("Transaction volume underlying the rate, in dollars."),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_converted_to_fractions_and_volume_to_units() {
        let raw = RawPayload::single(
            r#"{"refRates":[{"effectiveDate":"2023-06-06","type":"SOFR","percentRate":5.06,
                "percentPercentile1":5.01,"percentPercentile25":5.03,"percentPercentile75":5.1,
                "percentPercentile99":5.15,"volumeInBillions":1488}]}"#,
        );
        let query = SofrQuery {
            start_date: String::from("2023-06-01"),
            end_date: String::from("2023-06-06"),
        };
        let data = SofrFetcher.transform_data(&query, &raw).expect("valid payload");

        let record = &data.records[0];
        assert_eq!(record["date"], "2023-06-06");
        let rate = record["rate"].as_f64().expect("rate is numeric");
        assert!((rate - 0.0506).abs() < 1e-12);
        let volume = record["volume"].as_f64().expect("volume is numeric");
        assert!((volume - 1.488e12).abs() < 1.0);
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let query = SofrQuery {
            start_date: String::from("2023-06-01"),
            end_date: String::from("2023-06-06"),
        };
        let error = SofrFetcher
            .transform_data(&query, &RawPayload::single("<html>"))
            .expect_err("not json");
        assert_eq!(error.code(), "source.decode");
    }
}
