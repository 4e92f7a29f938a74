//! SEC EDGAR submissions API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_json, record};
use crate::adapter::{BoxFuture, ExtractContext, Fetcher, QueryParams, RawPayload, TransformedData};
use crate::envelope::Warning;
use crate::error::CommandError;
use crate::http_client::HttpRequest;
use crate::provider_policy::ProviderPolicy;
use crate::registry::{BindingSpec, ProviderInfo};
use crate::schema::{FieldSpec, FieldType};
use crate::source::SourceError;

pub const NAME: &str = "sec";

const SUBMISSIONS_URL: &str = "https://data.sec.gov/submissions";

const CIK_DIGITS: usize = 10;

pub fn provider_info() -> ProviderInfo {
    ProviderInfo::new(NAME, "SEC EDGAR public filings data.").with_website("https://www.sec.gov")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionsQuery {
    /// Zero-padded ten digit CIK.
    pub cik: String,
    #[serde(skip)]
    pub use_cache: bool,
}

#[derive(Debug, Deserialize)]
struct Submissions {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tickers: Vec<String>,
}

/// Normalize a CIK to the ten digit form EDGAR uses in file names.
pub fn normalize_cik(input: &str) -> Result<String, CommandError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("CIK")
        .or_else(|| trimmed.strip_prefix("cik"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(CommandError::invalid_option(format!(
            "'{input}' is not a valid CIK; expected up to {CIK_DIGITS} digits"
        )));
    }
    let significant = digits.trim_start_matches('0');
    if significant.len() > CIK_DIGITS {
        return Err(CommandError::invalid_option(format!(
            "'{input}' is longer than {CIK_DIGITS} digits"
        )));
    }
    Ok(format!("{significant:0>width$}", width = CIK_DIGITS))
}

#[derive(Debug, Clone)]
pub struct SymbolMapFetcher {
    user_agent: String,
}

impl Default for SymbolMapFetcher {
    fn default() -> Self {
        Self {
            user_agent: format!("provex/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SymbolMapFetcher {
    /// EDGAR rejects requests without a descriptive User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Fetcher for SymbolMapFetcher {
    type Query = SubmissionsQuery;

    fn transform_query(&self, params: &QueryParams) -> Result<SubmissionsQuery, CommandError> {
        let query = params
            .str("query")?
            .ok_or_else(|| CommandError::invalid_option("'query' must name a CIK"))?;
        Ok(SubmissionsQuery {
            cik: normalize_cik(query)?,
            use_cache: params.bool("use_cache")?.unwrap_or(true),
        })
    }

    fn extract_data<'a>(
        &'a self,
        query: &'a SubmissionsQuery,
        ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>> {
        Box::pin(async move {
            let request = HttpRequest::get(format!("{SUBMISSIONS_URL}/CIK{}.json", query.cik))
                .with_header("user-agent", self.user_agent.as_str())
                .with_header("accept", "application/json");
            Ok(RawPayload::single(ctx.send(request).await?))
        })
    }

    fn transform_data(
        &self,
        query: &SubmissionsQuery,
        raw: &RawPayload,
    ) -> Result<TransformedData, SourceError> {
        let mut data = TransformedData::default();
        for part in &raw.parts {
            let submissions: Submissions = parse_json(NAME, &part.body)?;
            let mut tickers = submissions.tickers.into_iter();
            match tickers.next() {
                Some(symbol) => {
                    data.push(record([("symbol", Value::from(symbol))]));
                    let others: Vec<String> = tickers.collect();
                    if !others.is_empty() {
                        data.warn(Warning::notice(format!(
                            "CIK {} also trades as: {}",
                            query.cik,
                            others.join(", ")
                        )));
                    }
                }
                None => data.warn(Warning::notice(format!(
                    "CIK {} ({}) has no listed ticker",
                    query.cik,
                    submissions.name.as_deref().unwrap_or("unknown registrant")
                ))),
            }
        }
        Ok(data)
    }

    fn policy(&self) -> ProviderPolicy {
        ProviderPolicy::default()
            .with_quota(Duration::from_secs(1), 10)
            .with_cache_ttl(Duration::from_secs(24 * 60 * 60))
    }

    fn cacheable(&self, query: &SubmissionsQuery) -> bool {
        query.use_cache
    }
}

pub fn symbol_map_binding() -> BindingSpec {
    BindingSpec::new(NAME, SymbolMapFetcher::default()).with_query_field(
        FieldSpec::new("use_cache", FieldType::Boolean)
            .with_default(true)
            .with_description("Serve from the response cache when possible."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cik_is_zero_padded() {
        assert_eq!(normalize_cik("789019").expect("valid"), "0000789019");
        assert_eq!(normalize_cik("0000789019").expect("valid"), "0000789019");
        assert_eq!(normalize_cik("CIK320193").expect("valid"), "0000320193");
    }

    #[test]
    fn malformed_cik_is_invalid_option() {
        for input in ["", "MSFT", "12a4", "12345678901"] {
            assert!(
                matches!(normalize_cik(input), Err(CommandError::InvalidOption(_))),
                "{input}"
            );
        }
    }

    #[test]
    fn first_ticker_is_mapped_and_others_noted() {
        let query = SubmissionsQuery {
            cik: String::from("0001652044"),
            use_cache: true,
        };
        let raw = RawPayload::single(
            r#"{"cik":"1652044","name":"Alphabet Inc.","tickers":["GOOGL","GOOG"]}"#,
        );
        let data = SymbolMapFetcher::default()
            .transform_data(&query, &raw)
            .expect("valid payload");
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.records[0]["symbol"], "GOOGL");
        assert_eq!(data.warnings.len(), 1);
        assert!(data.warnings[0].message.contains("GOOG"));
    }
}
