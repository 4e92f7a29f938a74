//! # Providers
//!
//! Built-in vendor adapters. Each module exposes the vendor's
//! [`ProviderInfo`](crate::registry::ProviderInfo) and one binding
//! constructor per command it serves.
//!
//! | Module | Vendor | Credentials | Commands |
//! |--------|--------|-------------|----------|
//! | [`federal_reserve`] | Federal Reserve Bank of New York | none | SOFR |
//! | [`fred`] | FRED (St. Louis Fed) | `api_key` | SOFR |
//! | [`sec`] | SEC EDGAR | none | CIK symbol map |
//! | [`yfinance`] | Yahoo Finance | none | equity historical |
//! | [`fmp`] | Financial Modeling Prep | `api_key` | equity historical |

pub mod federal_reserve;
pub mod fmp;
pub mod fred;
pub mod sec;
pub mod yfinance;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::adapter::{RawPayload, TransformedData};
use crate::envelope::Warning;
use crate::schema::Record;
use crate::source::SourceError;

pub(crate) fn parse_json<T: DeserializeOwned>(provider: &str, body: &str) -> Result<T, SourceError> {
    serde_json::from_str(body).map_err(|error| {
        SourceError::decode(format!("{provider} returned an unexpected payload: {error}"))
    })
}

/// Decode every part of a fan-out payload.
///
/// A part that does not decode becomes a partial-fetch warning on `data`.
/// The call fails only when no part decoded.
pub(crate) fn decode_parts<'r, T: DeserializeOwned>(
    provider: &str,
    raw: &'r RawPayload,
    data: &mut TransformedData,
) -> Result<Vec<(Option<&'r str>, T)>, SourceError> {
    let mut decoded = Vec::with_capacity(raw.parts.len());
    let mut first_error = None;
    for part in &raw.parts {
        match parse_json(provider, &part.body) {
            Ok(response) => decoded.push((part.key.as_deref(), response)),
            Err(error) => {
                let key = part.key.as_deref().unwrap_or(provider);
                data.warn(Warning::partial_fetch(key, &error));
                first_error.get_or_insert(error);
            }
        }
    }
    match first_error {
        Some(error) if decoded.is_empty() => Err(error),
        _ => Ok(decoded),
    }
}

pub(crate) fn record<I>(fields: I) -> Record
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    fields
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}

/// Vendors publish rates in percent; records carry decimal fractions.
pub(crate) fn percent_to_fraction(percent: Option<f64>) -> Value {
    percent.map_or(Value::Null, |value| Value::from(value / 100.0))
}

pub(crate) fn number(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::from)
}
