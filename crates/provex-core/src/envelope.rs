use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::UtcDateTime;
use crate::error::{CommandError, ErrorKind, RequestFailure};
use crate::schema::{Params, Record};

pub const SCHEMA_VERSION: &str = "v1.0.0";

/// Category of a non-fatal degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    /// A record failed normalization and was removed.
    RecordDropped,
    /// An optional field could not be normalized and was set to null.
    FieldNulled,
    /// An argument matched no field of the command and was ignored.
    UnknownArgument,
    /// An argument belongs to another provider of the command.
    UnsupportedArgument,
    /// Part of a multi-request fetch failed.
    PartialFetch,
    /// A deprecated argument was supplied.
    Deprecated,
    /// Informational notice from a provider.
    ProviderNotice,
}

/// A non-fatal degradation attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub category: WarningCategory,
    pub message: String,
}

impl Warning {
    pub fn new(category: WarningCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn partial_fetch(key: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(
            WarningCategory::PartialFetch,
            format!("request for '{key}' failed: {reason}"),
        )
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self::new(WarningCategory::ProviderNotice, message)
    }
}

/// Metadata attached to every envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub request_id: String,
    pub schema_version: String,
    pub command: String,
    pub generated_at: UtcDateTime,
    pub duration_ms: u64,
    pub cache_hit: bool,
    pub record_count: usize,
    /// Upstream HTTP attempts, retries included.
    pub attempts: u32,
    /// Validated arguments as they were handed to the provider.
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub arguments: Params,
}

impl EnvelopeMeta {
    pub fn new(request_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            schema_version: String::from(SCHEMA_VERSION),
            command: command.into(),
            generated_at: UtcDateTime::now(),
            duration_ms: 0,
            cache_hit: false,
            record_count: 0,
            attempts: 0,
            arguments: Params::new(),
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_arguments(mut self, arguments: Params) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Structured error payload of a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub kind: ErrorKind,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RequestFailure>,
}

impl From<&CommandError> for EnvelopeError {
    fn from(error: &CommandError) -> Self {
        Self {
            kind: error.kind(),
            detail: error.to_string(),
            failure: error.request_failure(),
        }
    }
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for EnvelopeError {}

/// Uniform output of every command invocation.
///
/// A successful envelope carries at least one record and no error. A failed
/// envelope carries an error and no records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    results: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(default)]
    warnings: Vec<Warning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chart: Option<Value>,
    metadata: EnvelopeMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<EnvelopeError>,
}

impl ResultEnvelope {
    pub fn success(
        results: Vec<Record>,
        provider: impl Into<String>,
        warnings: Vec<Warning>,
        mut metadata: EnvelopeMeta,
    ) -> Self {
        metadata.record_count = results.len();
        Self {
            results,
            provider: Some(provider.into()),
            warnings,
            chart: None,
            metadata,
            error: None,
        }
    }

    pub fn failure(
        error: &CommandError,
        provider: Option<String>,
        warnings: Vec<Warning>,
        mut metadata: EnvelopeMeta,
    ) -> Self {
        metadata.record_count = 0;
        Self {
            results: Vec::new(),
            provider,
            warnings,
            chart: None,
            metadata,
            error: Some(EnvelopeError::from(error)),
        }
    }

    pub fn with_chart(mut self, chart: Value) -> Self {
        self.chart = Some(chart);
        self
    }

    pub fn results(&self) -> &[Record] {
        &self.results
    }

    /// Provider that served (or was selected for) the call.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn chart(&self) -> Option<&Value> {
        self.chart.as_ref()
    }

    pub fn metadata(&self) -> &EnvelopeMeta {
        &self.metadata
    }

    pub fn error(&self) -> Option<&EnvelopeError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<Record>, EnvelopeError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record() -> Record {
        let mut record = Record::new();
        record.insert(String::from("date"), json!("2024-01-02"));
        record.insert(String::from("rate"), json!(0.0531));
        record
    }

    #[test]
    fn success_envelope_counts_records() {
        let envelope = ResultEnvelope::success(
            vec![record()],
            "federal_reserve",
            Vec::new(),
            EnvelopeMeta::new("req-1", "/fixedincome/rate/sofr").with_cache_hit(true),
        );

        assert!(envelope.is_success());
        assert_eq!(envelope.metadata().record_count, 1);
        assert_eq!(envelope.metadata().schema_version, SCHEMA_VERSION);
        assert_eq!(envelope.provider(), Some("federal_reserve"));
    }

    #[test]
    fn failure_envelope_serializes_kind_and_detail() {
        let error = CommandError::ProviderRequest {
            provider: String::from("fmp"),
            failure: RequestFailure::Timeout,
            detail: String::from("deadline of 100ms elapsed"),
        };
        let envelope = ResultEnvelope::failure(
            &error,
            Some(String::from("fmp")),
            vec![Warning::notice("served from fallback")],
            EnvelopeMeta::new("req-2", "/equity/price/historical"),
        );

        let value = serde_json::to_value(&envelope).expect("envelope serializes");
        assert_eq!(value["error"]["kind"], json!("ProviderRequestError"));
        assert_eq!(value["error"]["failure"], json!("timeout"));
        assert_eq!(value["results"], json!([]));
        assert_eq!(value["warnings"][0]["category"], json!("provider_notice"));

        let decoded: ResultEnvelope = serde_json::from_value(value).expect("round trip");
        let error = decoded.into_result().expect_err("failed envelope");
        assert_eq!(error.kind, ErrorKind::ProviderRequestError);
    }
}
