//! Provider adapter contract.
//!
//! Every vendor implements the same three stages for each command it serves:
//!
//! | Stage | Method | Failure |
//! |-------|--------|---------|
//! | 1 | [`Fetcher::transform_query`] | [`CommandError`] (caller error) |
//! | 2 | [`Fetcher::extract_data`] | [`SourceError`] (transport) |
//! | 3 | [`Fetcher::transform_data`] | [`SourceError`] (undecodable payload) |
//!
//! Stage 1 is pure. Stage 2 is the only stage allowed to perform I/O; it
//! goes through [`ExtractContext::send`], which applies the vendor's quota
//! and retry policy. Stage 3 is pure and reports per-record problems as
//! warnings rather than failing the call.
//!
//! [`ProviderAdapter`] is the object-safe form used by the registry. Any
//! [`Fetcher`] gets it through a blanket impl.

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;
use tokio::time::Instant;

use crate::credentials::ProviderCredentials;
use crate::domain::{parse_date, Symbol};
use crate::envelope::Warning;
use crate::error::CommandError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::provider_policy::ProviderPolicy;
use crate::retry::{retry, RetryConfig};
use crate::schema::{Params, Record};
use crate::source::SourceError;
use crate::throttling::Throttle;

const ITEM_MARGIN_DIVISOR: u32 = 10;
const MAX_ITEM_MARGIN: Duration = Duration::from_millis(500);

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Validated parameters split into standard and provider-specific parts.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    command: String,
    standard: Params,
    extra: Params,
}

impl QueryParams {
    pub fn new(command: impl Into<String>, standard: Params, extra: Params) -> Self {
        Self {
            command: command.into(),
            standard,
            extra,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn standard(&self) -> &Params {
        &self.standard
    }

    pub fn extra(&self) -> &Params {
        &self.extra
    }

    /// Look a field up in the standard part first, then in the extras.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.standard
            .get(name)
            .or_else(|| self.extra.get(name))
            .filter(|value| !value.is_null())
    }

    pub fn str(&self, name: &str) -> Result<Option<&str>, CommandError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text)),
            Some(other) => Err(wrong_type(name, "a string", other)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, CommandError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(other) => Err(wrong_type(name, "a boolean", other)),
        }
    }

    pub fn date(&self, name: &str) -> Result<Option<Date>, CommandError> {
        match self.str(name)? {
            None => Ok(None),
            Some(text) => parse_date(name, text).map(Some).map_err(CommandError::from),
        }
    }

    pub fn strings(&self, name: &str) -> Result<Vec<String>, CommandError> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(Value::String(text)) => Ok(vec![text.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(text) => Ok(text.clone()),
                    other => Err(wrong_type(name, "a list of strings", other)),
                })
                .collect(),
            Some(other) => Err(wrong_type(name, "a list of strings", other)),
        }
    }

    /// Parse a symbol list field into normalized, de-duplicated symbols.
    pub fn symbols(&self, name: &str) -> Result<Vec<Symbol>, CommandError> {
        let raw = self.strings(name)?;
        Symbol::parse_list(&raw).map_err(CommandError::from)
    }
}

fn wrong_type(name: &str, expected: &str, found: &Value) -> CommandError {
    CommandError::invalid_option(format!("'{name}' must be {expected}, got {found}"))
}

/// One chunk of an upstream response, tagged with the sub-request it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub body: String,
}

/// Opaque vendor payload produced by stage 2 and cached verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPayload {
    pub parts: Vec<RawPart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl RawPayload {
    pub fn single(body: impl Into<String>) -> Self {
        Self {
            parts: vec![RawPart {
                key: None,
                body: body.into(),
            }],
            warnings: Vec::new(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, body: impl Into<String>) {
        self.parts.push(RawPart {
            key: Some(key.into()),
            body: body.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Records and notices produced by stage 3.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformedData {
    pub records: Vec<Record>,
    pub warnings: Vec<Warning>,
}

impl TransformedData {
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

/// Transport context handed to stage 2.
pub struct ExtractContext {
    provider: String,
    credentials: ProviderCredentials,
    http: Arc<dyn HttpClient>,
    retry: RetryConfig,
    throttle: Option<Throttle>,
    fan_out_limit: usize,
    request_timeout: Duration,
    deadline: Option<Instant>,
    attempts: AtomicU32,
}

impl Debug for ExtractContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractContext")
            .field("provider", &self.provider)
            .field("credentials", &self.credentials)
            .field("fan_out_limit", &self.fan_out_limit)
            .field("request_timeout", &self.request_timeout)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl ExtractContext {
    pub fn new(provider: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            provider: provider.into(),
            credentials: ProviderCredentials::default(),
            http,
            retry: RetryConfig::no_retry(),
            throttle: None,
            fan_out_limit: 1,
            request_timeout: Duration::from_secs(30),
            deadline: None,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn with_credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_throttle(mut self, throttle: Option<Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_fan_out_limit(mut self, limit: usize) -> Self {
        self.fan_out_limit = limit.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Instant by which the whole of stage 2 must have finished.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Deadline for a single upstream request or fan-out item.
    ///
    /// It falls strictly before [`deadline`](Self::deadline) so a slow item
    /// times out on its own while the items that did finish are kept.
    pub fn item_deadline(&self) -> Option<Instant> {
        self.deadline.map(|deadline| {
            let margin = (self.request_timeout / ITEM_MARGIN_DIVISOR).min(MAX_ITEM_MARGIN);
            deadline.checked_sub(margin).unwrap_or(deadline)
        })
    }

    pub fn fan_out_limit(&self) -> usize {
        self.fan_out_limit
    }

    /// Credential `field`, or an unauthorized error naming it.
    pub fn credential(&self, field: &str) -> Result<&str, SourceError> {
        self.credentials.get(field).ok_or_else(|| {
            SourceError::unauthorized(format!(
                "provider '{}' requires credential '{field}'",
                self.provider
            ))
        })
    }

    /// Upstream attempts made through this context so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Send one HTTP request under the vendor's quota and retry policy and
    /// return the body of a successful response.
    pub async fn send(&self, request: HttpRequest) -> Result<String, SourceError> {
        let budget = match self.item_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.request_timeout),
            None => self.request_timeout,
        };
        let timeout_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        let request = request.with_timeout_ms(timeout_ms);
        let retried = retry(&self.retry, |_| {
            let request = request.clone();
            async move {
                if let Some(throttle) = &self.throttle {
                    throttle.acquire().await;
                }
                self.attempts.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(provider = %self.provider, url = %request.redacted_url(), "upstream request");
                let response = self.http.execute(request).await?;
                SourceError::check_response(response)
            }
        })
        .await;
        retried.outcome
    }
}

/// Typed three-stage adapter for one (provider, command) pair.
pub trait Fetcher: Send + Sync + 'static {
    /// Vendor-native request. Its JSON form is the cache fingerprint, so it
    /// must not contain credentials.
    type Query: Serialize + Send + Sync + 'static;

    /// Stage 1: map standard and extra parameters to the vendor request.
    fn transform_query(&self, params: &QueryParams) -> Result<Self::Query, CommandError>;

    /// Stage 2: perform the upstream I/O.
    fn extract_data<'a>(
        &'a self,
        query: &'a Self::Query,
        ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>>;

    /// Stage 3: parse the payload into records named after the record schema.
    fn transform_data(
        &self,
        query: &Self::Query,
        raw: &RawPayload,
    ) -> Result<TransformedData, SourceError>;

    fn policy(&self) -> ProviderPolicy {
        ProviderPolicy::default()
    }

    /// Whether this request may be served from and stored in the cache.
    fn cacheable(&self, _query: &Self::Query) -> bool {
        true
    }
}

/// Type-erased vendor request produced by stage 1.
#[derive(Clone)]
pub struct FetchRequest {
    fingerprint: String,
    cacheable: bool,
    query: Arc<dyn Any + Send + Sync>,
}

impl FetchRequest {
    pub fn new<Q>(query: Q) -> Result<Self, CommandError>
    where
        Q: Serialize + Send + Sync + 'static,
    {
        let fingerprint = serde_json::to_string(&query).map_err(|error| {
            CommandError::invalid_option(format!("request could not be fingerprinted: {error}"))
        })?;
        Ok(Self {
            fingerprint,
            cacheable: true,
            query: Arc::new(query),
        })
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Deterministic serialization of the vendor request.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn downcast<Q: 'static>(&self) -> Option<&Q> {
        self.query.downcast_ref::<Q>()
    }
}

impl Debug for FetchRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("fingerprint", &self.fingerprint)
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

/// Object-safe adapter used by registry bindings.
pub trait ProviderAdapter: Send + Sync {
    fn transform_query(&self, params: &QueryParams) -> Result<FetchRequest, CommandError>;

    fn extract_data<'a>(
        &'a self,
        request: &'a FetchRequest,
        ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>>;

    fn transform_data(
        &self,
        request: &FetchRequest,
        raw: &RawPayload,
    ) -> Result<TransformedData, SourceError>;

    fn policy(&self) -> ProviderPolicy;
}

fn foreign_request() -> SourceError {
    SourceError::internal("fetch request was produced by a different adapter")
}

impl<F: Fetcher> ProviderAdapter for F {
    fn transform_query(&self, params: &QueryParams) -> Result<FetchRequest, CommandError> {
        let query = Fetcher::transform_query(self, params)?;
        let cacheable = Fetcher::cacheable(self, &query);
        Ok(FetchRequest::new(query)?.with_cacheable(cacheable))
    }

    fn extract_data<'a>(
        &'a self,
        request: &'a FetchRequest,
        ctx: &'a ExtractContext,
    ) -> BoxFuture<'a, Result<RawPayload, SourceError>> {
        match request.downcast::<F::Query>() {
            Some(query) => Fetcher::extract_data(self, query, ctx),
            None => Box::pin(async { Err(foreign_request()) }),
        }
    }

    fn transform_data(
        &self,
        request: &FetchRequest,
        raw: &RawPayload,
    ) -> Result<TransformedData, SourceError> {
        let query = request.downcast::<F::Query>().ok_or_else(foreign_request)?;
        Fetcher::transform_data(self, query, raw)
    }

    fn policy(&self) -> ProviderPolicy {
        Fetcher::policy(self)
    }
}
