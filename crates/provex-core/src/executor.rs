//! Per-invocation command execution.
//!
//! Every call walks `Resolving → Validating → Fetching → Normalizing` and
//! ends in `Done` or `Failed`. The executor keeps no per-call state between
//! invocations; the catalog it reads is frozen, and the only shared mutable
//! resources are the payload cache and the per-provider throttles, both of
//! which are safe for concurrent use.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::adapter::{ExtractContext, FetchRequest, QueryParams, RawPayload};
use crate::cache::{CacheMode, CacheStore};
use crate::catalog::{Catalog, StandardCommand};
use crate::config::ExecutorConfig;
use crate::credentials::Credentials;
use crate::envelope::{EnvelopeMeta, ResultEnvelope, Warning, WarningCategory};
use crate::error::{CommandError, RequestFailure};
use crate::http_client::HttpClient;
use crate::registry::ProviderBinding;
use crate::schema::{Params, Record};
use crate::source::SourceError;
use crate::throttling::Throttle;

/// One command invocation as submitted by a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    path: String,
    provider: Option<String>,
    arguments: Params,
    timeout: Option<Duration>,
    cache_mode: CacheMode,
}

impl CommandRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            provider: None,
            arguments: Params::new(),
            timeout: None,
            cache_mode: CacheMode::Use,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Params) -> Self {
        self.arguments.extend(arguments);
        self
    }

    /// Deadline for the whole invocation. Defaults to the executor's timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn arguments(&self) -> &Params {
        &self.arguments
    }
}

/// States of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Resolving,
    Validating,
    Fetching,
    Normalizing,
    Done,
    Failed,
}

/// Call settings after reserved arguments have been pulled out.
#[derive(Debug)]
struct CallContext {
    provider: Option<String>,
    timeout: Duration,
    cache_mode: CacheMode,
    arguments: Params,
}

impl CallContext {
    /// Reserved arguments fill in whatever the request did not set explicitly.
    fn extract(request: &CommandRequest, default_timeout: Duration) -> Result<Self, CommandError> {
        let mut arguments = request.arguments.clone();

        let provider = match arguments.remove("provider") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name),
            Some(other) => {
                return Err(CommandError::invalid_option(format!(
                    "'provider' must be a string, got {other}"
                )))
            }
        };
        let timeout_ms = match arguments.remove("timeout_ms") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_u64().filter(|ms| *ms > 0).ok_or_else(|| {
                CommandError::invalid_option(format!(
                    "'timeout_ms' must be a positive integer, got {value}"
                ))
            })?),
        };
        let use_cache = match arguments.remove("cache") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                return Err(CommandError::invalid_option(format!(
                    "'cache' must be a boolean, got {other}"
                )))
            }
        };

        Ok(Self {
            provider: request.provider.clone().or(provider),
            timeout: request
                .timeout
                .or(timeout_ms.map(Duration::from_millis))
                .unwrap_or(default_timeout),
            cache_mode: if use_cache {
                request.cache_mode
            } else {
                CacheMode::Bypass
            },
            arguments,
        })
    }
}

/// Mutable bookkeeping for a single invocation.
#[derive(Debug, Default)]
struct Invocation {
    provider: Option<String>,
    warnings: Vec<Warning>,
    arguments: Params,
    attempts: u32,
    cache_hit: bool,
}

impl Invocation {
    fn enter(&self, phase: ExecutionPhase) {
        debug!(phase = ?phase, provider = ?self.provider, "command phase");
    }
}

/// Runs command invocations against a frozen [`Catalog`].
pub struct CommandExecutor {
    catalog: Arc<Catalog>,
    credentials: Credentials,
    http: Arc<dyn HttpClient>,
    cache: CacheStore,
    throttles: HashMap<String, Throttle>,
    config: ExecutorConfig,
}

impl Debug for CommandExecutor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("commands", &self.catalog.commands().len())
            .field("credentials", &self.credentials)
            .field("throttles", &self.throttles)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    pub fn new(
        catalog: Arc<Catalog>,
        credentials: Credentials,
        http: Arc<dyn HttpClient>,
        config: ExecutorConfig,
    ) -> Self {
        // One budget per provider, shared by every command it serves.
        let mut throttles = HashMap::new();
        for command in catalog.commands() {
            for binding in command.bindings() {
                if throttles.contains_key(binding.provider()) {
                    continue;
                }
                if let Some(quota) = binding.policy().quota {
                    throttles.insert(binding.provider().to_owned(), Throttle::new(quota));
                }
            }
        }

        Self {
            cache: CacheStore::new(config.cache_ttl),
            catalog,
            credentials,
            http,
            throttles,
            config,
        }
    }

    /// Share a cache with other executors.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = cache;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run one invocation. Never fails: errors are reported in the envelope.
    pub async fn execute(&self, request: CommandRequest) -> ResultEnvelope {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("command", path = %request.path, request_id = %request_id);
        self.run(request, request_id).instrument(span).await
    }

    async fn run(&self, request: CommandRequest, request_id: String) -> ResultEnvelope {
        let started = Instant::now();
        let mut invocation = Invocation::default();
        let outcome = self.drive(&request, &mut invocation).await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let metadata = EnvelopeMeta::new(request_id, request.path.as_str())
            .with_duration_ms(duration_ms)
            .with_cache_hit(invocation.cache_hit)
            .with_attempts(invocation.attempts)
            .with_arguments(std::mem::take(&mut invocation.arguments));

        match outcome {
            Ok((provider, records)) => {
                invocation.enter(ExecutionPhase::Done);
                debug!(records = records.len(), duration_ms, "command completed");
                ResultEnvelope::success(records, provider, invocation.warnings, metadata)
            }
            Err(error) => {
                invocation.enter(ExecutionPhase::Failed);
                warn!(kind = %error.kind(), error = %error, "command failed");
                ResultEnvelope::failure(&error, invocation.provider, invocation.warnings, metadata)
            }
        }
    }

    async fn drive(
        &self,
        request: &CommandRequest,
        invocation: &mut Invocation,
    ) -> Result<(String, Vec<Record>), CommandError> {
        invocation.enter(ExecutionPhase::Resolving);
        let command = self.catalog.lookup(&request.path).ok_or_else(|| {
            CommandError::invalid_option(format!("unknown command path '{}'", request.path))
        })?;
        let context = CallContext::extract(request, self.config.timeout)?;
        let binding = self.catalog.registry().resolve(
            command,
            context.provider.as_deref(),
            &self.credentials,
        )?;
        let provider = binding.provider().to_owned();
        invocation.provider = Some(provider.clone());

        invocation.enter(ExecutionPhase::Validating);
        let params = validate_arguments(command, binding, &context.arguments, &mut invocation.warnings)?;
        invocation.arguments = params.standard().clone();
        invocation
            .arguments
            .extend(params.extra().iter().map(|(key, value)| (key.clone(), value.clone())));

        invocation.enter(ExecutionPhase::Fetching);
        let fetch_request = binding.adapter().transform_query(&params)?;
        let raw = self
            .fetch(command, binding, &fetch_request, &context, invocation)
            .await?;

        invocation.enter(ExecutionPhase::Normalizing);
        let records = normalize(
            command,
            binding,
            &params,
            &fetch_request,
            raw,
            &mut invocation.warnings,
        )?;
        Ok((provider, records))
    }

    async fn fetch(
        &self,
        command: &StandardCommand,
        binding: &ProviderBinding,
        request: &FetchRequest,
        context: &CallContext,
        invocation: &mut Invocation,
    ) -> Result<RawPayload, CommandError> {
        let provider = binding.provider();
        let policy = binding.policy();
        let retry = self
            .config
            .retry_override
            .clone()
            .unwrap_or_else(|| policy.retry.clone());
        let deadline = tokio::time::Instant::now() + context.timeout;
        let extract = ExtractContext::new(provider, Arc::clone(&self.http))
            .with_credentials(
                self.credentials
                    .provider(provider)
                    .cloned()
                    .unwrap_or_default(),
            )
            .with_retry(retry)
            .with_throttle(self.throttles.get(provider).cloned())
            .with_fan_out_limit(self.config.fan_out_limit.min(policy.max_concurrency))
            .with_request_timeout(context.timeout)
            .with_deadline(deadline);

        let ttl = policy.cache_ttl.unwrap_or(self.config.cache_ttl);
        let mode = if request.cacheable() {
            context.cache_mode
        } else {
            CacheMode::Bypass
        };
        let key = CacheStore::key(provider, command.path(), request.fingerprint());
        let adapter = binding.adapter();

        let fetch = self.cache.get_or_fetch(&key, Some(ttl), mode, || async {
            let payload = adapter.extract_data(request, &extract).await?;
            serde_json::to_string(&payload).map_err(|error| {
                SourceError::internal(format!("payload could not be cached: {error}"))
            })
        });
        let outcome = tokio::time::timeout_at(deadline, fetch).await;
        invocation.attempts = extract.attempts();

        let cached = match outcome {
            Err(_) => {
                return Err(CommandError::ProviderRequest {
                    provider: provider.to_owned(),
                    failure: RequestFailure::Timeout,
                    detail: format!("deadline of {}ms elapsed", context.timeout.as_millis()),
                })
            }
            Ok(Err(error)) => return Err(error.into_command_error(provider)),
            Ok(Ok(cached)) => cached,
        };
        invocation.cache_hit = cached.hit;
        debug!(cache_hit = cached.hit, attempts = invocation.attempts, "payload ready");

        serde_json::from_str(&cached.body).map_err(|error| {
            SourceError::decode(format!("cached payload is unreadable: {error}"))
                .into_command_error(provider)
        })
    }
}

/// Drop arguments the chosen provider does not accept, then validate the rest.
fn validate_arguments(
    command: &StandardCommand,
    binding: &ProviderBinding,
    raw: &Params,
    warnings: &mut Vec<Warning>,
) -> Result<QueryParams, CommandError> {
    let schema = binding.query_schema();

    for key in schema.unknown_keys(raw) {
        let owners: Vec<&str> = command
            .bindings()
            .iter()
            .filter(|other| other.query_schema().resolve_key(key).is_some())
            .map(ProviderBinding::provider)
            .collect();
        let warning = if owners.is_empty() {
            Warning::new(
                WarningCategory::UnknownArgument,
                format!(
                    "argument '{key}' is not accepted by '{}' and was ignored",
                    command.path()
                ),
            )
        } else {
            Warning::new(
                WarningCategory::UnsupportedArgument,
                format!(
                    "argument '{key}' is not supported by provider '{}' (available with: {}) and was ignored",
                    binding.provider(),
                    owners.join(", ")
                ),
            )
        };
        warn!(argument = key, category = ?warning.category, "argument ignored");
        warnings.push(warning);
    }

    let mut known = Params::new();
    for (key, value) in raw {
        let Some(field) = schema.resolve_key(key) else {
            continue;
        };
        if let Some(notice) = &field.deprecated {
            warnings.push(Warning::new(
                WarningCategory::Deprecated,
                format!("argument '{}' is deprecated: {notice}", field.name),
            ));
        }
        known.insert(key.clone(), value.clone());
    }

    let validated = schema.validate(&known)?;
    let (standard, extra): (Params, Params) = validated
        .into_iter()
        .partition(|(key, _)| command.query_schema().contains(key));
    Ok(QueryParams::new(command.path(), standard, extra))
}

/// Stage 3 plus record-level normalization against the binding's record schema.
fn normalize(
    command: &StandardCommand,
    binding: &ProviderBinding,
    params: &QueryParams,
    request: &FetchRequest,
    raw: RawPayload,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<Record>, CommandError> {
    let provider = binding.provider();
    warnings.extend(raw.warnings.iter().cloned());
    let data = binding
        .adapter()
        .transform_data(request, &raw)
        .map_err(|error| error.into_command_error(provider))?;
    warnings.extend(data.warnings);

    let schema = binding.record_schema();
    let mut records = Vec::with_capacity(data.records.len());
    let mut nulled: BTreeMap<String, usize> = BTreeMap::new();
    for (index, record) in data.records.iter().enumerate() {
        match schema.normalize_record(record) {
            Ok(normalized) => {
                for field in normalized.nulled {
                    *nulled.entry(field).or_default() += 1;
                }
                records.push(normalized.record);
            }
            Err(error) => {
                warn!(provider, index, error = %error, "record dropped");
                warnings.push(Warning::new(
                    WarningCategory::RecordDropped,
                    format!("record {index} from '{provider}' was dropped: {error}"),
                ));
            }
        }
    }
    for (field, count) in nulled {
        warnings.push(Warning::new(
            WarningCategory::FieldNulled,
            format!("field '{field}' could not be normalized in {count} record(s) and was set to null"),
        ));
    }

    let records = command.handler().apply(params, records);
    if records.is_empty() {
        return Err(CommandError::EmptyData {
            provider: provider.to_owned(),
            command: command.path().to_owned(),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reserved_arguments_are_extracted() {
        let request = CommandRequest::new("/x")
            .with_argument("provider", "fred")
            .with_argument("timeout_ms", 250)
            .with_argument("cache", false)
            .with_argument("series", "SOFR");
        let context =
            CallContext::extract(&request, Duration::from_secs(30)).expect("valid context");

        assert_eq!(context.provider.as_deref(), Some("fred"));
        assert_eq!(context.timeout, Duration::from_millis(250));
        assert_eq!(context.cache_mode, CacheMode::Bypass);
        assert_eq!(context.arguments.len(), 1);
        assert_eq!(context.arguments["series"], json!("SOFR"));
    }

    #[test]
    fn explicit_request_settings_win_over_arguments() {
        let request = CommandRequest::new("/x")
            .with_provider("sec")
            .with_timeout(Duration::from_secs(2))
            .with_argument("provider", "fred")
            .with_argument("timeout_ms", 250);
        let context =
            CallContext::extract(&request, Duration::from_secs(30)).expect("valid context");

        assert_eq!(context.provider.as_deref(), Some("sec"));
        assert_eq!(context.timeout, Duration::from_secs(2));
        assert_eq!(context.cache_mode, CacheMode::Use);
    }

    #[test]
    fn malformed_reserved_arguments_are_invalid_options() {
        for (name, value) in [
            ("timeout_ms", json!(-5)),
            ("cache", json!("no")),
            ("provider", json!(3)),
        ] {
            let request = CommandRequest::new("/x").with_argument(name, value);
            let error = CallContext::extract(&request, Duration::from_secs(30))
                .expect_err("malformed reserved argument");
            assert!(matches!(error, CommandError::InvalidOption(_)), "{name}");
        }
    }
}
