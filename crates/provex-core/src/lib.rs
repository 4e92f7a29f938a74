//! # Provex Core
//!
//! Provider abstraction and command dispatch engine.
//!
//! ## Overview
//!
//! A caller asks for one logical kind of data by command path (for example
//! `/equity/price/historical`) without knowing which vendor will answer.
//! The core:
//!
//! - keeps a frozen **catalog** of commands, each with canonical query and
//!   record schemas and an ordered list of provider bindings
//! - **resolves** a provider, either the one the caller named or the first
//!   credentialed binding in priority order
//! - runs the provider's **three-stage adapter** (query transform, fetch,
//!   data transform) under a deadline, with retry, quota and caching
//! - **normalizes** vendor records into the canonical shape and returns a
//!   [`ResultEnvelope`] carrying records, warnings, metadata or an error
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | Three-stage provider adapter contract |
//! | [`cache`] | Single-flight in-memory payload cache |
//! | [`catalog`] | Command registration, validation and lookup |
//! | [`config`] | Executor configuration and environment overrides |
//! | [`credentials`] | Provider credentials (never logged) |
//! | [`domain`] | Validated value types (symbols, dates, timestamps) |
//! | [`envelope`] | Result envelope, warnings and metadata |
//! | [`error`] | Error taxonomy |
//! | [`executor`] | Per-invocation state machine |
//! | [`extensions`] | Built-in providers and commands |
//! | [`fan_out`] | Bounded, order-preserving sub-requests |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`provider_policy`] | Vendor-declared retry, quota and cache policy |
//! | [`providers`] | Built-in vendor adapters |
//! | [`registry`] | Provider metadata, bindings and resolution |
//! | [`retry`] | Backoff and retry loop |
//! | [`schema`] | Typed, alias-aware field schemas |
//! | [`source`] | Transport-level adapter errors |
//! | [`standard_models`] | Vendor-agnostic command definitions |
//! | [`throttling`] | Per-provider rate limiting |
//! | [`tree`] | Navigable command tree |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use provex_core::{
//!     builtin_catalog, CommandExecutor, CommandRequest, Credentials, ExecutorConfig,
//!     ReqwestHttpClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExecutorConfig::from_env()?;
//!     let catalog = Arc::new(builtin_catalog(&config)?);
//!     let executor = CommandExecutor::new(
//!         catalog,
//!         Credentials::new(),
//!         Arc::new(ReqwestHttpClient::new()),
//!         config,
//!     );
//!
//!     let envelope = executor
//!         .execute(
//!             CommandRequest::new("/fixedincome/rate/sofr")
//!                 .with_argument("start_date", "2023-01-01")
//!                 .with_argument("end_date", "2023-06-06"),
//!         )
//!         .await;
//!     println!("{} records from {:?}", envelope.results().len(), envelope.provider());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Caller   │
//! └────────┬────────┘
//!          │ CommandRequest
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ CommandExecutor │────▶│ Catalog / Tree   │
//! └────────┬────────┘     └──────────────────┘
//!          │                       │
//!          │              ┌──────────────────┐
//!          │              │ ProviderRegistry │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ ProviderAdapter │────▶│ CacheStore       │
//! │ (3 stages)      │     │ Throttle / Retry │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ ResultEnvelope  │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! [`CommandExecutor::execute`] never fails; fatal errors land in the
//! envelope with a stable [`ErrorKind`]:
//!
//! ```rust
//! use provex_core::{CommandError, ErrorKind};
//!
//! fn describe(error: &CommandError) -> &'static str {
//!     match error.kind() {
//!         ErrorKind::InvalidOption | ErrorKind::ValidationError => "fix the request",
//!         ErrorKind::ProviderAuthError => "configure credentials",
//!         ErrorKind::ProviderRequestError => "vendor failed, try again",
//!         ErrorKind::EmptyDataError => "no data for this query",
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - Credentials are read from the environment or a JSON file and are
//!   redacted from every `Debug` output and log line
//! - Upstream URLs are logged with key-like query parameters masked

pub mod adapter;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod extensions;
pub mod fan_out;
pub mod http_client;
pub mod provider_policy;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod source;
pub mod standard_models;
pub mod throttling;
pub mod tree;

#[cfg(test)]
mod testing;

// Adapter contract
pub use adapter::{
    BoxFuture, ExtractContext, FetchRequest, Fetcher, ProviderAdapter, QueryParams, RawPart,
    RawPayload, TransformedData,
};

// Caching
pub use cache::{CacheMode, CacheStore, Cached};

// Catalog
pub use catalog::{
    Catalog, CatalogBuilder, CommandHandler, CommandSpec, StandardCommand, RESERVED_CONTEXT_FIELDS,
};

// Configuration
pub use config::{ConfigError, ExecutorConfig, LoadMode};
pub use credentials::{Credentials, ProviderCredentials};

// Domain types
pub use domain::{format_date, parse_date, today_utc, Symbol, UtcDateTime};

// Envelope types
pub use envelope::{
    EnvelopeError, EnvelopeMeta, ResultEnvelope, Warning, WarningCategory, SCHEMA_VERSION,
};

// Error types
pub use error::{
    CommandError, ErrorKind, LoadingError, RequestFailure, SchemaError, ValidationError,
};

// Execution
pub use executor::{CommandExecutor, CommandRequest, ExecutionPhase};
pub use extensions::{builtin_catalog, builtin_commands, builtin_providers};
pub use fan_out::{collect_payload, fan_out, FanOutItem};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient, StubHttpClient,
};

// Provider policies
pub use provider_policy::{ProviderPolicy, QuotaPolicy};
pub use registry::{BindingSpec, ProviderBinding, ProviderInfo, ProviderRegistry};

// Retry logic
pub use retry::{retry, Backoff, Retried, RetryConfig};

// Schema model
pub use schema::{FieldSpec, FieldType, NormalizedRecord, Params, Record, Schema};

// Transport errors
pub use source::{SourceError, SourceErrorKind};

// Throttling
pub use throttling::Throttle;
pub use tree::{CommandTree, NodeId, TreeNode};
