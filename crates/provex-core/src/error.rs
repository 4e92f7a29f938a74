use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field-level and domain validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field '{field}'")]
    MissingField { field: String },
    #[error("field '{field}' expected {expected}, got {found}")]
    InvalidType {
        field: String,
        expected: &'static str,
        found: String,
    },
    #[error("field '{field}' must be one of [{choices}], got {value}")]
    InvalidChoice {
        field: String,
        value: String,
        choices: String,
    },
    #[error("field '{field}' must be a date formatted YYYY-MM-DD: '{value}'")]
    InvalidDate { field: String, value: String },

    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or '^': '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
}

impl ValidationError {
    /// Name of the offending field, when the error is tied to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field }
            | Self::InvalidType { field, .. }
            | Self::InvalidChoice { field, .. }
            | Self::InvalidDate { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Errors raised while building a [`Schema`](crate::schema::Schema).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema '{schema}' declares field '{field}' more than once")]
    DuplicateField { schema: String, field: String },
    #[error("schema '{schema}' maps alias '{alias}' to both '{first}' and '{second}'")]
    DuplicateAlias {
        schema: String,
        alias: String,
        first: String,
        second: String,
    },
    #[error("schema '{schema}' alias '{alias}' of '{field}' shadows another canonical field")]
    AliasShadowsField {
        schema: String,
        alias: String,
        field: String,
    },
}

/// Stable call-level error kinds carried by a failed result envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidOption,
    ValidationError,
    ProviderAuthError,
    ProviderRequestError,
    EmptyDataError,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidOption => "InvalidOption",
            Self::ValidationError => "ValidationError",
            Self::ProviderAuthError => "ProviderAuthError",
            Self::ProviderRequestError => "ProviderRequestError",
            Self::EmptyDataError => "EmptyDataError",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-classification of a provider request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestFailure {
    Timeout,
    Network,
    Status,
    RateLimited,
    Unauthorized,
    Decode,
    Internal,
}

impl RequestFailure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Status => "status",
            Self::RateLimited => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::Decode => "decode",
            Self::Internal => "internal",
        }
    }
}

impl Display for RequestFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal error for a single command invocation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no usable provider for '{command}': {detail}")]
    ProviderAuth { command: String, detail: String },

    #[error("provider '{provider}' request failed ({failure}): {detail}")]
    ProviderRequest {
        provider: String,
        failure: RequestFailure,
        detail: String,
    },

    #[error("provider '{provider}' returned no valid records for '{command}'")]
    EmptyData { provider: String, command: String },
}

impl CommandError {
    pub fn invalid_option(message: impl Into<String>) -> Self {
        Self::InvalidOption(message.into())
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOption(_) => ErrorKind::InvalidOption,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::ProviderAuth { .. } => ErrorKind::ProviderAuthError,
            Self::ProviderRequest { .. } => ErrorKind::ProviderRequestError,
            Self::EmptyData { .. } => ErrorKind::EmptyDataError,
        }
    }

    pub const fn request_failure(&self) -> Option<RequestFailure> {
        match self {
            Self::ProviderRequest { failure, .. } => Some(*failure),
            _ => None,
        }
    }
}

/// Startup-time plugin registration failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadingError {
    #[error("command path '{path}' is malformed: {reason}")]
    MalformedPath { path: String, reason: &'static str },
    #[error("command path '{path}' is already registered")]
    DuplicatePath { path: String },
    #[error("provider '{provider}' is already registered")]
    DuplicateProvider { provider: String },
    #[error("command '{path}' binds unknown provider '{provider}'")]
    UnknownProvider { path: String, provider: String },
    #[error("command '{path}' binds provider '{provider}' more than once")]
    DuplicateBinding { path: String, provider: String },
    #[error("command '{path}' has no provider bindings")]
    NoBindings { path: String },
    #[error("handler '{handler}' of '{path}' declares input '{input}' outside the query schema")]
    UnknownHandlerInput {
        path: String,
        handler: String,
        input: String,
    },
    #[error("handler '{handler}' of '{path}' returns '{declared}' but the record schema is '{expected}'")]
    HandlerOutputMismatch {
        path: String,
        handler: String,
        declared: String,
        expected: String,
    },
    #[error("provider '{provider}' cannot serve required field '{field}' of '{path}'")]
    UnresolvableBinding {
        path: String,
        provider: String,
        field: String,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}
