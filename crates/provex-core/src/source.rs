//! Provider-side failure type shared by the extract stage, retry and fan-out.

use std::fmt::{Display, Formatter};

use crate::error::{CommandError, RequestFailure};
use crate::http_client::{HttpError, HttpErrorKind, HttpResponse};

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Timeout,
    Network,
    HttpStatus(u16),
    RateLimited,
    Unauthorized,
    InvalidRequest,
    Decode,
    Internal,
}

/// Structured error raised while talking to a vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Network,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::HttpStatus(status),
            message: message.into(),
            retryable: status == 408 || status >= 500,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unauthorized,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Decode,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    /// Classify a completed HTTP exchange. Success bodies pass through.
    pub fn check_response(response: HttpResponse) -> Result<String, Self> {
        if response.is_success() {
            return Ok(response.body);
        }
        let snippet: String = response.body.chars().take(200).collect();
        Err(match response.status {
            401 | 403 => Self::unauthorized(format!(
                "vendor rejected credentials (HTTP {}): {snippet}",
                response.status
            )),
            429 => Self::rate_limited(format!("vendor rate limit hit: {snippet}")),
            status => Self::http_status(status, format!("HTTP {status}: {snippet}")),
        })
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::Network => "source.network",
            SourceErrorKind::HttpStatus(_) => "source.http_status",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Unauthorized => "source.unauthorized",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Decode => "source.decode",
            SourceErrorKind::Internal => "source.internal",
        }
    }

    pub const fn failure(&self) -> RequestFailure {
        match self.kind {
            SourceErrorKind::Timeout => RequestFailure::Timeout,
            SourceErrorKind::Network => RequestFailure::Network,
            SourceErrorKind::HttpStatus(_) | SourceErrorKind::InvalidRequest => {
                RequestFailure::Status
            }
            SourceErrorKind::RateLimited => RequestFailure::RateLimited,
            SourceErrorKind::Unauthorized => RequestFailure::Unauthorized,
            SourceErrorKind::Decode => RequestFailure::Decode,
            SourceErrorKind::Internal => RequestFailure::Internal,
        }
    }

    pub fn into_command_error(self, provider: &str) -> CommandError {
        CommandError::ProviderRequest {
            provider: provider.to_owned(),
            failure: self.failure(),
            detail: self.message,
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<HttpError> for SourceError {
    fn from(error: HttpError) -> Self {
        match error.kind() {
            HttpErrorKind::Timeout => Self::timeout(error.message()),
            HttpErrorKind::Connect | HttpErrorKind::Other => Self::network(error.message()),
        }
    }
}
