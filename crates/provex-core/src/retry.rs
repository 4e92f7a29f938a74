//! Retry logic with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::source::{SourceError, SourceErrorKind};

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(3),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt as i32);
                let capped_seconds = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(capped_seconds);
                if !jitter {
                    return delay;
                }

                let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                let total_ms = delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                Duration::from_millis(total_ms.max(0) as u64)
            }
        }
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// HTTP status codes that should trigger a retry.
    pub retry_on_status: Vec<u16>,
    pub retry_on_timeout: bool,
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    /// Whether `error` is worth another attempt under this configuration.
    pub fn should_retry(&self, error: &SourceError) -> bool {
        if !self.enabled {
            return false;
        }
        match error.kind() {
            SourceErrorKind::Timeout => self.retry_on_timeout,
            SourceErrorKind::Network => self.retry_on_connect,
            SourceErrorKind::HttpStatus(status) => self.should_retry_status(status),
            SourceErrorKind::RateLimited => self.should_retry_status(429),
            _ => false,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

/// Result of [`retry`], with the number of attempts made.
#[derive(Debug)]
pub struct Retried<T> {
    pub outcome: Result<T, SourceError>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
pub async fn retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Retried<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0_u32;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                return Retried {
                    outcome: Ok(value),
                    attempts: attempt + 1,
                }
            }
            Err(error) if attempt < config.max_retries && config.should_retry(&error) => {
                let delay = config.delay_for_attempt(attempt);
                debug!(attempt, ?delay, code = error.code(), "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Retried {
                    outcome: Err(error),
                    attempts: attempt + 1,
                }
            }
        }
    }
}
