use std::time::Duration;

use crate::retry::{Backoff, RetryConfig};

/// Request quota: at most `limit` calls per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub window: Duration,
    pub limit: u32,
}

/// Per-vendor transport policy declared by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    /// Upper bound on concurrent requests during fan-out.
    pub max_concurrency: usize,
    pub quota: Option<QuotaPolicy>,
    pub retry: RetryConfig,
    /// Cache TTL for raw payloads. `None` defers to the executor default.
    pub cache_ttl: Option<Duration>,
}

impl Default for ProviderPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            quota: None,
            retry: RetryConfig::default(),
            cache_ttl: None,
        }
    }
}

impl ProviderPolicy {
    /// Free-tier keyed API: low concurrency, per-minute quota, patient backoff.
    pub fn keyed_api(requests_per_minute: u32) -> Self {
        Self {
            max_concurrency: 2,
            quota: Some(QuotaPolicy {
                window: Duration::from_secs(60),
                limit: requests_per_minute,
            }),
            retry: RetryConfig {
                backoff: Backoff::Exponential {
                    base: Duration::from_millis(500),
                    factor: 2.0,
                    max: Duration::from_secs(5),
                    jitter: true,
                },
                ..RetryConfig::exponential(2)
            },
            cache_ttl: None,
        }
    }

    /// Public endpoint without credentials: no quota, more parallelism.
    pub fn public_api() -> Self {
        Self {
            max_concurrency: 8,
            ..Self::default()
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_quota(mut self, window: Duration, limit: u32) -> Self {
        self.quota = Some(QuotaPolicy { window, limit });
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_api_policy_matches_free_tier() {
        let policy = ProviderPolicy::keyed_api(120);

        assert_eq!(policy.max_concurrency, 2);
        assert_eq!(
            policy.quota,
            Some(QuotaPolicy {
                window: Duration::from_secs(60),
                limit: 120,
            })
        );
        assert_eq!(policy.retry.max_retries, 2);
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let policy = ProviderPolicy::public_api().with_max_concurrency(0);
        assert_eq!(policy.max_concurrency, 1);
    }
}
