use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::provider_policy::QuotaPolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared per-provider rate limiter. Cloning shares the budget.
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DirectRateLimiter>,
    quota: QuotaPolicy,
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle").field("quota", &self.quota).finish()
    }
}

impl Throttle {
    pub fn new(quota: QuotaPolicy) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota.window,
                quota.limit,
            ))),
            quota,
        }
    }

    pub fn quota(&self) -> QuotaPolicy {
        self.quota
    }

    /// Take one cell of budget without waiting.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Wait until one cell of budget is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_bounded_by_quota_limit() {
        let throttle = Throttle::new(QuotaPolicy {
            window: Duration::from_secs(60),
            limit: 2,
        });

        assert!(throttle.try_acquire());
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
    }

    #[tokio::test]
    async fn acquire_waits_for_replenishment() {
        let throttle = Throttle::new(QuotaPolicy {
            window: Duration::from_millis(50),
            limit: 1,
        });

        throttle.acquire().await;
        let started = std::time::Instant::now();
        throttle.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn clones_share_budget() {
        let throttle = Throttle::new(QuotaPolicy {
            window: Duration::from_secs(60),
            limit: 1,
        });
        let clone = throttle.clone();
        assert!(throttle.try_acquire());
        assert!(!clone.try_acquire());
    }
}
