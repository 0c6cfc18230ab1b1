use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota};

/// Enforces a minimum spacing between consecutive upstream calls.
///
/// One instance is shared (behind an `Arc`) by every client talking to the same
/// provider account. The quota holds a single cell that refills every
/// `min_interval`, so the first call goes straight through and later callers wait
/// their turn. Nothing is rejected. A zero interval disables limiting.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    inner: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        let inner = Quota::with_period(min_interval)
            .map(|quota| quota.allow_burst(NonZeroU32::MIN))
            .map(DefaultDirectRateLimiter::direct);
        Self {
            min_interval,
            inner,
        }
    }

    pub fn from_millis(min_interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_interval_ms))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next call slot is free and claim it.
    pub async fn acquire(&self) {
        let Some(limiter) = &self.inner else {
            return;
        };
        if limiter.check().is_err() {
            tracing::trace!(
                interval_ms = self.min_interval.as_millis() as u64,
                "Rate limiter delaying upstream call"
            );
            limiter.until_ready().await;
        }
    }
}
