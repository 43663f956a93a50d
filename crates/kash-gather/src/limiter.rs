// SPDX-License-Identifier: MIT OR Apache-2.0
//! Leaky-bucket rate limiting.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct BucketState {
    /// Current fill level, in acquired units.
    level: f64,
    last_drain: Instant,
}

/// A leaky-bucket rate limiter.
///
/// The bucket holds up to `max_rate` units and drains at `max_rate` units
/// per second; each [`acquire`](RateLimiter::acquire) adds one unit, waiting
/// until it fits. Over any one-second window at most `max_rate` acquisitions
/// complete.
pub struct RateLimiter {
    max_rate: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_rate` acquisitions per second.
    /// Rates at or below zero disable limiting.
    #[must_use]
    pub fn new(max_rate: f64) -> Self {
        Self {
            max_rate,
            state: Mutex::new(BucketState {
                level: 0.0,
                last_drain: Instant::now(),
            }),
        }
    }

    /// Wait until another acquisition fits under the rate.
    pub async fn acquire(&self) {
        if self.max_rate <= 0.0 {
            return;
        }
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_drain.elapsed().as_secs_f64();
                state.level = (state.level - elapsed * self.max_rate).max(0.0);
                state.last_drain = Instant::now();

                if state.level + 1.0 <= self.max_rate {
                    state.level += 1.0;
                    None
                } else {
                    // Time until one unit drains.
                    Some(Duration::from_secs_f64(
                        (state.level + 1.0 - self.max_rate) / self.max_rate,
                    ))
                }
            };
            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn allows_burst_up_to_rate() {
        let limiter = RateLimiter::new(10.0);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        // A full burst fits in the bucket without waiting.
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn enforces_rate_beyond_burst() {
        let limiter = Arc::new(RateLimiter::new(20.0));
        let start = Instant::now();
        // 30 acquisitions at 20/s: the 10 beyond the burst must wait
        // roughly half a second in total.
        for _ in 0..30 {
            limiter.acquire().await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400), "elapsed={elapsed:?}");
    }

    #[tokio::test]
    async fn zero_rate_disables_limiting() {
        let limiter = RateLimiter::new(0.0);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
