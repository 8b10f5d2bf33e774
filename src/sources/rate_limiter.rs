//! Per-provider token-bucket rate limiter (§4.1, §5).
//!
//! One bucket per provider, refill rate `rate_per_minute / 60` tokens/s,
//! burst = 1 — i.e. a strict minimum-interval gate rather than a bursty
//! bucket, which is what "burst = 1" collapses to.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::errors::AppError;

pub struct RateLimiter {
    interval: Duration,
    next_available: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(rate_per_minute: f64) -> Self {
        let rate = rate_per_minute.max(0.001);
        Self {
            interval: Duration::from_secs_f64(60.0 / rate),
            next_available: Mutex::new(Instant::now()),
        }
    }

    /// Wait for a token, failing with `RateLimitCancelled` if `deadline`
    /// elapses first (§4.1 step 1, §5 cancellation semantics).
    pub async fn acquire(&self, deadline: Instant) -> Result<(), AppError> {
        loop {
            let now = Instant::now();
            let mut guard = self.next_available.lock().await;
            if *guard <= now {
                *guard = now + self.interval;
                return Ok(());
            }
            let wait_until = *guard;
            drop(guard);

            if wait_until >= deadline {
                return Err(AppError::RateLimitCancelled(
                    "token would become available after the context deadline".into(),
                ));
            }
            if tokio::time::timeout_at(deadline, tokio::time::sleep_until(wait_until))
                .await
                .is_err()
            {
                return Err(AppError::RateLimitCancelled(
                    "context deadline elapsed while waiting for a rate-limit token".into(),
                ));
            }
            // Another waiter may have grabbed the slot that just freed up —
            // loop back around and re-check rather than assuming success.
        }
    }
}
