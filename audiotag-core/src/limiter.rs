//! Shared rate limiters (spec.md §4.1).
//!
//! Two variants, both safe to share across concurrent workers and both
//! FIFO: the Nth successful `acquire()` completes no earlier than the Nth
//! permissible slot in arrival order.

use audiotag_common::error::{Error, Result};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

/// `(max_tokens_per_second, burst_size)` limiter, backed by `governor`
/// (already the teacher's dependency for exactly this purpose).
pub struct TokenBucketLimiter {
    inner: Governor<NotKeyed, InMemoryState, DefaultClock>,
}

impl TokenBucketLimiter {
    pub fn new(max_tokens_per_second: u32, burst_size: u32) -> Self {
        let rate = NonZeroU32::new(max_tokens_per_second.max(1)).expect("rate is non-zero");
        let burst = NonZeroU32::new(burst_size.max(1)).expect("burst is non-zero");
        let quota = Quota::per_second(rate).allow_burst(burst);
        Self {
            inner: Governor::direct(quota),
        }
    }

    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

/// Guarantees any two grants are separated by at least `interval`, honouring
/// 429 `Retry-After` responses via [`handle_retry_after`](Self::handle_retry_after).
pub struct IntervalLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
    destroyed: AtomicBool,
    notify: Notify,
}

impl IntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
            destroyed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// Blocks until the next permissible slot, updating it for the next caller.
    pub async fn acquire(&self) -> Result<()> {
        let mut guard = self.next_slot.lock().await;
        loop {
            if self.destroyed.load(Ordering::Acquire) {
                return Err(Error::Cancelled);
            }

            let now = Instant::now();
            let wait_until = *guard;
            if wait_until <= now {
                *guard = now + self.interval;
                return Ok(());
            }

            let remaining = wait_until - now;
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {
                    *guard = std::cmp::max(wait_until, Instant::now()) + self.interval;
                    return Ok(());
                }
                _ = self.notify.notified() => {
                    // loop again: either destroyed, or a spurious wake
                }
            }
        }
    }

    /// Pushes the next grantable slot forward by at least `seconds` (429 handling).
    pub async fn handle_retry_after(&self, seconds: u64) {
        let mut guard = self.next_slot.lock().await;
        let proposed = Instant::now() + Duration::from_secs(seconds);
        if proposed > *guard {
            *guard = proposed;
        }
    }

    /// Rejects all pending and future waiters so workers can unwind promptly.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn interval_limiter_spaces_grants() {
        let limiter = Arc::new(IntervalLimiter::from_millis(20));
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn interval_limiter_is_fifo_under_concurrency() {
        let limiter = Arc::new(IntervalLimiter::from_millis(10));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        let start = Instant::now();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        // 20 grants spaced >=10ms apart: at least 190ms total (allowing one burst token).
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn retry_after_delays_subsequent_waiters() {
        let limiter = IntervalLimiter::from_millis(5);
        limiter.acquire().await.unwrap();
        limiter.handle_retry_after(1).await;
        let start = Instant::now();
        // Use a short select so the test doesn't actually wait a full second.
        let result = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(result.is_err(), "acquire should still be pending after retry-after");
        let _ = start;
    }

    #[tokio::test]
    async fn destroy_unblocks_pending_waiters() {
        let limiter = Arc::new(IntervalLimiter::from_millis(5_000));
        limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.destroy();

        let result = tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("destroy should unblock the waiter promptly")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn token_bucket_allows_burst_then_throttles() {
        let limiter = TokenBucketLimiter::new(10, 2);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50), "burst should be immediate");
    }
}
