//! Client-side request throttling.
//!
//! A sliding-window log: every dispatch time inside the current window is
//! kept, and a new request may go out only while fewer than `limit` of them
//! remain. Waiting callers hold the lock, so they are released in arrival
//! order.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) struct RateLimiter {
    limit: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// A `limit` of zero disables throttling.
    pub(crate) fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            sent: Mutex::new(VecDeque::with_capacity(limit.min(1024) as usize)),
        }
    }

    /// Wait for a free slot and claim it.
    ///
    /// The slot is recorded only when this returns, so dropping the future
    /// while it waits leaves the ledger untouched.
    pub(crate) async fn acquire(&self) {
        if self.limit == 0 {
            return;
        }

        let mut sent = self.sent.lock().await;
        loop {
            let now = Instant::now();
            while sent
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.window)
            {
                sent.pop_front();
            }

            if sent.len() < self.limit {
                sent.push_back(now);
                return;
            }

            // Full window: the oldest entry decides when a slot frees up.
            let Some(&oldest) = sent.front() else {
                continue;
            };
            let wait = (oldest + self.window).saturating_duration_since(now);
            tracing::warn!(
                limit = self.limit,
                wait_ms = wait.as_millis() as u64,
                "Local rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    #[cfg(test)]
    async fn in_window(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_request_waits_for_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_shared_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 3);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn window_rolls_instead_of_resetting() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.acquire().await;

        // The first slot frees at t=60, not at t=90.
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_never_waits() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_records_nothing() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.acquire().await;

        let timed_out =
            tokio::time::timeout(Duration::from_secs(5), limiter.acquire()).await;
        assert!(timed_out.is_err());
        assert_eq!(limiter.in_window().await, 1);
    }
}
