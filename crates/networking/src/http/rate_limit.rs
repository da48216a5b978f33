//! Global request pacing

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

const DEFAULT_RPS: f64 = 10.0;

/// Token bucket with burst 1: consecutive request starts are spaced at least
/// `1/rps` apart, process-wide.
///
/// The lock is held across the pacing sleep so that concurrent callers are
/// serialized in arrival order.
pub struct RateLimiter {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(rps: f64) -> Self {
        let rps = if rps > 0.0 { rps } else { DEFAULT_RPS };
        Self {
            min_interval: Duration::from_secs_f64(1.0 / rps),
            last_start: Mutex::new(None),
        }
    }

    /// Suspends the caller until the next request may start
    pub async fn acquire(&self) {
        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sequential_acquires_are_paced() {
        let limiter = RateLimiter::new(10.0);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        // 5 acquires at 10 rps take at least 4 * 100 ms
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn first_acquire_is_immediate() {
        let limiter = RateLimiter::new(10.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_callers_do_not_wait() {
        let limiter = RateLimiter::new(10.0);
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_falls_back_to_default() {
        let limiter = RateLimiter::new(0.0);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
    }
}
