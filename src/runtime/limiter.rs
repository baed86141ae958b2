//! Token bucket rate limiter.
//!
//! The bucket holds up to `capacity` tokens and refills continuously at
//! `fill_rate` tokens per second. Refill is computed lazily whenever the
//! token count is read; nothing ticks in the background.
//!
//! Not synchronized: the pool only touches a limiter while holding its
//! send lock.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimiter {
    capacity: f64,
    fill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a full bucket.
    pub fn new(capacity: f64, fill_rate: f64) -> Self {
        Self::new_at(capacity, fill_rate, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `now`.
    pub fn new_at(capacity: f64, fill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            fill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn fill_rate(&self) -> f64 {
        self.fill_rate
    }

    /// Current token count.
    pub fn tokens(&mut self) -> f64 {
        self.tokens_at(Instant::now())
    }

    /// Token count at `now`, applying the refill accrued since the last read.
    pub fn tokens_at(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if self.tokens < self.capacity {
            self.tokens = self.capacity.min(self.tokens + self.fill_rate * elapsed);
        }
        self.last_refill = now;
        self.tokens
    }

    /// Take `n` tokens if available.
    pub fn consume(&mut self, n: f64) -> bool {
        self.consume_at(n, Instant::now())
    }

    /// Take `n` tokens at `now`. On failure the count is left as refilled.
    pub fn consume_at(&mut self, n: f64, now: Instant) -> bool {
        if n <= self.tokens_at(now) {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Time from `now` until `n` tokens will be available.
    pub fn time_until(&mut self, n: f64, now: Instant) -> Duration {
        let missing = n - self.tokens_at(now);
        if missing <= 0.0 {
            return Duration::ZERO;
        }
        if self.fill_rate <= 0.0 || n > self.capacity {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64(missing / self.fill_rate).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPSILON,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_fresh_bucket_consumes_up_to_capacity() {
        let start = Instant::now();
        for n in [0.0, 1.0, 5.0, 22.5, 23.0] {
            let mut bucket = RateLimiter::new_at(23.0, 1.73, start);
            assert!(bucket.consume_at(n, start));
            assert_close(bucket.tokens_at(start), 23.0 - n);
        }
    }

    #[test]
    fn test_overdraw_fails_without_deducting() {
        let start = Instant::now();
        let mut bucket = RateLimiter::new_at(10.0, 1.0, start);
        assert!(bucket.consume_at(7.0, start));

        assert!(!bucket.consume_at(4.0, start));
        assert_close(bucket.tokens_at(start), 3.0);

        assert!(!bucket.consume_at(10.5, start));
        assert_close(bucket.tokens_at(start), 3.0);
    }

    #[test]
    fn test_refill_is_linear_then_saturates() {
        let start = Instant::now();
        let mut bucket = RateLimiter::new_at(10.0, 2.0, start);
        assert!(bucket.consume_at(6.0, start));

        // t = 0
        assert_close(bucket.tokens_at(start), 4.0);

        // small t
        let t = start + Duration::from_millis(500);
        assert_close(bucket.tokens_at(t), 5.0);

        // large t saturates at capacity
        let t = t + Duration::from_secs(60);
        assert_close(bucket.tokens_at(t), 10.0);
    }

    #[test]
    fn test_failed_consume_still_advances_refill_clock() {
        let start = Instant::now();
        let mut bucket = RateLimiter::new_at(2.0, 1.0, start);
        assert!(bucket.consume_at(2.0, start));

        let t1 = start + Duration::from_millis(500);
        assert!(!bucket.consume_at(1.0, t1));
        assert_close(bucket.tokens_at(t1), 0.5);

        let t2 = t1 + Duration::from_millis(500);
        assert!(bucket.consume_at(1.0, t2));
        assert_close(bucket.tokens_at(t2), 0.0);
    }

    #[test]
    fn test_clock_going_backwards_is_ignored() {
        let start = Instant::now() + Duration::from_secs(10);
        let mut bucket = RateLimiter::new_at(5.0, 1.0, start);
        assert!(bucket.consume_at(5.0, start));
        assert_close(bucket.tokens_at(start - Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn test_time_until() {
        let start = Instant::now();
        let mut bucket = RateLimiter::new_at(4.0, 2.0, start);
        assert_eq!(bucket.time_until(1.0, start), Duration::ZERO);

        assert!(bucket.consume_at(4.0, start));
        let wait = bucket.time_until(1.0, start);
        assert!((wait.as_secs_f64() - 0.5).abs() < 1e-6);

        assert_eq!(bucket.time_until(5.0, start), Duration::MAX);
    }

    #[test]
    fn test_burst_then_throttle() {
        let start = Instant::now();
        let mut bucket = RateLimiter::new_at(3.0, 1.0, start);
        assert!(bucket.consume_at(1.0, start));
        assert!(bucket.consume_at(1.0, start));
        assert!(bucket.consume_at(1.0, start));
        assert!(!bucket.consume_at(1.0, start));
        assert!(bucket.consume_at(1.0, start + Duration::from_secs(1)));
    }
}
