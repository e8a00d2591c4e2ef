//! Client-side request throttling for member cluster API servers

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};

/// Token bucket refilled at `qps` tokens per second, holding at most `burst`
#[derive(Debug)]
pub struct RateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter starting with a full bucket. A non-positive `qps`
    /// disables throttling.
    pub fn new(qps: f32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps: f64::from(qps),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn qps(&self) -> f64 {
        self.qps
    }

    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Wait until a request may be sent
    pub async fn acquire(&self) {
        if let Some(wait) = self.reserve().await {
            time::sleep(wait).await;
        }
    }

    /// Take a token only if one is available right now
    pub async fn try_acquire(&self) -> bool {
        if self.qps <= 0.0 {
            return true;
        }
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take a token, possibly going into debt; returns how long the caller
    /// has to wait for its token to be earned
    async fn reserve(&self) -> Option<Duration> {
        if self.qps <= 0.0 {
            return None;
        }
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(-bucket.tokens / self.qps))
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_throttle() {
        let limiter = RateLimiter::new(1.0, 2);
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_reservation_waits() {
        let limiter = RateLimiter::new(100.0, 1);
        assert_eq!(limiter.reserve().await, None);
        let wait = limiter.reserve().await.unwrap();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_disabled() {
        let limiter = RateLimiter::new(0.0, 1);
        for _ in 0..10 {
            assert!(limiter.try_acquire().await);
        }
    }
}
