//! Fixed-window per-IP rate limiting.
//!
//! In-memory and process-local, like the rest of the service state. Each
//! client IP gets `limit` accepted requests per window; the window resets
//! lazily on the first request after it elapses.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

struct Window {
    count: u32,
    reset_at: Instant,
}

/// Per-client-IP request counting over a fixed window.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit,
            window,
        }
    }

    /// True when the request is allowed; counts it against the window.
    pub fn allow(&self, client_ip: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();

        let entry = windows
            .entry(client_ip.to_string())
            .or_insert_with(|| Window {
                count: 0,
                reset_at: now + self.window,
            });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }

        if entry.count >= self.limit {
            debug!(client_ip, "rate limit exceeded");
            return false;
        }

        entry.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow("1.2.3.4"));
        assert!(limiter.allow("1.2.3.4"));
        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));
    }

    #[test]
    fn windows_are_per_ip() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("1.1.1.1"));
        assert!(!limiter.allow("1.1.1.1"));
        assert!(limiter.allow("2.2.2.2"));
    }

    #[test]
    fn window_rolls_over() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.allow("1.2.3.4"));
    }
}
