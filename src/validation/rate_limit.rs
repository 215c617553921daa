//! Sliding-window request limiter shared by lookup workers.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// At most `max_requests` per `window`; callers block until a slot frees.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub const fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Time until a slot is free, or `None` if one is free now (and it is
    /// taken).
    pub fn try_acquire(&self) -> Option<Duration> {
        let mut requests = self.requests.lock().expect("limiter lock poisoned");
        let now = Instant::now();
        while requests
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            requests.pop_front();
        }
        if requests.len() < self.max_requests {
            requests.push_back(now);
            return None;
        }
        requests
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
    }

    /// Block until a request slot is available.
    pub fn acquire(&self) {
        while let Some(wait) = self.try_acquire() {
            tracing::info!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            std::thread::sleep(wait.max(Duration::from_millis(10)));
        }
    }
}
