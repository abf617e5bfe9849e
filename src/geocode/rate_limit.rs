//! Sliding-window limiter for outbound geocoder requests

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max_requests` of 0 disables limiting
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Take a slot if one is free in the current window
    pub fn try_acquire(&self) -> bool {
        if self.max_requests == 0 {
            return true;
        }

        let now = Instant::now();
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        while sent.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            sent.pop_front();
        }

        if sent.len() < self.max_requests as usize {
            sent.push_back(now);
            true
        } else {
            false
        }
    }
}
