//! Sliding-window request admission
//!
//! Windows live in memory only; a restart starts fresh. One limiter is
//! constructed per process and shared by every outbound call site. The
//! limiter never queues or delays - a rejected call is the caller's to
//! retry.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// Requests admitted per window for one operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: usize,
    pub window: Duration,
}

impl RatePolicy {
    pub const fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Expected, frequent rejection carrying the wait hint; callers map it
/// to a localized "please wait" message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit exceeded, retry in {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub retry_after_secs: u64,
}

/// In-memory sliding-window governor keyed by operation class.
pub struct RateLimiter {
    default_policy: RatePolicy,
    policies: HashMap<String, RatePolicy>,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(default_policy: RatePolicy) -> Self {
        Self {
            default_policy,
            policies: HashMap::new(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Register a per-class policy; unregistered classes use the default.
    pub fn with_policy(mut self, class: &str, policy: RatePolicy) -> Self {
        self.policies.insert(class.to_string(), policy);
        self
    }

    fn policy(&self, class: &str) -> RatePolicy {
        self.policies.get(class).copied().unwrap_or(self.default_policy)
    }

    /// Admit or reject a request for the class right now.
    pub fn admit(&self, class: &str) -> Result<(), RateLimitExceeded> {
        self.admit_at(class, Instant::now())
    }

    fn admit_at(&self, class: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        let policy = self.policy(class);
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(class.to_string()).or_default();

        if let Some(cutoff) = now.checked_sub(policy.window) {
            while window.front().is_some_and(|t| *t <= cutoff) {
                window.pop_front();
            }
        }

        if window.len() >= policy.max_requests {
            let oldest = window.front().copied().unwrap_or(now);
            let wait = (oldest + policy.window).saturating_duration_since(now);
            let retry_after_secs = wait.as_millis().div_ceil(1000) as u64;
            debug!("rate limit hit (class={class}, retry_after={retry_after_secs}s)");
            return Err(RateLimitExceeded { retry_after_secs });
        }

        window.push_back(now);
        Ok(())
    }

    /// Requests still available in the current window. Read-only.
    pub fn remaining(&self, class: &str) -> usize {
        self.remaining_at(class, Instant::now())
    }

    fn remaining_at(&self, class: &str, now: Instant) -> usize {
        let policy = self.policy(class);
        let windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let live = windows
            .get(class)
            .map(|window| {
                window
                    .iter()
                    .filter(|t| now.duration_since(**t) < policy.window)
                    .count()
            })
            .unwrap_or(0);
        policy.max_requests.saturating_sub(live)
    }

    /// Milliseconds until the window frees a slot; 0 when one is free
    /// right now. Read-only.
    pub fn ms_until_slot(&self, class: &str) -> u64 {
        self.ms_until_slot_at(class, Instant::now())
    }

    fn ms_until_slot_at(&self, class: &str, now: Instant) -> u64 {
        let policy = self.policy(class);
        let windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(window) = windows.get(class) else {
            return 0;
        };
        let live: Vec<&Instant> = window
            .iter()
            .filter(|t| now.duration_since(**t) < policy.window)
            .collect();
        if live.len() < policy.max_requests {
            return 0;
        }
        // front of the deque is the oldest surviving timestamp
        match live.first() {
            Some(oldest) => (**oldest + policy.window)
                .saturating_duration_since(now)
                .as_millis() as u64,
            None => 0,
        }
    }
}
