//! StartSession retry bookkeeping.

use std::time::Duration;

/// A retry that has been armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRetry {
    /// Retry number, starting at 1
    pub attempt: u32,
    /// Timer token; only the latest token fires
    pub token: u64,
    /// Delay before the retry
    pub delay: Duration,
}

/// Bounded fixed-delay retry counter
#[derive(Debug)]
pub struct RetryState {
    attempts: u32,
    max_retries: u32,
    delay: Duration,
    next_token: u64,
    armed: Option<u64>,
}

impl RetryState {
    /// Create a counter allowing `max_retries` retries `delay` apart
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            attempts: 0,
            max_retries,
            delay,
            next_token: 0,
            armed: None,
        }
    }

    /// Retries performed since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Retry budget
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether a timer is armed
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Arm the next retry, if the budget allows
    pub fn schedule(&mut self) -> Option<ScheduledRetry> {
        if self.attempts >= self.max_retries {
            return None;
        }
        self.attempts += 1;
        self.next_token += 1;
        self.armed = Some(self.next_token);
        Some(ScheduledRetry {
            attempt: self.attempts,
            token: self.next_token,
            delay: self.delay,
        })
    }

    /// Consume a timer firing. Returns false for cancelled or superseded
    /// timers.
    pub fn fire(&mut self, token: u64) -> bool {
        if self.armed == Some(token) {
            self.armed = None;
            true
        } else {
            false
        }
    }

    /// Disarm any pending timer without touching the counter
    pub fn cancel(&mut self) {
        self.armed = None;
    }

    /// Disarm and restore the full budget
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.armed = None;
    }
}
