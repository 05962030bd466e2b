use std::collections::HashMap;
use std::time::Duration;

use flowcast_core::fault::{ErrorCode, ErrorDetails};

/// What to do after a session ended in a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Start a new session after `delay`. `attempt` counts from 1.
    Retry { attempt: u32, delay: Duration },
    /// The fault is not retryable, or its attempts are used up.
    Exhausted { attempts: u32 },
}

/// Exponential backoff with a per-code attempt bound.
///
/// Attempt `n` of a code waits `base_delay * 2^n`. The bound is the code's
/// `max_retries`. Counts are kept per code, so a run of parse faults does not
/// eat into the budget for connection faults.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    attempts: HashMap<ErrorCode, u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            attempts: HashMap::new(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn attempts(&self, code: ErrorCode) -> u32 {
        self.attempts.get(&code).copied().unwrap_or(0)
    }

    /// Record a fault and decide whether to try again.
    pub fn decide(&mut self, details: &ErrorDetails) -> RetryDecision {
        let used = self.attempts(details.code);
        if !details.retryable || used >= details.max_retries {
            return RetryDecision::Exhausted { attempts: used };
        }

        let attempt = used + 1;
        self.attempts.insert(details.code, attempt);
        RetryDecision::Retry {
            attempt,
            delay: self.delay_for(attempt),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Forget the attempts for one code.
    pub fn clear(&mut self, code: ErrorCode) {
        self.attempts.remove(&code);
    }

    /// Forget every attempt. Called after a session completes.
    pub fn reset(&mut self) {
        self.attempts.clear();
    }
}
