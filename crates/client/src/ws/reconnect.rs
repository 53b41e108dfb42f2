//! Exponential backoff for reconnection attempts.

use std::time::Duration;

/// Backoff schedule: attempt `n` (1-based) waits `base_delay * 2^(n-1)`,
/// without jitter. Attempts beyond `max_attempts` are never scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    /// Delay before attempt `attempt`, or `None` once past the ceiling.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let multiplier = 2_u64.saturating_pow(attempt - 1);
        Some(Duration::from_millis(
            self.base_delay_ms.saturating_mul(multiplier),
        ))
    }
}

/// Attempt counter for one connection driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempt: u32,
}

impl ReconnectState {
    /// Number of attempts scheduled since the last successful connection.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Advance to the next attempt and return its delay. Leaves the counter
    /// unchanged and returns `None` when the policy is exhausted.
    pub fn schedule(&mut self, policy: &ReconnectPolicy) -> Option<Duration> {
        let next = self.attempt + 1;
        let delay = policy.delay_for_attempt(next)?;
        self.attempt = next;
        Some(delay)
    }

    /// Reset after a successful connection, returning the attempts it took.
    pub fn reset(&mut self) -> u32 {
        std::mem::take(&mut self.attempt)
    }
}
