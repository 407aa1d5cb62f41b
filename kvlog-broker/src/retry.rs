//! Exponential backoff for lost compare-and-swap attempts.

use std::time::Duration;

use crate::config::AllocatorConfig;

/// Attempt budget and delay curve for one reservation.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_attempts: u32,
    current: Duration,
    max_delay: Duration,
    multiplier: u32,
    attempts: u32,
}

impl Backoff {
    /// Start a fresh budget from allocator settings.
    pub fn new(config: &AllocatorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            current: config.initial_backoff,
            max_delay: config.max_backoff,
            multiplier: config.backoff_multiplier,
            attempts: 0,
        }
    }

    /// Record an attempt. Returns false once the budget is spent.
    pub fn start_attempt(&mut self) -> bool {
        if self.attempts >= self.max_attempts {
            return false;
        }
        self.attempts += 1;
        true
    }

    /// Delay to wait after the current attempt was lost; grows for the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .saturating_mul(self.multiplier)
            .min(self.max_delay);
        delay
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
