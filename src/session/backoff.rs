// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Reconnect timing.

use std::time::{Duration, Instant};

const FIRST_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(8);

/// Retry schedule that doubles from one second up to eight
#[derive(Debug, Clone)]
pub struct Backoff {
    attempts: u32,
    delay: Duration,
    next_attempt: Instant,
}

impl Backoff {
    pub fn new(now: Instant) -> Self {
        Self {
            attempts: 0,
            delay: FIRST_DELAY,
            next_attempt: now,
        }
    }

    /// Failed attempts since the last success
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait before the next attempt
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_attempt
    }

    /// Schedule the next attempt after a failure
    pub fn failed(&mut self, now: Instant) {
        if self.attempts > 0 {
            self.delay = (self.delay * 2).min(MAX_DELAY);
        }
        self.attempts += 1;
        self.next_attempt = now + self.delay;
    }

    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }
}
