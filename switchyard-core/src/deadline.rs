//! Deadline - a time budget shared by sequential blocking steps
//!
//! One deadline is created per handler invocation from the configured
//! operation timeout. Every wait or retry in that invocation takes
//! `remaining()` as its own timeout, so the steps together can never exceed
//! the configured budget.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            start: Instant::now(),
            timeout,
        }
    }

    /// Total budget this deadline was created with
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left before the deadline; zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.start.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
