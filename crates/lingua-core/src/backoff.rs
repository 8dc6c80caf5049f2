//! Reconnect delay schedule.
//!
//! Exponential with jitter, the schedule Socket.IO clients use:
//! `min * 2^attempt`, moved up or down by at most half of itself, then capped
//! at `max`.

use std::time::Duration;

use crate::{connection::ConnectionConfig, env::Environment};

const FACTOR: u64 = 2;
const JITTER: f64 = 0.5;

/// Delay schedule for one run of reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    attempts: u32,
}

impl Backoff {
    /// Schedule between `min` and `max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, attempts: 0 }
    }

    /// Schedule from the reconnection options.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.reconnection_delay, config.reconnection_delay_max)
    }

    /// Delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Next delay, drawing jitter from `env`.
    pub fn next_delay<E: Environment>(&mut self, env: &E) -> Duration {
        let delay = self.delay(self.attempts, env.random_u32());
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Delay for `attempt` given a uniform random `sample`.
    pub fn delay(&self, attempt: u32, sample: u32) -> Duration {
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;

        let base = min_ms.saturating_mul(FACTOR.saturating_pow(attempt));
        let unit = f64::from(sample) / f64::from(u32::MAX);
        let deviation = (unit * JITTER * base as f64) as u64;
        let jittered = if ((unit * 10.0) as u64) & 1 == 0 {
            base.saturating_sub(deviation)
        } else {
            base.saturating_add(deviation)
        };

        Duration::from_millis(jittered.min(max_ms))
    }
}
