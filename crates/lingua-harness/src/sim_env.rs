//! Seeded simulation environment.
//!
//! Time is virtual: it only moves when a test calls [`SimEnv::advance`] or
//! when something sleeps, and sleeping returns immediately after moving the
//! clock. Randomness comes from a ChaCha stream, so one seed always yields
//! the same message ids and the same backoff jitter.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use chrono::{DateTime, TimeZone, Utc};
use lingua_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall-clock origin of every simulation: 2025-01-01T00:00:00Z.
const EPOCH_SECS: i64 = 1_735_689_600;

struct Clock {
    rng: ChaCha8Rng,
    elapsed: Duration,
}

/// Deterministic [`Environment`].
///
/// Clones share the clock and the RNG.
#[derive(Clone)]
pub struct SimEnv {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    clock: Arc<Mutex<Clock>>,
}

impl SimEnv {
    /// Environment seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        let wall_origin = Utc.timestamp_opt(EPOCH_SECS, 0).single().unwrap_or_default();
        Self {
            origin: Instant::now(),
            wall_origin,
            clock: Arc::new(Mutex::new(Clock {
                rng: ChaCha8Rng::seed_from_u64(seed),
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Move virtual time forward.
    pub fn advance(&self, duration: Duration) {
        self.lock().elapsed += duration;
    }

    /// Virtual time since the environment was created.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn lock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("elapsed", &self.elapsed()).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or_default();
        self.wall_origin + elapsed
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}
