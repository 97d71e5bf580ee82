//! Simulated work time.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the time a task spends on the bus.
///
/// Implementations only produce durations; they never touch the arbiter.
pub trait DelayProvider: Send + Sync {
    fn next_delay(&self) -> Duration;
}

/// Uniformly distributed delays drawn from a seeded generator.
///
/// Delays have millisecond resolution. Two providers built with the same seed
/// and range hand out the same sequence.
pub struct RandomDelay {
    rng: Mutex<StdRng>,
    min_ms: u64,
    max_ms: u64,
}

impl RandomDelay {
    pub const DEFAULT_SEED: u64 = 123_456_789;

    /// Delays in `[min, max]`. The bounds are swapped if given in reverse.
    pub fn new(seed: u64, min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            min_ms: min.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    pub fn range(&self) -> (Duration, Duration) {
        (Duration::from_millis(self.min_ms), Duration::from_millis(self.max_ms))
    }
}

impl Default for RandomDelay {
    /// One to five ticks of 10 ms.
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_SEED,
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
    }
}

impl DelayProvider for RandomDelay {
    fn next_delay(&self) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_millis(rng.random_range(self.min_ms..=self.max_ms))
    }
}

/// Always the same delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl DelayProvider for FixedDelay {
    fn next_delay(&self) -> Duration {
        self.0
    }
}
