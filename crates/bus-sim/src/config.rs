use std::io;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use bus_arbiter::WakePolicy;
use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::runner::TaskMix;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Display, Error, From)]
pub enum ConfigError {
    #[display("cannot read config file: {_0}")]
    Io(#[error(source)] io::Error),
    #[display("malformed config: {_0}")]
    Json(#[error(source)] serde_json::Error),
    #[display("capacity must be at least 1")]
    #[from(skip)]
    ZeroCapacity,
    #[display("work range is empty: min {min} ms > max {max} ms")]
    #[from(skip)]
    EmptyWorkRange { min: u64, max: u64 },
    #[display("{_0} must be greater than zero")]
    #[from(skip)]
    ZeroInterval(#[error(not(source))] &'static str),
}

/// Parameters of one simulation run.
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Bus slots.
    pub capacity: usize,
    /// Tasks to spawn.
    pub mix: TaskMix,
    /// Shortest simulated transfer.
    pub min_work_ms: u64,
    /// Longest simulated transfer.
    pub max_work_ms: u64,
    /// Seed of the work time generator.
    pub seed: u64,
    pub policy: WakePolicy,
    /// A run that completes no task for this long is declared stalled.
    pub stall_timeout_ms: u64,
    /// Period of the invariant sampler.
    pub sample_interval_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            mix: TaskMix::new(5, 5, 0, 0),
            min_work_ms: 10,
            max_work_ms: 50,
            seed: 123_456_789,
            policy: WakePolicy::default(),
            stall_timeout_ms: 2_000,
            sample_interval_ms: 1,
        }
    }
}

impl SimConfig {
    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.min_work_ms > self.max_work_ms {
            return Err(ConfigError::EmptyWorkRange {
                min: self.min_work_ms,
                max: self.max_work_ms,
            });
        }
        if self.stall_timeout_ms == 0 {
            return Err(ConfigError::ZeroInterval("stall timeout"));
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("sample interval"));
        }
        Ok(())
    }

    pub fn capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.capacity).ok_or(ConfigError::ZeroCapacity)
    }

    pub fn min_work(&self) -> Duration {
        Duration::from_millis(self.min_work_ms)
    }

    pub fn max_work(&self) -> Duration {
        Duration::from_millis(self.max_work_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}
