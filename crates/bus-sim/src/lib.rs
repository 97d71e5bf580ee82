//! Host-side simulation of tasks sharing a [`BusArbiter`].
//!
//! Tasks are spawned on a tokio runtime, each one acquiring the bus in its
//! direction, holding it for a delay and releasing it. A sampler watches the
//! arbiter while the run is in progress and a watchdog ends runs that stop
//! making progress, so stranded waiters show up in the report instead of
//! hanging the process.

use bus_arbiter::BusArbiter;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

// Tasks run on several worker threads; link the std critical section.
use critical_section as _;

pub mod config;
pub mod delay;
pub mod monitor;
pub mod report;
pub mod runner;
pub mod sim;

pub use bus_arbiter as arbiter;
pub use config::{ConfigError, SimConfig};
pub use delay::{DelayProvider, FixedDelay, RandomDelay};
pub use monitor::{Monitor, Occupants, SampleSummary};
pub use report::{Outcome, RunReport};
pub use runner::{TaskMix, TaskRecord, TaskRunner};

/// Arbiter shared by simulated tasks across threads.
pub type SimArbiter = BusArbiter<CriticalSectionRawMutex>;
