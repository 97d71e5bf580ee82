#![cfg_attr(not(test), no_std)]
//! Direction-exclusive, capacity-bounded bus arbitration.
//!
//! A [`BusArbiter`] lets any number of tasks share a bus that carries traffic
//! in two directions. At most `capacity` tasks occupy the bus at once, and all
//! of them travel in the same direction; the direction can only change once
//! the bus has fully drained. Tasks flagged [`Priority::High`] bias the
//! wakeups issued on release so they tend to get freed slots first.
//!
//! ```ignore
//! let slot = ARBITER.acquire(Task::normal(Direction::Outbound)).await;
//! transfer().await;
//! slot.release();
//! ```

extern crate alloc;

#[macro_use]
mod fmt;

mod arbiter;
mod error;
mod policy;
mod slot;
mod stats;
mod task;
mod waitqueue;

pub use arbiter::{Acquire, BusArbiter, BusSnapshot};
pub use error::TryAcquireError;
pub use policy::WakePolicy;
pub use slot::BusSlot;
pub use stats::BusStats;
pub use task::{Direction, PerDirection, Priority, Task};
