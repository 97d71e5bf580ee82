use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::arbiter::BusArbiter;
use crate::task::{Direction, Priority, Task};

/// Proof of holding one bus slot.
///
/// Only [`BusArbiter::acquire`] and [`BusArbiter::try_acquire`] hand these
/// out, so every release is paired with exactly one admission. Dropping the
/// slot releases it, which may wake waiting tasks.
#[must_use = "dropping a slot releases it immediately"]
pub struct BusSlot<'a, M: RawMutex> {
    arbiter: &'a BusArbiter<M>,
    task: Task,
}

impl<'a, M: RawMutex> BusSlot<'a, M> {
    /// Create a new slot. Only called by `BusArbiter`.
    pub(crate) fn new(arbiter: &'a BusArbiter<M>, task: Task) -> Self {
        Self { arbiter, task }
    }

    /// The task this slot was granted to.
    #[inline]
    pub fn task(&self) -> Task {
        self.task
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.task.direction
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.task.priority
    }

    /// The arbiter this slot belongs to.
    #[inline]
    pub fn arbiter(&self) -> &'a BusArbiter<M> {
        self.arbiter
    }

    /// Give the slot back. Same as dropping it.
    pub fn release(self) {}
}

impl<M: RawMutex> Drop for BusSlot<'_, M> {
    fn drop(&mut self) {
        self.arbiter.release(self.task);
    }
}
