/// What a release does when it leaves no high-priority waiter behind in the
/// current direction.
///
/// Both policies first hand one wakeup to the current direction while it has
/// high-priority waiters. That wakeup goes to the oldest high-priority task
/// still parked in the direction's queue, or to the oldest parked task when
/// every high-priority waiter has already been woken. Waiters of one class
/// are therefore woken in arrival order, which is stronger than the plain
/// "wake the queue head" bias a condition variable would give.
///
/// The policies differ only on the release that drains the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum WakePolicy {
    /// A drain wakes every waiter of the opposite direction, and nobody else.
    ///
    /// Normal-priority waiters of the drained direction that were blocked by
    /// a full bus are not woken. If no opposite traffic ever arrives they stay
    /// blocked forever.
    #[default]
    OppositeOnDrain,
    /// A drain wakes every waiter of the opposite direction when there are
    /// any, and every waiter of the drained direction otherwise.
    ///
    /// Keeps the direction flip bias of [`OppositeOnDrain`] while guaranteeing
    /// that a finite set of tasks always runs to completion.
    ///
    /// [`OppositeOnDrain`]: WakePolicy::OppositeOnDrain
    EitherOnDrain,
}
