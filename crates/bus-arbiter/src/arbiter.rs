use core::cell::RefCell;
use core::future::Future;
use core::num::NonZeroUsize;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::error::TryAcquireError;
use crate::policy::WakePolicy;
use crate::slot::BusSlot;
use crate::stats::{BusStats, Counters};
use crate::task::{Direction, PerDirection, Task};
use crate::waitqueue::{Ticket, WaitQueue};

/// Shared bookkeeping, only ever touched with the arbiter lock held.
struct BusState {
    occupancy: usize,
    /// Direction of the current occupants. Kept after a drain as the last
    /// direction the bus ran in.
    direction: Option<Direction>,
    waiters: PerDirection<usize>,
    high_waiters: PerDirection<usize>,
    queues: PerDirection<WaitQueue>,
    next_ticket: Ticket,
}

impl BusState {
    const fn new() -> Self {
        Self {
            occupancy: 0,
            direction: None,
            waiters: PerDirection::new(0, 0),
            high_waiters: PerDirection::new(0, 0),
            queues: PerDirection::new(WaitQueue::new(), WaitQueue::new()),
            next_ticket: 0,
        }
    }

    /// Evaluates the entry predicate for `direction`.
    fn blocked(
        &self,
        capacity: usize,
        direction: Direction,
    ) -> Option<TryAcquireError> {
        if self.occupancy == capacity {
            return Some(TryAcquireError::Full);
        }
        match self.direction {
            Some(current) if self.occupancy > 0 && current != direction => {
                Some(TryAcquireError::Opposed(current))
            }
            _ => None,
        }
    }

    /// Takes a slot. Returns `true` when this turned the bus around.
    fn admit(&mut self, capacity: usize, direction: Direction) -> bool {
        debug_assert!(self.occupancy < capacity);
        let flipped = self.direction.is_some_and(|d| d != direction);
        self.occupancy += 1;
        self.direction = Some(direction);
        flipped
    }

    fn park(&mut self, task: Task, waker: &Waker) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.waiters[task.direction] += 1;
        if task.priority.is_high() {
            self.high_waiters[task.direction] += 1;
        }
        self.queues[task.direction].push(ticket, task.priority, waker);
        ticket
    }

    /// Undoes [`park`](Self::park). Returns `false` when the entry had
    /// already been taken off the queue by a wakeup.
    fn unpark(&mut self, task: Task, ticket: Ticket) -> bool {
        debug_assert!(self.waiters[task.direction] > 0);
        self.waiters[task.direction] -= 1;
        if task.priority.is_high() {
            debug_assert!(self.high_waiters[task.direction] > 0);
            self.high_waiters[task.direction] -= 1;
        }
        self.queues[task.direction].remove(ticket)
    }
}

/// Consistent view of an arbiter's state, taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusSnapshot {
    pub capacity: usize,
    pub occupancy: usize,
    /// Direction of the current occupants, `None` while the bus is empty.
    pub direction: Option<Direction>,
    /// Tasks blocked in `acquire`, per direction.
    pub waiters: PerDirection<usize>,
    /// High-priority tasks blocked in `acquire`, per direction.
    pub high_waiters: PerDirection<usize>,
}

impl BusSnapshot {
    pub fn is_idle(&self) -> bool {
        self.occupancy == 0
    }

    /// Blocked tasks over both directions.
    pub fn waiting(&self) -> usize {
        self.waiters.outbound + self.waiters.inbound
    }

    /// Whether the counting invariants hold in this view.
    pub fn is_consistent(&self) -> bool {
        self.occupancy <= self.capacity
            && (self.occupancy == 0) == self.direction.is_none()
            && Direction::ALL
                .iter()
                .all(|&d| self.high_waiters[d] <= self.waiters[d])
    }
}

/// What a release asked the wait queues to do.
enum Wakeup {
    None,
    One(Direction),
    All(Direction, usize),
}

/// Arbitrates a shared bus between outbound and inbound tasks.
///
/// Up to `capacity` tasks may hold a slot at once, and only if they all
/// travel in the same direction. Tasks that cannot enter park on their
/// direction's queue and re-check on every wakeup. Releases wake waiters
/// according to the [`WakePolicy`], giving high-priority waiters of the
/// current direction the first chance at a freed slot.
///
/// `M` selects the lock: [`CriticalSectionRawMutex`] when tasks run on
/// several threads or executors, [`NoopRawMutex`] on a single executor.
///
/// [`CriticalSectionRawMutex`]: embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex
/// [`NoopRawMutex`]: embassy_sync::blocking_mutex::raw::NoopRawMutex
pub struct BusArbiter<M: RawMutex> {
    capacity: NonZeroUsize,
    policy: WakePolicy,
    state: Mutex<M, RefCell<BusState>>,
    counters: Counters,
}

impl<M: RawMutex> BusArbiter<M> {
    /// Create an empty bus with `capacity` slots.
    pub const fn new(capacity: NonZeroUsize, policy: WakePolicy) -> Self {
        Self {
            capacity,
            policy,
            state: Mutex::new(RefCell::new(BusState::new())),
            counters: Counters::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn policy(&self) -> WakePolicy {
        self.policy
    }

    /// Wait for a slot in `task.direction`.
    ///
    /// The returned future resolves once the bus has a free slot and is
    /// either empty or already running in the task's direction. The slot is
    /// held until the returned [`BusSlot`] is released or dropped.
    ///
    /// Dropping the future before it resolves withdraws the request.
    pub fn acquire(&self, task: Task) -> Acquire<'_, M> {
        Acquire { arbiter: self, task, ticket: None }
    }

    /// Take a slot only if one is available right now.
    pub fn try_acquire(
        &self,
        task: Task,
    ) -> Result<BusSlot<'_, M>, TryAcquireError> {
        let capacity = self.capacity();
        let (flipped, occupancy) = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            if let Some(err) = state.blocked(capacity, task.direction) {
                return Err(err);
            }
            let flipped = state.admit(capacity, task.direction);
            Ok((flipped, state.occupancy))
        })?;
        self.admitted(task, flipped, occupancy);
        Ok(BusSlot::new(self, task))
    }

    /// Current number of occupied slots.
    pub fn occupancy(&self) -> usize {
        self.state.lock(|cell| cell.borrow().occupancy)
    }

    pub fn snapshot(&self) -> BusSnapshot {
        let capacity = self.capacity();
        self.state.lock(|cell| {
            let state = cell.borrow();
            BusSnapshot {
                capacity,
                occupancy: state.occupancy,
                direction: state.direction.filter(|_| state.occupancy > 0),
                waiters: state.waiters,
                high_waiters: state.high_waiters,
            }
        })
    }

    pub fn stats(&self) -> BusStats {
        self.counters.load()
    }

    fn poll_acquire(
        &self,
        task: Task,
        ticket: &mut Option<Ticket>,
        cx: &mut Context<'_>,
    ) -> Poll<()> {
        let capacity = self.capacity();
        let admitted = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            // Every poll of a parked acquirer counts as a wakeup, real or
            // spurious: leave the queue before looking at the bus again.
            if let Some(ticket) = ticket.take() {
                state.unpark(task, ticket);
            }
            if state.blocked(capacity, task.direction).is_some() {
                *ticket = Some(state.park(task, cx.waker()));
                return None;
            }
            let flipped = state.admit(capacity, task.direction);
            Some((flipped, state.occupancy))
        });

        match admitted {
            Some((flipped, occupancy)) => {
                self.admitted(task, flipped, occupancy);
                Poll::Ready(())
            }
            None => Poll::Pending,
        }
    }

    /// Withdraws a parked acquirer that will never be polled again.
    fn abandon(&self, task: Task, ticket: Ticket) {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            if !state.unpark(task, ticket) {
                // The wakeup meant for this acquirer would be lost with it.
                state.queues[task.direction].wake_one();
            }
        });
        trace!("withdrew {:?} request", task.direction);
    }

    fn admitted(&self, task: Task, flipped: bool, occupancy: usize) {
        self.counters.record_admission(task, flipped, occupancy);
        trace!(
            "admitted {:?} {:?} task, occupancy {}",
            task.direction,
            task.priority,
            occupancy
        );
    }

    /// Frees the slot held by `task` and wakes waiters.
    pub(crate) fn release(&self, task: Task) {
        let current = task.direction;
        let (occupancy, wakeup) = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            debug_assert!(state.occupancy > 0);
            debug_assert_eq!(state.direction, Some(current));
            state.occupancy -= 1;

            let wakeup = if state.high_waiters[current] > 0 {
                if state.queues[current].wake_one() {
                    Wakeup::One(current)
                } else {
                    Wakeup::None
                }
            } else if state.occupancy == 0 {
                let target = match self.policy {
                    WakePolicy::OppositeOnDrain => current.opposite(),
                    WakePolicy::EitherOnDrain => {
                        if state.waiters[current.opposite()] > 0 {
                            current.opposite()
                        } else {
                            current
                        }
                    }
                };
                Wakeup::All(target, state.queues[target].wake_all())
            } else {
                Wakeup::None
            };
            (state.occupancy, wakeup)
        });

        match wakeup {
            Wakeup::One(direction) => {
                self.counters.record_wake_one();
                debug!(
                    "released {:?} slot, occupancy {}, woke one {:?} waiter",
                    current,
                    occupancy,
                    direction
                );
            }
            Wakeup::All(direction, woken) if woken > 0 => {
                self.counters.record_wake_all();
                debug!(
                    "released {:?} slot, bus drained, woke {} {:?} waiters",
                    current,
                    woken,
                    direction
                );
            }
            _ => {
                trace!("released {:?} slot, occupancy {}", current, occupancy);
            }
        }
    }
}

/// Future returned by [`BusArbiter::acquire`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Acquire<'a, M: RawMutex> {
    arbiter: &'a BusArbiter<M>,
    task: Task,
    ticket: Option<Ticket>,
}

impl<'a, M: RawMutex> Acquire<'a, M> {
    pub fn task(&self) -> Task {
        self.task
    }
}

impl<'a, M: RawMutex> Future for Acquire<'a, M> {
    type Output = BusSlot<'a, M>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match this.arbiter.poll_acquire(this.task, &mut this.ticket, cx) {
            Poll::Ready(()) => Poll::Ready(BusSlot::new(this.arbiter, this.task)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<M: RawMutex> Drop for Acquire<'_, M> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.arbiter.abandon(self.task, ticket);
        }
    }
}
