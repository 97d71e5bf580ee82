//! Per-direction queue of parked acquirers.
//!
//! Plays the role of a condition variable for async tasks: waking an entry
//! only asks its task to poll again, the task itself re-checks whether it may
//! enter. Entries are kept in arrival order.

use alloc::collections::VecDeque;
use core::task::Waker;

use crate::task::Priority;

/// Identifies one parked acquirer inside a queue.
pub(crate) type Ticket = u32;

struct Entry {
    ticket: Ticket,
    priority: Priority,
    waker: Waker,
}

/// Grows with the number of parked tasks, so parking never has to wake
/// anyone to make room.
pub(crate) struct WaitQueue {
    entries: VecDeque<Entry>,
}

impl WaitQueue {
    pub(crate) const fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    /// Parks `waker` under `ticket`.
    pub(crate) fn push(&mut self, ticket: Ticket, priority: Priority, waker: &Waker) {
        self.entries.push_back(Entry { ticket, priority, waker: waker.clone() });
    }

    /// Removes the entry for `ticket`. Returns `false` when it was no longer
    /// queued, i.e. it has already been woken.
    pub(crate) fn remove(&mut self, ticket: Ticket) -> bool {
        match self.entries.iter().position(|e| e.ticket == ticket) {
            Some(index) => self.entries.remove(index).is_some(),
            None => false,
        }
    }

    /// Wakes a single parked task, preferring the oldest high-priority one.
    ///
    /// Returns `false` when the queue was empty.
    pub(crate) fn wake_one(&mut self) -> bool {
        let index = self
            .entries
            .iter()
            .position(|e| e.priority.is_high())
            .unwrap_or(0);
        match self.entries.remove(index) {
            Some(entry) => {
                entry.waker.wake();
                true
            }
            None => false,
        }
    }

    /// Wakes every parked task. Returns how many were woken.
    pub(crate) fn wake_all(&mut self) -> usize {
        let woken = self.entries.len();
        for entry in self.entries.drain(..) {
            entry.waker.wake();
        }
        woken
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    struct Counter(AtomicUsize);

    impl Wake for Counter {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_waker() -> (Waker, Arc<Counter>) {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        (Waker::from(counter.clone()), counter)
    }

    fn woken(counter: &Counter) -> usize {
        counter.0.load(Ordering::SeqCst)
    }

    #[test]
    fn wake_one_prefers_oldest_high_entry() {
        let mut queue = WaitQueue::new();
        let (normal, normal_count) = counting_waker();
        let (high_a, high_a_count) = counting_waker();
        let (high_b, high_b_count) = counting_waker();
        queue.push(1, Priority::Normal, &normal);
        queue.push(2, Priority::High, &high_a);
        queue.push(3, Priority::High, &high_b);

        assert!(queue.wake_one());
        assert_eq!(woken(&high_a_count), 1);
        assert_eq!(woken(&high_b_count), 0);
        assert_eq!(woken(&normal_count), 0);

        assert!(queue.wake_one());
        assert_eq!(woken(&high_b_count), 1);

        assert!(queue.wake_one());
        assert_eq!(woken(&normal_count), 1);
        assert!(!queue.wake_one());
    }

    #[test]
    fn remove_reports_whether_entry_was_queued() {
        let mut queue = WaitQueue::new();
        let (waker, _) = counting_waker();
        queue.push(7, Priority::Normal, &waker);
        assert!(queue.remove(7));
        assert!(!queue.remove(7));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn parking_many_tasks_wakes_nobody() {
        let mut queue = WaitQueue::new();
        let (waker, count) = counting_waker();
        for ticket in 0..100 {
            queue.push(ticket, Priority::Normal, &waker);
        }
        assert_eq!(woken(&count), 0);
        assert_eq!(queue.len(), 100);
    }

    #[test]
    fn wake_all_empties_queue() {
        let mut queue = WaitQueue::new();
        let (waker, count) = counting_waker();
        queue.push(1, Priority::Normal, &waker);
        queue.push(2, Priority::High, &waker);
        assert_eq!(queue.wake_all(), 2);
        assert_eq!(woken(&count), 2);
        assert_eq!(queue.len(), 0);
    }
}
