use portable_atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::task::{Direction, PerDirection, Task};

/// Lifetime counters of an arbiter, readable without taking its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusStats {
    /// Normal-priority admissions per direction.
    pub admitted_normal: PerDirection<u32>,
    /// High-priority admissions per direction.
    pub admitted_high: PerDirection<u32>,
    /// Admissions that changed the bus direction.
    pub direction_flips: u32,
    /// Highest occupancy ever reached.
    pub peak_occupancy: usize,
    /// Releases that woke a single waiter.
    pub wake_one: u32,
    /// Releases that woke a whole queue.
    pub wake_all: u32,
}

impl BusStats {
    /// All admissions, both priorities and directions.
    pub fn admitted(&self) -> u64 {
        [
            self.admitted_normal.outbound,
            self.admitted_normal.inbound,
            self.admitted_high.outbound,
            self.admitted_high.inbound,
        ]
        .into_iter()
        .map(u64::from)
        .sum()
    }
}

pub(crate) struct Counters {
    admitted: [AtomicU32; 4],
    direction_flips: AtomicU32,
    peak_occupancy: AtomicUsize,
    wake_one: AtomicU32,
    wake_all: AtomicU32,
}

impl Counters {
    pub(crate) const fn new() -> Self {
        Self {
            admitted: [
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
            ],
            direction_flips: AtomicU32::new(0),
            peak_occupancy: AtomicUsize::new(0),
            wake_one: AtomicU32::new(0),
            wake_all: AtomicU32::new(0),
        }
    }

    fn slot(task: Task) -> usize {
        task.direction.index() * 2 + usize::from(task.priority.is_high())
    }

    pub(crate) fn record_admission(
        &self,
        task: Task,
        flipped: bool,
        occupancy: usize,
    ) {
        self.admitted[Self::slot(task)].fetch_add(1, Ordering::Relaxed);
        if flipped {
            self.direction_flips.fetch_add(1, Ordering::Relaxed);
        }
        self.peak_occupancy.fetch_max(occupancy, Ordering::Relaxed);
    }

    pub(crate) fn record_wake_one(&self) {
        self.wake_one.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wake_all(&self) {
        self.wake_all.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn load(&self) -> BusStats {
        let admitted =
            |task: Task| self.admitted[Self::slot(task)].load(Ordering::Relaxed);
        BusStats {
            admitted_normal: PerDirection::new(
                admitted(Task::normal(Direction::Outbound)),
                admitted(Task::normal(Direction::Inbound)),
            ),
            admitted_high: PerDirection::new(
                admitted(Task::high(Direction::Outbound)),
                admitted(Task::high(Direction::Inbound)),
            ),
            direction_flips: self.direction_flips.load(Ordering::Relaxed),
            peak_occupancy: self.peak_occupancy.load(Ordering::Relaxed),
            wake_one: self.wake_one.load(Ordering::Relaxed),
            wake_all: self.wake_all.load(Ordering::Relaxed),
        }
    }
}
