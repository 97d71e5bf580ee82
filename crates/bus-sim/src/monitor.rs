//! Background invariant sampler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bus_arbiter::{Direction, PerDirection};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use crate::SimArbiter;

/// Bus users per direction, counted by the tasks themselves.
///
/// A task enters after its acquire returns and leaves before it releases, so
/// these counts never exceed what the arbiter actually admitted. Anything
/// wrong seen here is an arbiter fault, not a sampling race.
#[derive(Debug, Default)]
pub struct Occupants {
    counts: PerDirection<AtomicUsize>,
}

impl Occupants {
    /// Counts a task onto the bus and reports what it found there.
    pub fn enter(&self, direction: Direction, capacity: usize) -> Option<String> {
        let mine = self.counts[direction].fetch_add(1, Ordering::SeqCst) + 1;
        let theirs = self.counts[direction.opposite()].load(Ordering::SeqCst);
        if theirs > 0 {
            Some(format!(
                "admitted {direction:?} next to {theirs} {:?} users",
                direction.opposite()
            ))
        } else if mine > capacity {
            Some(format!("{mine} {direction:?} users above capacity {capacity}"))
        } else {
            None
        }
    }

    pub fn leave(&self, direction: Direction) {
        self.counts[direction].fetch_sub(1, Ordering::SeqCst);
    }

    pub fn load(&self) -> PerDirection<usize> {
        PerDirection::new(
            self.counts.outbound.load(Ordering::SeqCst),
            self.counts.inbound.load(Ordering::SeqCst),
        )
    }

    /// Checks the current counts against the bus rules.
    pub fn check(&self, capacity: usize) -> Option<String> {
        let PerDirection { outbound, inbound } = self.load();
        if outbound > 0 && inbound > 0 {
            Some(format!("{outbound} outbound and {inbound} inbound users at once"))
        } else if outbound.max(inbound) > capacity {
            Some(format!("{} users above capacity {capacity}", outbound.max(inbound)))
        } else {
            None
        }
    }
}

/// What the sampler saw over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleSummary {
    pub samples: u64,
    pub max_occupancy: usize,
    pub violations: Vec<String>,
}

impl SampleSummary {
    fn record(&mut self, arbiter: &SimArbiter, occupants: &Occupants) {
        let snapshot = arbiter.snapshot();
        self.samples += 1;
        self.max_occupancy = self.max_occupancy.max(snapshot.occupancy);
        if !snapshot.is_consistent() {
            self.flag(format!("inconsistent bus state: {snapshot:?}"));
        }
        if let Some(violation) = occupants.check(snapshot.capacity) {
            self.flag(violation);
        }
    }

    fn flag(&mut self, violation: String) {
        warn!(%violation, "sampler");
        self.violations.push(violation);
    }
}

/// Handle to a running sampler task.
pub struct Monitor {
    stop: watch::Sender<bool>,
    handle: JoinHandle<SampleSummary>,
}

impl Monitor {
    /// Starts sampling `arbiter` and `occupants` every `period` on the
    /// current runtime.
    pub fn spawn(arbiter: Arc<SimArbiter>, occupants: Arc<Occupants>, period: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut summary = SampleSummary::default();
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticks.tick() => summary.record(&arbiter, &occupants),
                }
            }
            // One last look at the final state.
            summary.record(&arbiter, &occupants);
            summary
        });
        Self { stop, handle }
    }

    /// Stops the sampler and returns what it collected.
    pub async fn finish(self) -> Result<SampleSummary, JoinError> {
        // The receiver only goes away once the task has ended.
        let _ = self.stop.send(true);
        self.handle.await
    }
}
