//! Spawns simulated bus users.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bus_arbiter::{Direction, Task};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, trace, warn, Instrument};

use crate::delay::DelayProvider;
use crate::monitor::Occupants;
use crate::SimArbiter;

/// How many tasks of each kind to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskMix {
    pub outbound_normal: usize,
    pub inbound_normal: usize,
    pub outbound_high: usize,
    pub inbound_high: usize,
}

impl TaskMix {
    pub const fn new(
        outbound_normal: usize,
        inbound_normal: usize,
        outbound_high: usize,
        inbound_high: usize,
    ) -> Self {
        Self { outbound_normal, inbound_normal, outbound_high, inbound_high }
    }

    pub fn total(&self) -> usize {
        self.outbound_normal + self.inbound_normal + self.outbound_high + self.inbound_high
    }

    /// Task descriptors in spawn order: outbound normal, inbound normal,
    /// outbound high, inbound high.
    pub fn tasks(&self) -> impl Iterator<Item = Task> {
        let groups = [
            (Task::normal(Direction::Outbound), self.outbound_normal),
            (Task::normal(Direction::Inbound), self.inbound_normal),
            (Task::high(Direction::Outbound), self.outbound_high),
            (Task::high(Direction::Inbound), self.inbound_high),
        ];
        groups
            .into_iter()
            .flat_map(|(task, count)| std::iter::repeat_n(task, count))
    }
}

/// What one task observed during its cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: usize,
    pub task: Task,
    /// Time blocked in `acquire`.
    pub waited: Duration,
    /// Time spent holding the slot.
    pub worked: Duration,
    /// Set when opposite traffic or too many users shared the bus on entry.
    pub violation: Option<String>,
}

/// Spawns acquire, work, release cycles on the current tokio runtime.
pub struct TaskRunner {
    arbiter: Arc<SimArbiter>,
    delay: Arc<dyn DelayProvider>,
    occupants: Arc<Occupants>,
    next_id: AtomicUsize,
}

impl TaskRunner {
    pub fn new(arbiter: Arc<SimArbiter>, delay: Arc<dyn DelayProvider>) -> Self {
        Self {
            arbiter,
            delay,
            occupants: Arc::new(Occupants::default()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn arbiter(&self) -> &Arc<SimArbiter> {
        &self.arbiter
    }

    /// Users currently on the bus, as counted by the spawned tasks.
    pub fn occupants(&self) -> &Arc<Occupants> {
        &self.occupants
    }

    /// Spawns every task in `mix`. Ids keep increasing across calls.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, mix: TaskMix) -> Vec<JoinHandle<TaskRecord>> {
        mix.tasks().map(|task| self.spawn(task)).collect()
    }

    /// Spawns a single task.
    pub fn spawn(&self, task: Task) -> JoinHandle<TaskRecord> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let span = info_span!(
            "task",
            id,
            direction = ?task.direction,
            priority = ?task.priority
        );
        let cycle = run_cycle(
            self.arbiter.clone(),
            self.delay.clone(),
            self.occupants.clone(),
            id,
            task,
        );
        tokio::spawn(cycle.instrument(span))
    }
}

async fn run_cycle(
    arbiter: Arc<SimArbiter>,
    delay: Arc<dyn DelayProvider>,
    occupants: Arc<Occupants>,
    id: usize,
    task: Task,
) -> TaskRecord {
    trace!("requesting bus");
    let requested = Instant::now();
    let slot = arbiter.acquire(task).await;
    let waited = requested.elapsed();

    let violation = occupants.enter(task.direction, arbiter.capacity());
    if let Some(violation) = &violation {
        warn!(%violation, "bus shared illegally");
    }
    debug!(?waited, occupancy = arbiter.occupancy(), "on the bus");

    let work = delay.next_delay();
    let started = Instant::now();
    tokio::time::sleep(work).await;
    let worked = started.elapsed();
    occupants.leave(task.direction);
    slot.release();
    debug!(?worked, "left the bus");

    TaskRecord { id, task, waited, worked, violation }
}
