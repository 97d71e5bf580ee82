use std::fmt;
use std::time::Duration;

use bus_arbiter::{BusSnapshot, BusStats, Direction, Priority, Task};
use serde::Serialize;

use crate::config::SimConfig;
use crate::monitor::SampleSummary;
use crate::runner::TaskRecord;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    /// Every task went through the bus.
    Completed,
    /// The watchdog gave up waiting for tasks to finish.
    Stalled {
        /// Tasks that never finished.
        unfinished: usize,
        /// Bus state when the run was abandoned.
        snapshot: BusSnapshot,
    },
}

/// Wait times of one kind of task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSummary {
    pub task: Task,
    pub count: usize,
    pub mean_wait_ms: f64,
    pub max_wait_ms: f64,
}

impl ClassSummary {
    fn collect(task: Task, records: &[TaskRecord]) -> Option<Self> {
        let waits: Vec<Duration> = records
            .iter()
            .filter(|r| r.task == task)
            .map(|r| r.waited)
            .collect();
        if waits.is_empty() {
            return None;
        }
        let total: Duration = waits.iter().sum();
        let max = waits.iter().max().copied().unwrap_or_default();
        Some(Self {
            task,
            count: waits.len(),
            mean_wait_ms: millis(total) / waits.len() as f64,
            max_wait_ms: millis(max),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub outcome: Outcome,
    pub config: SimConfig,
    pub elapsed_ms: f64,
    /// Per kind of task, only kinds that finished at least once.
    pub classes: Vec<ClassSummary>,
    pub stats: BusStats,
    pub samples: SampleSummary,
    /// Problems tasks noticed right after being admitted.
    pub violations: Vec<String>,
}

impl RunReport {
    pub fn new(
        outcome: Outcome,
        config: SimConfig,
        elapsed: Duration,
        records: &[TaskRecord],
        stats: BusStats,
        samples: SampleSummary,
    ) -> Self {
        let classes = Direction::ALL
            .into_iter()
            .flat_map(|d| [Task::normal(d), Task::high(d)])
            .filter_map(|task| ClassSummary::collect(task, records))
            .collect();
        let violations = records
            .iter()
            .filter_map(|r| {
                r.violation.as_ref().map(|v| format!("task {}: {v}", r.id))
            })
            .collect();
        Self {
            outcome,
            config,
            elapsed_ms: millis(elapsed),
            classes,
            stats,
            samples,
            violations,
        }
    }

    pub fn class(&self, task: Task) -> Option<&ClassSummary> {
        self.classes.iter().find(|c| c.task == task)
    }

    pub fn completed(&self) -> bool {
        self.outcome == Outcome::Completed
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty() || !self.samples.violations.is_empty()
    }

    /// Completed without any observed violation.
    pub fn is_success(&self) -> bool {
        self.completed() && !self.has_violations()
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}

fn direction_name(d: Direction) -> &'static str {
    match d {
        Direction::Outbound => "outbound",
        Direction::Inbound => "inbound",
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Completed => {
                writeln!(f, "completed in {:.1} ms", self.elapsed_ms)?;
            }
            Outcome::Stalled { unfinished, snapshot } => {
                writeln!(
                    f,
                    "STALLED after {:.1} ms: {unfinished} task(s) never got the bus",
                    self.elapsed_ms
                )?;
                writeln!(
                    f,
                    "  occupancy {}, waiting {} outbound / {} inbound, high {} / {}",
                    snapshot.occupancy,
                    snapshot.waiters.outbound,
                    snapshot.waiters.inbound,
                    snapshot.high_waiters.outbound,
                    snapshot.high_waiters.inbound,
                )?;
            }
        }
        writeln!(
            f,
            "capacity {}, policy {:?}, seed {}",
            self.config.capacity, self.config.policy, self.config.seed
        )?;
        for class in &self.classes {
            let priority = match class.task.priority {
                Priority::Normal => "normal",
                Priority::High => "high",
            };
            writeln!(
                f,
                "  {:<8} {:<6} {:>4} tasks, wait mean {:>7.1} ms, max {:>7.1} ms",
                direction_name(class.task.direction),
                priority,
                class.count,
                class.mean_wait_ms,
                class.max_wait_ms,
            )?;
        }
        let stats = &self.stats;
        writeln!(
            f,
            "admitted {}, direction flips {}, peak occupancy {}, wakeups {} single / {} broadcast",
            stats.admitted(),
            stats.direction_flips,
            stats.peak_occupancy,
            stats.wake_one,
            stats.wake_all,
        )?;
        write!(
            f,
            "{} samples, max occupancy {}",
            self.samples.samples, self.samples.max_occupancy
        )?;
        for violation in self.violations.iter().chain(&self.samples.violations) {
            write!(f, "\nviolation: {violation}")?;
        }
        Ok(())
    }
}
