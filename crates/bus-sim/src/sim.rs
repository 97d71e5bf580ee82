//! One complete simulation run.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use bus_arbiter::BusArbiter;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::SimConfig;
use crate::delay::{DelayProvider, RandomDelay};
use crate::monitor::Monitor;
use crate::report::{Outcome, RunReport};
use crate::runner::TaskRunner;

/// Runs `config` with seeded random work times.
pub async fn run(config: SimConfig) -> Result<RunReport> {
    let delay = RandomDelay::new(config.seed, config.min_work(), config.max_work());
    run_with_delay(config, Arc::new(delay)).await
}

/// Runs `config`, drawing work times from `delay`.
///
/// Ends as [`Outcome::Stalled`] when no task finishes within the configured
/// stall timeout; the remaining tasks are aborted. A task that panics fails
/// the run after the others and the sampler have been stopped.
pub async fn run_with_delay(
    config: SimConfig,
    delay: Arc<dyn DelayProvider>,
) -> Result<RunReport> {
    config.validate().context("invalid simulation config")?;
    let arbiter = Arc::new(BusArbiter::new(config.capacity()?, config.policy));
    let runner = TaskRunner::new(arbiter.clone(), delay);
    let monitor = Monitor::spawn(
        arbiter.clone(),
        runner.occupants().clone(),
        config.sample_interval(),
    );

    info!(
        capacity = config.capacity,
        tasks = config.mix.total(),
        policy = ?config.policy,
        "starting run"
    );
    let started = Instant::now();
    let handles = runner.schedule(config.mix);
    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
    let mut pending: FuturesUnordered<_> = handles.into_iter().collect();

    let mut records = Vec::with_capacity(config.mix.total());
    let mut stalled = false;
    loop {
        match timeout(config.stall_timeout(), pending.next()).await {
            Ok(Some(Ok(record))) => records.push(record),
            Ok(Some(Err(err))) => {
                for abort in &aborts {
                    abort.abort();
                }
                let _ = monitor.finish().await;
                return Err(err).context("task failed");
            }
            Ok(None) => break,
            Err(_) => {
                stalled = true;
                break;
            }
        }
    }
    let elapsed = started.elapsed();

    let outcome = if stalled {
        // Taken before aborting: dropping the blocked acquires withdraws them.
        let snapshot = arbiter.snapshot();
        let unfinished = pending.len();
        warn!(unfinished, ?snapshot, "no progress, abandoning run");
        for abort in &aborts {
            abort.abort();
        }
        Outcome::Stalled { unfinished, snapshot }
    } else {
        Outcome::Completed
    };

    let samples = monitor.finish().await.context("sampler failed")?;
    records.sort_by_key(|r| r.id);
    let report = RunReport::new(
        outcome,
        config,
        elapsed,
        &records,
        arbiter.stats(),
        samples,
    );
    info!(
        completed = report.completed(),
        elapsed_ms = report.elapsed_ms,
        "run finished"
    );
    Ok(report)
}
