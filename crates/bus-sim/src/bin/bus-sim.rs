use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bus_sim::arbiter::WakePolicy;
use bus_sim::{sim, SimConfig};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bus-sim",
    version,
    about = "Run simulated tasks against a bidirectional bus arbiter"
)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of bus slots
    #[arg(long)]
    capacity: Option<usize>,

    /// Normal priority outbound tasks
    #[arg(long)]
    outbound: Option<usize>,

    /// Normal priority inbound tasks
    #[arg(long)]
    inbound: Option<usize>,

    /// High priority outbound tasks
    #[arg(long)]
    outbound_high: Option<usize>,

    /// High priority inbound tasks
    #[arg(long)]
    inbound_high: Option<usize>,

    /// Shortest time a task holds the bus
    #[arg(long)]
    min_work_ms: Option<u64>,

    /// Longest time a task holds the bus
    #[arg(long)]
    max_work_ms: Option<u64>,

    /// Seed of the work time generator
    #[arg(long)]
    seed: Option<u64>,

    /// Who gets woken when the bus drains
    #[arg(long, value_enum)]
    policy: Option<Policy>,

    /// Give up after this long without a task finishing
    #[arg(long)]
    stall_timeout_ms: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    OppositeOnDrain,
    EitherOnDrain,
}

impl From<Policy> for WakePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::OppositeOnDrain => WakePolicy::OppositeOnDrain,
            Policy::EitherOnDrain => WakePolicy::EitherOnDrain,
        }
    }
}

impl Cli {
    fn into_config(self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SimConfig::default(),
        };

        let mix = &mut config.mix;
        overlay(&mut config.capacity, self.capacity);
        overlay(&mut mix.outbound_normal, self.outbound);
        overlay(&mut mix.inbound_normal, self.inbound);
        overlay(&mut mix.outbound_high, self.outbound_high);
        overlay(&mut mix.inbound_high, self.inbound_high);
        overlay(&mut config.min_work_ms, self.min_work_ms);
        overlay(&mut config.max_work_ms, self.max_work_ms);
        overlay(&mut config.seed, self.seed);
        overlay(&mut config.policy, self.policy.map(WakePolicy::from));
        overlay(&mut config.stall_timeout_ms, self.stall_timeout_ms);

        config.validate()?;
        Ok(config)
    }
}

fn overlay<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    let config = cli.into_config()?;
    let report = sim::run(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    if !report.completed() {
        bail!("run stalled with waiters left on the bus");
    }
    if report.has_violations() {
        bail!("bus invariants were violated");
    }
    Ok(())
}
