//! Command-line driver for the reef simulation.

mod telemetry;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use reef_core::{ShapeSelection, SimulationConfig};
use reef_world::Simulation;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

use telemetry::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "reef-sim")]
#[command(version)]
#[command(about = "Multi-cell creatures moving concurrently through a locked 3D grid")]
struct Cli {
    /// Number of creatures
    creatures: usize,

    /// Run time in seconds
    seconds: u64,

    /// Seed for placement and movement (random when unset)
    #[arg(long, env = "REEF_SEED")]
    seed: Option<u64>,

    /// How creature kinds are assigned
    #[arg(long, value_enum)]
    shapes: Option<ShapesArg>,

    /// Grid edge length contributed by each creature
    #[arg(long)]
    cells_per_creature: Option<i32>,

    /// Shortest pause between move attempts
    #[arg(long)]
    min_pause_ms: Option<u64>,

    /// Longest pause between move attempts
    #[arg(long)]
    max_pause_ms: Option<u64>,

    /// JSON simulation config; command-line values take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    report: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ShapesArg {
    RoundRobin,
    Random,
}

impl From<ShapesArg> for ShapeSelection {
    fn from(arg: ShapesArg) -> Self {
        match arg {
            ShapesArg::RoundRobin => ShapeSelection::RoundRobin,
            ShapesArg::Random => ShapeSelection::Random,
        }
    }
}

impl Cli {
    fn simulation_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => SimulationConfig::default(),
        };

        config.creature_count = self.creatures;
        config.duration_secs = self.seconds;
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(shapes) = self.shapes {
            config.shape_selection = shapes.into();
        }
        if let Some(cells) = self.cells_per_creature {
            config.cells_per_creature = cells;
        }
        if let Some(ms) = self.min_pause_ms {
            config.pause.min_ms = ms;
        }
        if let Some(ms) = self.max_pause_ms {
            config.pause.max_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_telemetry(cli.log_format)?;

    // Load configuration
    let config = cli.simulation_config()?;
    info!(
        creatures = config.creature_count,
        seconds = config.duration_secs,
        "Starting simulation"
    );

    let simulation = Simulation::new(config)?;
    let stop = simulation.stop_flag();
    let mut run = tokio::task::spawn_blocking(move || simulation.run());

    // Wait for the run to finish or a shutdown signal to cut it short

    let report = tokio::select! {
        finished = &mut run => finished??,
        _ = shutdown_signal() => {
            info!("Stopping creatures early");
            stop.raise();
            run.await??
        }
    };

    if cli.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    info!(
        committed = report.totals.committed,
        attempts = report.totals.total(),
        "Simulation finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
