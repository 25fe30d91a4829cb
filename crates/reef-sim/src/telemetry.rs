//! Tracing subscriber setup for the simulator binary.

use anyhow::Result;
use clap::ValueEnum;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Used when `RUST_LOG` is unset. Per-move lines are logged at debug.
const DEFAULT_FILTER: &str = "info,reef_world=debug,reef_sim=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Install the global subscriber. Logs go to stderr so stdout stays free
/// for the JSON report.
pub fn init_telemetry(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    info!(?format, "Telemetry initialized");
    Ok(())
}
