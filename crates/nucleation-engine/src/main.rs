//! Nucleation engine binary.
//!
//! Runs the distributed nucleation protocol with `run.workers` in-process
//! workers connected by a channel world, over a strip-partitioned grid and
//! an analytic driving field.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `NUCLEATION_CONFIG` (default
//!    `nucleation-config.yaml`), falling back to defaults if absent
//! 2. Initialize structured logging (tracing)
//! 3. Pick the domain dimension from `domain.extents`
//! 4. Build the workers and run every step
//! 5. Cross-check the replicas and log the summary
//! 6. Write the JSON report if `run.output` is set

mod error;
mod output;
mod runner;

use std::path::PathBuf;

use nucleation_core::config::{LogFormat, LoggingConfig, SimulationConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::output::RunReport;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "nucleation-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration fails to load or the run aborts.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, loaded_from) = load_config()?;

    init_tracing(&config.logging);
    info!("nucleation-engine starting");
    match &loaded_from {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        workers = config.run.workers,
        seed = ?config.run.seed,
        steps = config.time.steps,
        timestep = config.time.timestep,
        dimension = config.domain.extents.len(),
        "Run parameters"
    );

    if let Err(err) = run(&config).await {
        error!(error = %err, "nucleation-engine aborted");
        return Err(err.into());
    }

    info!("nucleation-engine shutdown complete");
    Ok(())
}

/// Dispatch on the configured dimension.
async fn run(config: &SimulationConfig) -> Result<(), EngineError> {
    match config.domain.extents.len() {
        2 => run_dimension::<2>(config).await,
        3 => run_dimension::<3>(config).await,
        dimension => Err(EngineError::UnsupportedDimension { dimension }),
    }
}

async fn run_dimension<const D: usize>(config: &SimulationConfig) -> Result<(), EngineError> {
    let result = runner::run_simulation::<D>(config).await?;
    runner::log_simulation_end(&result);

    if let Some(path) = &config.run.output {
        let report = RunReport::new(config, &result);
        output::write_report(path, &report)?;
        info!(path = %path.display(), run_id = %report.run_id, "Run report written");
    }
    Ok(())
}

/// Load the configuration, returning the path it came from, or `None` if
/// the file does not exist and defaults were used.
fn load_config() -> Result<(SimulationConfig, Option<PathBuf>), EngineError> {
    let path = std::env::var("NUCLEATION_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = SimulationConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        Ok((SimulationConfig::parse("")?, None))
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
