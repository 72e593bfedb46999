//! Headless tailings simulation
//!
//! Usage: `tailings-sim <config.json>`
//!
//! Loads and seeds the configured release, runs it to `max_frames`, and
//! writes the flow-extent PNG and diagnostics CSV into the output directory.

use std::path::Path;
use std::process::ExitCode;

use tailings_orchestrator::{build_simulation, export, SimulationConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("usage: tailings-sim <config.json>");
        return ExitCode::from(2);
    };

    match run(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = Path::new(config_path);
    let config = SimulationConfig::load(config_path)?;
    if config.max_frames.is_none() {
        return Err("max_frames is required for headless runs".into());
    }
    tracing::info!("Configuration loaded: {}", config.name);

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let sim = build_simulation(config, config_dir)?;

    tracing::info!("Running {} particles", sim.particle_count);
    sim.runner.start();
    let outcome = sim.runner.join()?;
    tracing::info!(
        "Finished: {} frames, {:.3}s simulated, {} diagnostics samples",
        outcome.frames,
        outcome.sim_time,
        outcome.samples.len()
    );
    tracing::debug!(
        "Render buffer: {} records, {} bytes",
        outcome.render.records().len(),
        outcome.render.as_bytes().len()
    );
    if outcome.dropped_entries > 0 {
        tracing::warn!("{} bucket entries dropped over the run", outcome.dropped_entries);
    }

    if let Some(path) = &sim.diagnostics_csv {
        tracing::info!("Diagnostics written to {}", path.display());
    }
    if let Some(flow) = &outcome.flow {
        let (min_e, max_e) = sim.elevation_range;
        export::write_flow_png(&sim.config.output.output_dir, export::timestamp(), flow, min_e, max_e)?;
    }
    Ok(())
}
