//! Orchestration Layer
//!
//! This crate provides orchestration for the tailings SPH solver:
//! - JSON configuration loading and validation
//! - Terrain loading (image, inline grid, flat)
//! - Particle seeding and simulation bounds
//! - Simulation runner with lifecycle management
//! - Flow-extent and diagnostics exporters

#![warn(missing_docs)]

pub mod config;
pub mod export;
pub mod runner;
pub mod seeding;
pub mod terrain;

pub use config::{ConfigError, SimulationConfig};
pub use runner::{RunOutcome, RunSettings, RunnerError, RunnerState, SimulationRunner};
pub use seeding::{RegionStats, SeededDomain};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tailings_kernel::{SimulationKernel, TailingsSolver, TerrainSampler};

/// A seeded simulation with its runner, ready to start.
pub struct Simulation {
    /// Configuration it was built from
    pub config: SimulationConfig,
    /// Lifecycle handle; the solver lives on its thread
    pub runner: SimulationRunner,
    /// Seeding statistics per region
    pub regions: Vec<RegionStats>,
    /// Number of fluid particles
    pub particle_count: usize,
    /// Terrain elevation range, used to normalize the flow export
    pub elevation_range: (f32, f32),
    /// Diagnostics CSV being written, if any
    pub diagnostics_csv: Option<PathBuf>,
}

/// Create a complete simulation from a configuration file
///
/// This function performs the full simulation setup pipeline:
/// 1. Load and validate the configuration
/// 2. Load the terrain height field
/// 3. Compute simulation bounds and seed fluid and wall particles
/// 4. Create the solver
/// 5. Wrap it in a SimulationRunner for lifecycle management
///
/// # Example
/// ```no_run
/// use tailings_orchestrator::create_simulation;
///
/// let sim = create_simulation("config/dam_release.json")?;
/// sim.runner.start();
/// let outcome = sim.runner.join()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_simulation(config_path: impl AsRef<Path>) -> Result<Simulation, ConfigError> {
    let config_path = config_path.as_ref();
    tracing::info!("Creating simulation from config: {}", config_path.display());

    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);

    // Terrain images are resolved relative to the config file directory
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    build_simulation(config, config_dir)
}

/// Build a simulation from an in-memory configuration.
///
/// `base_dir` resolves relative terrain image paths.
pub fn build_simulation(config: SimulationConfig, base_dir: &Path) -> Result<Simulation, ConfigError> {
    config.validate()?;

    let field = terrain::load_height_field(&config.terrain, base_dir)?;
    let spacing = config.seeding.particle_spacing;
    let bounds = terrain::compute_bounds(&config.terrain, &field, &config.seeding.regions, spacing)?;
    tracing::info!("Simulation bounds: min {:?}, size {:?}", bounds.min, bounds.size);

    let seeded = seeding::seed_particles(
        &config.seeding.regions,
        bounds,
        &field,
        spacing,
        config.solver.rest_density,
        config.seeding.total_tailing_volume,
    )?;
    let particle_count = seeded.domain.fluid.len();
    let elevation_range = (field.min_elevation(), field.max_elevation());
    let resolution = field.resolution();

    let solver = TailingsSolver::new(config.solver, seeded.domain, Arc::new(field))?;
    let kernel: Box<dyn SimulationKernel + Send> = Box::new(solver);

    let diagnostics_csv = if config.output.export_diagnostics {
        let dir = &config.output.output_dir;
        fs::create_dir_all(dir).map_err(|source| ConfigError::Io { path: dir.clone(), source })?;
        Some(dir.join(format!("Diagnostics_{}.csv", export::timestamp())))
    } else {
        None
    };

    let settings = RunSettings {
        max_frames: config.max_frames,
        diagnostics_interval: config.output.diagnostics_interval,
        flow_resolution: config
            .output
            .export_flow
            .then(|| resolution * config.output.flow_resolution_scale as usize),
        render: config.render,
        diagnostics_csv: diagnostics_csv.clone(),
    };

    tracing::info!("Creating simulation runner...");
    let runner = SimulationRunner::new(kernel, settings);

    tracing::info!("Simulation ready to start");
    Ok(Simulation {
        config,
        runner,
        regions: seeded.regions,
        particle_count,
        elevation_range,
        diagnostics_csv,
    })
}
