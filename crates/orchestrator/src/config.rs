//! Configuration parsing and validation for tailings simulations

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tailings_kernel::{RenderSettings, SamplingMode, SolverError, SolverParams};
use thiserror::Error;

/// Errors raised while loading, validating, or setting up a simulation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid JSON for [`SimulationConfig`].
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// The terrain image could not be decoded.
    #[error("failed to decode terrain image: {0}")]
    Image(#[from] image::ImageError),
    /// A field has an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Terrain, seeding, or solver setup rejected the configuration.
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Main simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name
    #[serde(default = "default_name")]
    pub name: String,
    /// Height field source and placement
    pub terrain: TerrainConfig,
    /// Tailings volume and where it starts
    pub seeding: SeedingConfig,
    /// Fluid, rheology, contact, and integration parameters
    #[serde(flatten)]
    pub solver: SolverParams,
    /// Export and diagnostics settings
    #[serde(default)]
    pub output: OutputConfig,
    /// Render-record settings
    #[serde(default)]
    pub render: RenderSettings,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
}

/// Where terrain heights come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerrainSource {
    /// Grayscale image; the red channel is the raw height.
    Image {
        /// Image path, relative to the config file.
        path: PathBuf,
    },
    /// Inline row-major raw heights in `[0, 1]`.
    Grid {
        /// Texels per row.
        width: usize,
        /// Number of rows.
        height: usize,
        /// `width * height` raw heights.
        heights: Vec<f32>,
    },
    /// Constant elevation (`min_elevation`).
    Flat {
        /// Texels per side.
        resolution: usize,
    },
}

/// Terrain configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    /// Height source
    pub source: TerrainSource,
    /// Elevation of a raw height of 0
    #[serde(default)]
    pub min_elevation: f32,
    /// Elevation of a raw height of 1
    #[serde(default = "default_max_elevation")]
    pub max_elevation: f32,
    /// World size of one texel along x and z
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,
    /// World (x, z) of the terrain's minimum corner
    #[serde(default)]
    pub origin: [f32; 2],
    /// Reconstruction between texels
    #[serde(default)]
    pub sampling: SamplingMode,
}

/// Oriented box the tailings start in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedRegion {
    /// Box center (world)
    pub center: [f32; 3],
    /// Edge lengths before rotation
    pub size: [f32; 3],
    /// Euler angles in degrees, applied Z then X then Y
    #[serde(default)]
    pub rotation_degrees: [f32; 3],
}

/// Seeding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedingConfig {
    /// Initial inter-particle distance
    #[serde(default = "default_spacing")]
    pub particle_spacing: f32,
    /// Released tailings volume; total mass is `rest_density` times this
    pub total_tailing_volume: f32,
    /// Release regions
    pub regions: Vec<SeedRegion>,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Accumulate and export the flow-extent field
    pub export_flow: bool,
    /// Stream diagnostics samples to a CSV file
    pub export_diagnostics: bool,
    /// Flow cells per terrain texel, per side
    pub flow_resolution_scale: u32,
    /// Frames between diagnostics samples
    pub diagnostics_interval: u64,
    /// Directory for exported files
    pub output_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            export_flow: false,
            export_diagnostics: true,
            flow_resolution_scale: 1,
            diagnostics_interval: 30,
            output_dir: PathBuf::from("exports"),
        }
    }
}

// Default values
fn default_name() -> String {
    "tailings".to_string()
}

fn default_max_elevation() -> f32 {
    100.0
}

fn default_cell_size() -> f32 {
    1.0
}

fn default_spacing() -> f32 {
    10.0
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SimulationConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate()?;

        // Terrain
        let t = &self.terrain;
        if !t.cell_size.is_finite() || t.cell_size <= 0.0 {
            return Err(invalid("terrain cell_size must be positive"));
        }
        if !t.min_elevation.is_finite() || !t.max_elevation.is_finite() {
            return Err(invalid("terrain elevations must be finite"));
        }
        if t.max_elevation < t.min_elevation {
            return Err(invalid("terrain max_elevation must not be below min_elevation"));
        }
        match &t.source {
            TerrainSource::Grid { width, height, heights } => {
                if width != height {
                    return Err(SolverError::NonSquareTerrain { width: *width, height: *height }.into());
                }
                if *width == 0 {
                    return Err(SolverError::EmptyTerrain.into());
                }
                if heights.len() != width * height {
                    return Err(SolverError::TerrainSizeMismatch {
                        expected: width * height,
                        actual: heights.len(),
                    }
                    .into());
                }
            }
            TerrainSource::Flat { resolution } => {
                if *resolution == 0 {
                    return Err(SolverError::EmptyTerrain.into());
                }
            }
            TerrainSource::Image { .. } => {}
        }

        // Seeding
        let s = &self.seeding;
        if !s.particle_spacing.is_finite() || s.particle_spacing <= 0.0 {
            return Err(SolverError::NonPositive { name: "particle spacing", value: s.particle_spacing }.into());
        }
        if !s.total_tailing_volume.is_finite() || s.total_tailing_volume <= 0.0 {
            return Err(invalid("total_tailing_volume must be positive"));
        }
        if s.regions.is_empty() {
            return Err(invalid("at least one seeding region is required"));
        }
        for (i, r) in s.regions.iter().enumerate() {
            let values = r.center.iter().chain(&r.size).chain(&r.rotation_degrees);
            if values.into_iter().any(|v| !v.is_finite()) {
                return Err(invalid(&format!("seeding region {i} has non-finite values")));
            }
            if r.size.iter().any(|&v| v <= 0.0) {
                return Err(invalid(&format!("seeding region {i} must have positive size")));
            }
        }

        // Output
        if self.output.flow_resolution_scale == 0 {
            return Err(invalid("flow_resolution_scale must be at least 1"));
        }
        if self.output.diagnostics_interval == 0 {
            return Err(invalid("diagnostics_interval must be at least 1"));
        }
        if !self.render.particle_radius.is_finite() || self.render.particle_radius <= 0.0 {
            return Err(invalid("render particle_radius must be positive"));
        }

        // Check max_frames
        if let Some(max_frames) = self.max_frames {
            if max_frames == 0 {
                return Err(invalid("max_frames must be at least 1"));
            }
        }

        Ok(())
    }

    /// Kernel support radius for the configured spacing
    pub fn effective_radius(&self) -> f32 {
        tailings_kernel::EFFECTIVE_RADIUS_FACTOR * self.seeding.particle_spacing
    }

    /// Total tailings mass
    pub fn total_mass(&self) -> f64 {
        f64::from(self.solver.rest_density) * f64::from(self.seeding.total_tailing_volume)
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "terrain": { "source": { "kind": "flat", "resolution": 4 }, "cell_size": 50.0 },
            "seeding": {
                "total_tailing_volume": 1000000.0,
                "regions": [ { "center": [100.0, 50.0, 100.0], "size": [100.0, 100.0, 100.0] } ]
            }
        }"#
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: SimulationConfig = serde_json::from_str(minimal_json()).unwrap();
        assert_eq!(config.name, "tailings");
        assert_eq!(config.solver.rest_density, 1400.0);
        assert_eq!(config.solver.viscosity, 750.0);
        assert_eq!(config.solver.coefficient_of_restitution, 0.07);
        assert_eq!(config.solver.substeps, 10);
        assert_eq!(config.seeding.particle_spacing, 10.0);
        assert_eq!(config.output.diagnostics_interval, 30);
        assert_eq!(config.terrain.sampling, SamplingMode::Bilinear);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flattened_solver_fields() {
        let json = minimal_json().replacen('{', r#"{ "viscosity": 5.0, "rheology": { "model": "HerschelBulkley", "yield_stress": 20.0 },"#, 1);
        let config: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.solver.viscosity, 5.0);
        assert_eq!(config.solver.rheology.model, tailings_kernel::RheologyKind::HerschelBulkley);
        assert_eq!(config.solver.rheology.solid_approximation_factor, 100.0);
    }

    #[test]
    fn test_effective_radius() {
        let config: SimulationConfig = serde_json::from_str(minimal_json()).unwrap();
        assert!((config.effective_radius() - 12.0).abs() < 1e-5);
        assert!((config.total_mass() - 1.4e9).abs() < 1.0);
    }

    #[test]
    fn test_non_square_grid_rejected() {
        let mut config: SimulationConfig = serde_json::from_str(minimal_json()).unwrap();
        config.terrain.source = TerrainSource::Grid { width: 3, height: 2, heights: vec![0.0; 6] };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Solver(SolverError::NonSquareTerrain { width: 3, height: 2 }))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base: SimulationConfig = serde_json::from_str(minimal_json()).unwrap();

        let mut c = base.clone();
        c.seeding.particle_spacing = 0.0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.seeding.regions.clear();
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.solver.coefficient_of_restitution = 1.5;
        assert!(matches!(c.validate(), Err(ConfigError::Solver(SolverError::InvalidRestitution(_)))));

        let mut c = base.clone();
        c.max_frames = Some(0);
        assert!(c.validate().is_err());

        let mut c = base;
        c.terrain.max_elevation = -10.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = SimulationConfig::load("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
