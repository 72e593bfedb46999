//! Terrain loading
//!
//! Turns a [`TerrainConfig`] into a [`HeightField`]. Image sources are
//! decoded with the `image` crate; only the red channel is used, normalized
//! to `[0, 1]`.

use std::path::Path;

use tailings_kernel::{HeightField, SimulationBounds, TerrainSampler};

use crate::config::{ConfigError, SeedRegion, TerrainConfig, TerrainSource};

/// Load the height field described by `config`.
///
/// Relative image paths are resolved against `base_dir` (normally the
/// directory holding the config file).
pub fn load_height_field(config: &TerrainConfig, base_dir: &Path) -> Result<HeightField, ConfigError> {
    let field = match &config.source {
        TerrainSource::Image { path } => {
            let path = if path.is_absolute() { path.clone() } else { base_dir.join(path) };
            tracing::info!("Loading terrain image: {}", path.display());
            let (width, height, raw) = decode_heights(&path)?;
            HeightField::from_grid(width, height, raw, config.min_elevation, config.max_elevation)?
        }
        TerrainSource::Grid { width, height, heights } => HeightField::from_grid(
            *width,
            *height,
            heights.clone(),
            config.min_elevation,
            config.max_elevation,
        )?,
        TerrainSource::Flat { resolution } => HeightField::flat(*resolution, config.min_elevation)?,
    };
    tracing::info!(
        "Terrain ready: {}x{} texels, elevation {:.1}..{:.1}",
        field.resolution(),
        field.resolution(),
        field.min_elevation(),
        field.max_elevation()
    );
    Ok(field.with_sampling(config.sampling))
}

/// Red channel of an image as normalized heights, row-major.
fn decode_heights(path: &Path) -> Result<(usize, usize, Vec<f32>), ConfigError> {
    let img = image::open(path)?.to_rgb32f();
    let (width, height) = img.dimensions();
    let raw = img.pixels().map(|p| p.0[0].clamp(0.0, 1.0)).collect();
    Ok((width as usize, height as usize, raw))
}

/// Simulation bounds covering the terrain footprint and every seeding region.
///
/// Planar extent is the terrain footprint. Vertically the bounds run from
/// one spacing below the lowest ground to one spacing above the higher of
/// the highest ground and the highest region corner.
pub fn compute_bounds(
    terrain: &TerrainConfig,
    field: &dyn TerrainSampler,
    regions: &[SeedRegion],
    spacing: f32,
) -> Result<SimulationBounds, ConfigError> {
    let footprint = field.resolution() as f32 * terrain.cell_size;
    let region_top = regions
        .iter()
        .map(crate::seeding::region_top)
        .fold(f32::NEG_INFINITY, f32::max);
    let bottom = field.min_elevation() - spacing;
    let top = field.max_elevation().max(region_top) + spacing;
    let bounds = SimulationBounds::from_min_size(
        [terrain.origin[0], bottom, terrain.origin[1]],
        [footprint, top - bottom, footprint],
    )?;
    Ok(bounds)
}
