//! Terrain height lookup.
//!
//! The solver only ever asks the terrain one question: how high is the
//! ground at this planar location? [`TerrainSampler`] is that contract;
//! [`HeightField`] is the square-grid implementation used by the
//! orchestrator's loaders and by tests.

use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Elevation lookup over a square height field.
///
/// Normalized coordinates `u` (along texel x) and `v` (along texel y) are
/// clamped to `[0, 1]`. Returned elevations are already remapped into
/// `[min_elevation, max_elevation]`.
pub trait TerrainSampler: Send + Sync {
    /// Elevation at normalized planar coordinates.
    fn elevation(&self, u: f32, v: f32) -> f32;

    /// Elevation of texel `(x, y)`; indices are clamped to the grid.
    fn elevation_at(&self, x: usize, y: usize) -> f32;

    /// Texels per side.
    fn resolution(&self) -> usize;

    /// Elevation of a raw sample of 0.
    fn min_elevation(&self) -> f32;

    /// Elevation of a raw sample of 1.
    fn max_elevation(&self) -> f32;
}

/// How [`HeightField::elevation`] reconstructs values between texels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMode {
    /// Blend the four nearest texel centers (clamp-to-edge).
    #[default]
    Bilinear,
    /// Take the containing texel.
    Nearest,
}

/// Square grid of raw heights in `[0, 1]`, row-major (`y` rows of `x` texels).
#[derive(Debug, Clone)]
pub struct HeightField {
    resolution: usize,
    raw: Vec<f32>,
    min_elevation: f32,
    max_elevation: f32,
    sampling: SamplingMode,
}

impl HeightField {
    /// Build a height field from `width * height` raw samples.
    ///
    /// Fails with [`SolverError::NonSquareTerrain`] when `width != height`;
    /// this is the single load-time check, sampling never re-validates.
    pub fn from_grid(
        width: usize,
        height: usize,
        raw: Vec<f32>,
        min_elevation: f32,
        max_elevation: f32,
    ) -> Result<Self, SolverError> {
        if width != height {
            return Err(SolverError::NonSquareTerrain { width, height });
        }
        if width == 0 {
            return Err(SolverError::EmptyTerrain);
        }
        if raw.len() != width * height {
            return Err(SolverError::TerrainSizeMismatch {
                expected: width * height,
                actual: raw.len(),
            });
        }
        if !min_elevation.is_finite() {
            return Err(SolverError::NonFinite { name: "min elevation" });
        }
        if !max_elevation.is_finite() {
            return Err(SolverError::NonFinite { name: "max elevation" });
        }
        Ok(Self {
            resolution: width,
            raw,
            min_elevation,
            max_elevation,
            sampling: SamplingMode::Bilinear,
        })
    }

    /// A terrain of constant `elevation`.
    pub fn flat(resolution: usize, elevation: f32) -> Result<Self, SolverError> {
        Self::from_grid(
            resolution,
            resolution,
            vec![0.0; resolution * resolution],
            elevation,
            elevation,
        )
    }

    /// Switch the reconstruction mode used by [`TerrainSampler::elevation`].
    pub fn with_sampling(mut self, sampling: SamplingMode) -> Self {
        self.sampling = sampling;
        self
    }

    #[inline]
    fn remap(&self, raw: f32) -> f32 {
        self.min_elevation + raw * (self.max_elevation - self.min_elevation)
    }

    #[inline]
    fn raw_at(&self, x: usize, y: usize) -> f32 {
        let last = self.resolution - 1;
        self.raw[y.min(last) * self.resolution + x.min(last)]
    }

    fn bilinear(&self, u: f32, v: f32) -> f32 {
        let res = self.resolution as f32;
        // Texel centers sit at (i + 0.5) / res.
        let fx = (u * res - 0.5).max(0.0);
        let fy = (v * res - 0.5).max(0.0);
        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let a = self.raw_at(x0, y0);
        let b = self.raw_at(x0 + 1, y0);
        let c = self.raw_at(x0, y0 + 1);
        let d = self.raw_at(x0 + 1, y0 + 1);
        let top = a + (b - a) * tx;
        let bottom = c + (d - c) * tx;
        top + (bottom - top) * ty
    }

    fn nearest(&self, u: f32, v: f32) -> f32 {
        let res = self.resolution as f32;
        let x = (u * res).floor().max(0.0) as usize;
        let y = (v * res).floor().max(0.0) as usize;
        self.raw_at(x, y)
    }
}

impl TerrainSampler for HeightField {
    fn elevation(&self, u: f32, v: f32) -> f32 {
        let u = if u.is_nan() { 0.0 } else { u.clamp(0.0, 1.0) };
        let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let raw = match self.sampling {
            SamplingMode::Bilinear => self.bilinear(u, v),
            SamplingMode::Nearest => self.nearest(u, v),
        };
        self.remap(raw)
    }

    fn elevation_at(&self, x: usize, y: usize) -> f32 {
        self.remap(self.raw_at(x, y))
    }

    fn resolution(&self) -> usize {
        self.resolution
    }

    fn min_elevation(&self) -> f32 {
        self.min_elevation
    }

    fn max_elevation(&self) -> f32 {
        self.max_elevation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> HeightField {
        // x increases along each row: 0, 1/3, 2/3, 1
        let row = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        let raw: Vec<f32> = (0..4).flat_map(|_| row).collect();
        HeightField::from_grid(4, 4, raw, 100.0, 400.0).unwrap()
    }

    #[test]
    fn non_square_grid_is_rejected() {
        let err = HeightField::from_grid(4, 3, vec![0.0; 12], 0.0, 1.0).unwrap_err();
        assert_eq!(err, SolverError::NonSquareTerrain { width: 4, height: 3 });
    }

    #[test]
    fn wrong_sample_count_is_rejected() {
        let err = HeightField::from_grid(2, 2, vec![0.0; 3], 0.0, 1.0).unwrap_err();
        assert!(matches!(err, SolverError::TerrainSizeMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn texel_lookup_remaps_linearly() {
        let hf = ramp();
        assert!((hf.elevation_at(0, 0) - 100.0).abs() < 1e-4);
        assert!((hf.elevation_at(3, 2) - 400.0).abs() < 1e-4);
        assert!((hf.elevation_at(1, 0) - 200.0).abs() < 1e-3);
        // Out-of-range indices clamp to the edge
        assert!((hf.elevation_at(10, 10) - 400.0).abs() < 1e-4);
    }

    #[test]
    fn bilinear_hits_texel_centers_exactly() {
        let hf = ramp();
        // Center of texel x=1 is u = 1.5 / 4
        let e = hf.elevation(1.5 / 4.0, 0.5);
        assert!((e - 200.0).abs() < 1e-3, "e={e}");
    }

    #[test]
    fn bilinear_interpolates_between_centers() {
        let hf = ramp();
        // Halfway between texel centers 1 and 2
        let e = hf.elevation(2.0 / 4.0, 0.5);
        assert!((e - 250.0).abs() < 1e-3, "e={e}");
    }

    #[test]
    fn bilinear_clamps_at_edges() {
        let hf = ramp();
        assert!((hf.elevation(0.0, 0.0) - 100.0).abs() < 1e-4);
        assert!((hf.elevation(1.0, 1.0) - 400.0).abs() < 1e-4);
        assert!((hf.elevation(-3.0, 7.0) - 100.0).abs() < 1e-4);
    }

    #[test]
    fn nearest_picks_containing_texel() {
        let hf = ramp().with_sampling(SamplingMode::Nearest);
        let e = hf.elevation(0.49, 0.1);
        assert!((e - 200.0).abs() < 1e-3, "e={e}");
        let e = hf.elevation(1.0, 0.1);
        assert!((e - 400.0).abs() < 1e-3, "e={e}");
    }

    #[test]
    fn flat_terrain_is_constant() {
        let hf = HeightField::flat(3, -50.0).unwrap();
        for &(u, v) in &[(0.0, 0.0), (0.3, 0.9), (1.0, 0.5)] {
            assert_eq!(hf.elevation(u, v), -50.0);
        }
        assert_eq!(hf.min_elevation(), -50.0);
        assert_eq!(hf.max_elevation(), -50.0);
    }
}
