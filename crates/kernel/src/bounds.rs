//! Axis-aligned simulation bounds.

use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Axis-aligned box containing every particle the bucket grid indexes.
///
/// The planar (x/z) extent matches the terrain footprint, so normalized
/// terrain coordinates are `(x - min.x) / size.x` and `(z - min.z) / size.z`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationBounds {
    /// Minimum corner.
    pub min: [f32; 3],
    /// Edge lengths.
    pub size: [f32; 3],
}

impl SimulationBounds {
    /// Bounds from a center point and edge lengths.
    pub fn from_center_size(center: [f32; 3], size: [f32; 3]) -> Result<Self, SolverError> {
        let min = [
            center[0] - 0.5 * size[0],
            center[1] - 0.5 * size[1],
            center[2] - 0.5 * size[2],
        ];
        Self::from_min_size(min, size)
    }

    /// Bounds from the minimum corner and edge lengths.
    pub fn from_min_size(min: [f32; 3], size: [f32; 3]) -> Result<Self, SolverError> {
        if size.iter().chain(min.iter()).any(|v| !v.is_finite()) {
            return Err(SolverError::NonFinite { name: "simulation bounds" });
        }
        if size.iter().any(|&s| s <= 0.0) {
            return Err(SolverError::InvalidBounds(size));
        }
        Ok(Self { min, size })
    }

    /// Maximum corner.
    pub fn max(&self) -> [f32; 3] {
        [
            self.min[0] + self.size[0],
            self.min[1] + self.size[1],
            self.min[2] + self.size[2],
        ]
    }

    /// Normalized terrain coordinates of a planar position.
    #[inline]
    pub fn uv(&self, x: f32, z: f32) -> (f32, f32) {
        (
            (x - self.min[0]) / self.size[0],
            (z - self.min[2]) / self.size[2],
        )
    }

    /// Whether `p` lies inside the box (inclusive).
    pub fn contains(&self, p: [f32; 3]) -> bool {
        let max = self.max();
        (0..3).all(|a| p[a] >= self.min[a] && p[a] <= max[a])
    }

    /// Voxel count per axis for a grid whose cells are at most `cell` wide:
    /// `ceil(size / cell)`, never below 1.
    pub fn bucket_resolution(&self, cell: f32) -> [u32; 3] {
        [
            (self.size[0] / cell).ceil().max(1.0) as u32,
            (self.size[1] / cell).ceil().max(1.0) as u32,
            (self.size[2] / cell).ceil().max(1.0) as u32,
        ]
    }
}
