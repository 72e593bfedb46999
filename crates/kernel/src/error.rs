//! Setup-time error taxonomy for the solver.
//!
//! Every variant here is a configuration error: it is reported once, before
//! the first step, and the simulation does not start. Numerical degeneracy
//! and bucket overflow are handled inside the solver and never surface as
//! errors.

use thiserror::Error;

/// Errors raised while building a terrain, seeding particles, or
/// constructing a solver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// The height field is not square.
    #[error("terrain height field must be square, got {width}x{height}")]
    NonSquareTerrain {
        /// Texels per row.
        width: usize,
        /// Number of rows.
        height: usize,
    },

    /// The height field has no texels.
    #[error("terrain height field is empty")]
    EmptyTerrain,

    /// The height data length does not match `resolution * resolution`.
    #[error("terrain height data has {actual} samples, expected {expected}")]
    TerrainSizeMismatch {
        /// `resolution * resolution`.
        expected: usize,
        /// Samples actually supplied.
        actual: usize,
    },

    /// Seeding produced no fluid particles, so the particle mass is undefined.
    #[error("no particles seeded: every lattice point was rejected or the regions are empty")]
    NoParticlesSeeded,

    /// A quantity that must be strictly positive was zero or negative.
    #[error("{name} must be positive, got {value}")]
    NonPositive {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// A quantity was NaN or infinite.
    #[error("{name} must be finite")]
    NonFinite {
        /// Parameter name.
        name: &'static str,
    },

    /// Coefficient of restitution outside `(0, 1]`.
    #[error("coefficient of restitution must lie in (0, 1], got {0}")]
    InvalidRestitution(f32),

    /// Simulation bounds with a zero or negative extent.
    #[error("simulation bounds must have positive size on every axis, got {0:?}")]
    InvalidBounds([f32; 3]),

    /// The bucket grid would need more slots than can be allocated.
    #[error("bucket grid needs {slots} slots ({resolution:?} voxels), limit is {limit}")]
    BucketGridTooLarge {
        /// Voxels per axis.
        resolution: [u32; 3],
        /// `voxels * max_particles_per_voxel`, saturated at `u64::MAX`.
        slots: u64,
        /// Largest slot count accepted.
        limit: u64,
    },
}

/// Check that `value` is finite and strictly positive.
pub(crate) fn ensure_positive(name: &'static str, value: f32) -> Result<(), SolverError> {
    if !value.is_finite() {
        return Err(SolverError::NonFinite { name });
    }
    if value <= 0.0 {
        return Err(SolverError::NonPositive { name, value });
    }
    Ok(())
}
