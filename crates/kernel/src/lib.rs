//! Tailings SPH Kernel
//!
//! Core solver for simulating mine-tailings flow over a terrain height
//! field with Smoothed Particle Hydrodynamics. Compute-focused and free of
//! any I/O; loading, seeding and export live in the orchestrator crate.
//!
//! # Modules
//! - [`terrain`] -- Height lookup contract and the square-grid height field.
//! - [`bounds`] -- Axis-aligned simulation bounds.
//! - [`particle`] -- Fluid particle record and ping-pong buffers.
//! - [`bucket`] -- Uniform voxel grid with bounded per-voxel slots.
//! - [`sph`] -- Poly6 / spiky / viscosity kernels, density and force operators.
//! - [`eos`] -- Linear equation of state.
//! - [`rheology`] -- Newtonian, Power-Law, Bingham and Herschel-Bulkley models.
//! - [`damping`] -- Restitution to contact damping.
//! - [`boundary`] -- Terrain contact response and planar containment.
//! - [`flow`] -- Maximum-height flow accumulator.
//! - [`render`] -- Instanced render records and sink.
//! - [`diagnostics`] -- Mean speed / travel distance sampling.
//! - [`solver`] -- The frame pipeline tying it together.

#![warn(missing_docs)]

pub mod boundary;
pub mod bounds;
pub mod bucket;
pub mod damping;
pub mod diagnostics;
pub mod dispatch;
pub mod eos;
pub mod error;
pub mod flow;
pub mod particle;
pub mod render;
pub mod rheology;
pub mod solver;
pub mod sph;
pub mod terrain;

pub use bounds::SimulationBounds;
pub use bucket::{BucketGrid, BucketStats};
pub use damping::{damping_coefficient, DampingTracker};
pub use diagnostics::DiagnosticSample;
pub use error::SolverError;
pub use flow::FlowAccumulator;
pub use particle::{FluidParticle, PingPong};
pub use render::{MeshProperties, RenderPropertyBuffer, RenderSettings, RenderSink};
pub use rheology::{Rheology, RheologyKind, RheologyParameters};
pub use solver::{
    FrameReport, ParticleDomain, SolverParams, TailingsSolver, EFFECTIVE_RADIUS_FACTOR,
    MAX_BUCKET_SLOTS,
};
pub use terrain::{HeightField, SamplingMode, TerrainSampler};

// ---------------------------------------------------------------------------
// SimulationKernel trait
// ---------------------------------------------------------------------------

/// Interface the runner drives a solver through.
///
/// A `SimulationKernel` owns its particle state and advances it one frame
/// at a time:
///
/// 1. Bucket rebuild
/// 2. Density summation
/// 3. Sub-steps of force evaluation and semi-implicit Euler integration
pub trait SimulationKernel {
    /// Advance one frame.
    fn step_frame(&mut self) -> FrameReport;

    /// Current fluid particle state.
    fn particles(&self) -> &[FluidParticle];

    /// Densities from the last density pass.
    fn densities(&self) -> &[f32];

    /// Static wall particle positions.
    fn walls(&self) -> &[[f32; 3]];

    /// Frames completed.
    fn frame(&self) -> u64;

    /// Simulated time (seconds).
    fn sim_time(&self) -> f64;

    /// Change the contact restitution; `Ok(true)` when damping changed.
    fn set_restitution(&mut self, restitution: f32) -> Result<bool, SolverError>;

    /// Record the current particle heights into a flow field.
    fn accumulate_flow(&self, flow: &FlowAccumulator);

    /// Write render records for the fluid (and optionally the walls).
    fn write_render(&self, settings: &RenderSettings, sink: &mut dyn RenderSink, include_walls: bool);

    /// Number of fluid particles.
    fn particle_count(&self) -> usize {
        self.particles().len()
    }

    /// Diagnostics sample for the current state.
    fn diagnostics(&self) -> DiagnosticSample {
        DiagnosticSample::measure(self.sim_time(), self.particles())
    }
}
