//! The tailings SPH solver: frame pipeline over double-buffered particle
//! state.
//!
//! One frame is
//!
//! 1. bucket rebuild over the current fluid positions and the walls,
//! 2. density pass (one value per fluid particle, kept for the whole frame),
//! 3. `substeps` integration sub-steps, each reading the current buffer,
//!    writing the other and swapping.
//!
//! Each phase is a single parallel dispatch and returns only when every
//! particle is done, so a phase never observes partial results of the
//! previous one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::boundary::{clamp_planar, ContactModel};
use crate::bounds::SimulationBounds;
use crate::bucket::{BucketGrid, BucketStats};
use crate::damping::DampingTracker;
use crate::dispatch::dispatch;
use crate::error::{ensure_positive, SolverError};
use crate::flow::FlowAccumulator;
use crate::particle::{FluidParticle, PingPong};
use crate::render::{RenderSettings, RenderSink};
use crate::rheology::{Rheology, RheologyParameters};
use crate::sph::{FluidModel, ParticleView, SmoothingKernels};
use crate::terrain::TerrainSampler;
use crate::SimulationKernel;

/// Effective interaction radius as a multiple of the particle spacing.
pub const EFFECTIVE_RADIUS_FACTOR: f32 = 1.2;

/// Default slot capacity of a bucket voxel.
pub const DEFAULT_MAX_PARTICLES_PER_VOXEL: usize = 16;

/// Upper bound on `voxels * max_particles_per_voxel` (1 GiB of slots).
pub const MAX_BUCKET_SLOTS: u64 = 1 << 28;

/// Rebuilds between two bucket-overflow warnings.
pub const OVERFLOW_WARN_INTERVAL: u64 = 300;

/// Physical and numerical parameters of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Dynamic viscosity (consistency for non-Newtonian models).
    pub viscosity: f32,
    /// Rest density rho0.
    pub rest_density: f32,
    /// Equation-of-state stiffness.
    pub gas_constant: f32,
    /// Clamp negative pressure to zero.
    pub clamp_negative_pressure: bool,
    /// Rheology model and its parameters.
    pub rheology: RheologyParameters,
    /// Terrain contact restitution, in `(0, 1]`.
    pub coefficient_of_restitution: f32,
    /// Coulomb friction against the terrain.
    pub friction: f32,
    /// Integration sub-step (seconds).
    pub sub_step: f32,
    /// Sub-steps per frame.
    pub substeps: u32,
    /// Gravitational acceleration.
    pub gravity: [f32; 3],
    /// Bucket voxel capacity.
    pub max_particles_per_voxel: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            viscosity: 750.0,
            rest_density: 1400.0,
            gas_constant: 250.0,
            clamp_negative_pressure: false,
            rheology: RheologyParameters::default(),
            coefficient_of_restitution: 0.07,
            friction: 0.001,
            sub_step: (1.0 / 60.0) / 100.0,
            substeps: 10,
            gravity: [0.0, -9.81, 0.0],
            max_particles_per_voxel: DEFAULT_MAX_PARTICLES_PER_VOXEL,
        }
    }
}

impl SolverParams {
    /// Reject parameters that would produce NaN or never advance.
    pub fn validate(&self) -> Result<(), SolverError> {
        ensure_positive("rest density", self.rest_density)?;
        ensure_positive("sub-step", self.sub_step)?;
        if self.substeps == 0 {
            return Err(SolverError::NonPositive { name: "substeps", value: 0.0 });
        }
        if self.max_particles_per_voxel == 0 {
            return Err(SolverError::NonPositive { name: "max particles per voxel", value: 0.0 });
        }
        for (name, value) in [("gas constant", self.gas_constant), ("friction", self.friction)] {
            if !value.is_finite() {
                return Err(SolverError::NonFinite { name });
            }
            if value < 0.0 {
                return Err(SolverError::NonPositive { name, value });
            }
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(SolverError::NonFinite { name: "gravity" });
        }
        Rheology::from_parameters(self.viscosity, &self.rheology)?;
        crate::damping::damping_coefficient(self.coefficient_of_restitution)?;
        Ok(())
    }

    /// Simulated time covered by one frame.
    pub fn frame_time(&self) -> f64 {
        f64::from(self.sub_step) * f64::from(self.substeps)
    }
}

/// Seeded particles and the derived discretisation.
#[derive(Debug, Clone)]
pub struct ParticleDomain {
    /// Fluid particle positions.
    pub fluid: Vec<[f32; 3]>,
    /// Wall particle positions.
    pub walls: Vec<[f32; 3]>,
    /// Box every particle is indexed in.
    pub bounds: SimulationBounds,
    /// Mass of each fluid (and wall) particle.
    pub particle_mass: f32,
    /// Kernel support radius.
    pub effective_radius: f32,
}

impl ParticleDomain {
    /// Bucket voxels per axis: `ceil(bounds.size / effective_radius)`.
    pub fn bucket_resolution(&self) -> [u32; 3] {
        self.bounds.bucket_resolution(self.effective_radius)
    }

    /// Total fluid mass.
    pub fn total_mass(&self) -> f64 {
        f64::from(self.particle_mass) * self.fluid.len() as f64
    }
}

/// Slot count of a bucket grid, rejected above [`MAX_BUCKET_SLOTS`].
fn bucket_slots(resolution: [u32; 3], max_per_voxel: usize) -> Result<u64, SolverError> {
    let slots = resolution
        .iter()
        .map(|&r| u64::from(r.max(1)))
        .try_fold(max_per_voxel as u64, u64::checked_mul)
        .unwrap_or(u64::MAX);
    if slots > MAX_BUCKET_SLOTS {
        return Err(SolverError::BucketGridTooLarge { resolution, slots, limit: MAX_BUCKET_SLOTS });
    }
    Ok(slots)
}

/// What one call to [`TailingsSolver::step_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Frames completed, including this one.
    pub frame: u64,
    /// Simulated time after the frame.
    pub sim_time: f64,
    /// Bucket rebuild result for this frame.
    pub bucket: BucketStats,
}

/// Rate limiter for bucket-overflow warnings.
#[derive(Debug, Clone, Copy, Default)]
struct OverflowReporter {
    warned: bool,
    rebuilds_since_warning: u64,
    pending: u64,
    total: u64,
}

impl OverflowReporter {
    /// Account for one rebuild; returns `true` when a warning was emitted.
    fn observe(&mut self, dropped: u32) -> bool {
        self.rebuilds_since_warning += 1;
        if dropped == 0 {
            return false;
        }
        self.pending += u64::from(dropped);
        self.total += u64::from(dropped);
        if self.warned && self.rebuilds_since_warning < OVERFLOW_WARN_INTERVAL {
            return false;
        }
        tracing::warn!(
            dropped = self.pending,
            total_dropped = self.total,
            "bucket voxel capacity exceeded; excess particles ignored as neighbors"
        );
        self.warned = true;
        self.rebuilds_since_warning = 0;
        self.pending = 0;
        true
    }
}

/// CPU SPH solver for tailings flow over a height field.
pub struct TailingsSolver {
    params: SolverParams,
    model: FluidModel,
    damping: DampingTracker,
    contact: ContactModel,
    state: PingPong<FluidParticle>,
    walls: Vec<[f32; 3]>,
    densities: Vec<f32>,
    positions: Vec<[f32; 3]>,
    grid: BucketGrid,
    terrain: Arc<dyn TerrainSampler>,
    bounds: SimulationBounds,
    frame: u64,
    sim_time: f64,
    overflow: OverflowReporter,
}

impl TailingsSolver {
    /// Build a solver over a seeded domain. Fails on any configuration
    /// error; no state is created in that case.
    pub fn new(
        params: SolverParams,
        domain: ParticleDomain,
        terrain: Arc<dyn TerrainSampler>,
    ) -> Result<Self, SolverError> {
        params.validate()?;
        if domain.fluid.is_empty() {
            return Err(SolverError::NoParticlesSeeded);
        }
        ensure_positive("effective radius", domain.effective_radius)?;
        ensure_positive("particle mass", domain.particle_mass)?;

        let rheology = Rheology::from_parameters(params.viscosity, &params.rheology)?;
        let damping = DampingTracker::new(params.coefficient_of_restitution)?;
        let contact = ContactModel::new(
            params.sub_step,
            damping.damping(),
            params.friction,
            domain.effective_radius,
        );
        let model = FluidModel {
            kernels: SmoothingKernels::new(domain.effective_radius),
            particle_mass: domain.particle_mass,
            rest_density: params.rest_density,
            gas_constant: params.gas_constant,
            clamp_negative_pressure: params.clamp_negative_pressure,
            rheology,
        };

        let resolution = domain.bucket_resolution();
        bucket_slots(resolution, params.max_particles_per_voxel)?;
        let grid = BucketGrid::new(&domain.bounds, resolution, params.max_particles_per_voxel);
        let n = domain.fluid.len();
        let particles: Vec<FluidParticle> = domain.fluid.iter().map(|&p| FluidParticle::at_rest(p)).collect();

        tracing::info!(
            fluid = n,
            walls = domain.walls.len(),
            particle_mass = domain.particle_mass,
            effective_radius = domain.effective_radius,
            damping = damping.damping(),
            "solver created, bucket resolution {:?}",
            resolution
        );

        Ok(Self {
            params,
            model,
            damping,
            contact,
            state: PingPong::new(particles),
            walls: domain.walls,
            densities: vec![params.rest_density; n],
            positions: domain.fluid,
            grid,
            terrain,
            bounds: domain.bounds,
            frame: 0,
            sim_time: 0.0,
            overflow: OverflowReporter::default(),
        })
    }

    /// Run parameters.
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Simulation bounds.
    pub fn bounds(&self) -> &SimulationBounds {
        &self.bounds
    }

    /// Mass of each particle.
    pub fn particle_mass(&self) -> f32 {
        self.model.particle_mass
    }

    /// Kernel support radius.
    pub fn effective_radius(&self) -> f32 {
        self.model.kernels.radius()
    }

    /// Current contact damping coefficient.
    pub fn damping(&self) -> f32 {
        self.damping.damping()
    }

    /// Bucket grid as of the last rebuild.
    pub fn bucket_grid(&self) -> &BucketGrid {
        &self.grid
    }

    /// Completed ping-pong swaps (one per sub-step).
    pub fn generation(&self) -> u64 {
        self.state.generation()
    }

    /// Bucket entries dropped over the whole run.
    pub fn total_dropped(&self) -> u64 {
        self.overflow.total
    }

    /// Total fluid mass (constant for the run).
    pub fn total_mass(&self) -> f64 {
        f64::from(self.model.particle_mass) * self.state.len() as f64
    }

    fn rebuild_buckets(&mut self) -> BucketStats {
        for (dst, p) in self.positions.iter_mut().zip(self.state.current()) {
            *dst = p.position;
        }
        let stats = self.grid.rebuild(&self.positions, &self.walls);
        self.overflow.observe(stats.dropped);
        stats
    }

    fn compute_densities(&mut self) {
        let fluid = self.state.current();
        let model = &self.model;
        let walls = &self.walls;
        let grid = &self.grid;
        dispatch(&mut self.densities, |i, rho| {
            *rho = model.density(i, fluid, walls, grid);
        });
    }

    fn substep(&mut self) {
        let dt = self.params.sub_step;
        let gravity = self.params.gravity;
        let model = &self.model;
        let contact = &self.contact;
        let terrain: &dyn TerrainSampler = &*self.terrain;
        let bounds = &self.bounds;

        let (read, write) = self.state.split();
        let view = ParticleView {
            fluid: read,
            densities: &self.densities,
            walls: &self.walls,
            grid: &self.grid,
        };

        dispatch(write, |i, out| {
            let p = &read[i];
            let a = model.acceleration(i, &view);
            // Semi-implicit Euler: velocity first, then position from it
            let v = [
                p.velocity[0] + (a[0] + gravity[0]) * dt,
                p.velocity[1] + (a[1] + gravity[1]) * dt,
                p.velocity[2] + (a[2] + gravity[2]) * dt,
            ];
            let (mut position, mut velocity) = contact.resolve(terrain, bounds, p.position, v, dt);
            clamp_planar(bounds, &mut position, &mut velocity);

            let d = [
                position[0] - p.position[0],
                position[1] - p.position[1],
                position[2] - p.position[2],
            ];
            *out = FluidParticle {
                position,
                travelled: p.travelled + (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt(),
                velocity,
                _pad: 0.0,
            };
        });

        self.state.swap();
        self.sim_time += f64::from(dt);
    }

    /// Advance one frame: rebuild, density, then all sub-steps.
    pub fn step_frame(&mut self) -> FrameReport {
        let bucket = self.rebuild_buckets();
        self.compute_densities();
        for _ in 0..self.params.substeps {
            self.substep();
        }
        self.frame += 1;

        if self.frame % 100 == 0 {
            tracing::debug!(frame = self.frame, sim_time = self.sim_time, "frame complete");
        }
        FrameReport {
            frame: self.frame,
            sim_time: self.sim_time,
            bucket,
        }
    }

    /// Change the contact restitution. The damping coefficient is only
    /// recomputed when the value differs from the current one.
    pub fn set_restitution(&mut self, restitution: f32) -> Result<bool, SolverError> {
        let changed = self.damping.set_restitution(restitution)?;
        if changed {
            self.params.coefficient_of_restitution = restitution;
            self.contact = self.contact.with_damping(self.damping.damping());
            tracing::info!(restitution, damping = self.damping.damping(), "contact damping updated");
        }
        Ok(changed)
    }

    /// Record every particle's current height into `flow`.
    pub fn accumulate_flow(&self, flow: &FlowAccumulator) {
        flow.accumulate(&self.bounds, self.state.current());
    }

    /// Write fluid records (`[0, N)`), and wall records (`[N, N + W)`)
    /// when `include_walls` is set, into `sink`.
    pub fn write_render(&self, settings: &RenderSettings, sink: &mut dyn RenderSink, include_walls: bool) {
        let fluid = self.state.current();
        if include_walls {
            sink.write(fluid.len(), &settings.wall_records(&self.walls));
        }
        sink.write(0, &settings.fluid_records(fluid, &self.densities));
    }
}

impl SimulationKernel for TailingsSolver {
    fn step_frame(&mut self) -> FrameReport {
        TailingsSolver::step_frame(self)
    }

    fn particles(&self) -> &[FluidParticle] {
        self.state.current()
    }

    fn densities(&self) -> &[f32] {
        &self.densities
    }

    fn walls(&self) -> &[[f32; 3]] {
        &self.walls
    }

    fn frame(&self) -> u64 {
        self.frame
    }

    fn sim_time(&self) -> f64 {
        self.sim_time
    }

    fn set_restitution(&mut self, restitution: f32) -> Result<bool, SolverError> {
        TailingsSolver::set_restitution(self, restitution)
    }

    fn accumulate_flow(&self, flow: &FlowAccumulator) {
        TailingsSolver::accumulate_flow(self, flow)
    }

    fn write_render(&self, settings: &RenderSettings, sink: &mut dyn RenderSink, include_walls: bool) {
        TailingsSolver::write_render(self, settings, sink, include_walls)
    }
}
