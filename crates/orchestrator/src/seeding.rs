//! Particle seeding
//!
//! Fills each release region with a regular lattice of fluid particles,
//! drops lattice points that would start inside the terrain, and lays one
//! layer of wall particles under the terrain surface.

use glam::{EulerRot, Quat, Vec3};
use tailings_kernel::{
    ParticleDomain, SimulationBounds, SolverError, TerrainSampler, EFFECTIVE_RADIUS_FACTOR,
};

use crate::config::SeedRegion;

/// Lattice points kept and rejected for one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionStats {
    /// Points that became fluid particles.
    pub accepted: usize,
    /// Points below the terrain clearance or outside the bounds.
    pub rejected: usize,
}

/// Result of seeding.
#[derive(Debug, Clone)]
pub struct SeededDomain {
    /// Particles, bounds and derived discretisation handed to the solver.
    pub domain: ParticleDomain,
    /// Per-region lattice statistics, in configuration order.
    pub regions: Vec<RegionStats>,
    /// Bucket voxels per axis.
    pub bucket_resolution: [u32; 3],
}

fn rotation(region: &SeedRegion) -> Quat {
    let [rx, ry, rz] = region.rotation_degrees.map(f32::to_radians);
    Quat::from_euler(EulerRot::YXZ, ry, rx, rz)
}

/// World-space corners of a region box.
fn corners(region: &SeedRegion) -> impl Iterator<Item = Vec3> {
    let rot = rotation(region);
    let center = Vec3::from(region.center);
    let half = Vec3::from(region.size) * 0.5;
    (0..8).map(move |i| {
        let sign = Vec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        );
        center + rot * (half * sign)
    })
}

/// Highest y reached by a (possibly rotated) region.
pub fn region_top(region: &SeedRegion) -> f32 {
    corners(region).map(|c| c.y).fold(f32::NEG_INFINITY, f32::max)
}

/// Lattice points of a region: `floor(size / s)` per axis at
/// `min + (i + 0.5) s`, rotated about the region center.
pub fn region_lattice(region: &SeedRegion, spacing: f32) -> Vec<[f32; 3]> {
    let rot = rotation(region);
    let center = Vec3::from(region.center);
    let size = Vec3::from(region.size);
    let min = center - size * 0.5;
    let counts = (size / spacing).floor();
    let [nx, ny, nz] = [counts.x as usize, counts.y as usize, counts.z as usize];

    let mut points = Vec::with_capacity(nx * ny * nz);
    for ix in 0..nx {
        for iy in 0..ny {
            for iz in 0..nz {
                let local = min + Vec3::new(ix as f32 + 0.5, iy as f32 + 0.5, iz as f32 + 0.5) * spacing;
                points.push((center + rot * (local - center)).to_array());
            }
        }
    }
    points
}

/// One layer of wall particles half a spacing under the terrain surface.
pub fn wall_layer(bounds: &SimulationBounds, terrain: &dyn TerrainSampler, spacing: f32) -> Vec<[f32; 3]> {
    let nx = (bounds.size[0] / spacing).floor() as usize;
    let nz = (bounds.size[2] / spacing).floor() as usize;
    let mut walls = Vec::with_capacity(nx * nz);
    for ix in 0..nx {
        for iz in 0..nz {
            let x = bounds.min[0] + (ix as f32 + 0.5) * spacing;
            let z = bounds.min[2] + (iz as f32 + 0.5) * spacing;
            let (u, v) = bounds.uv(x, z);
            walls.push([x, terrain.elevation(u, v) - 0.5 * spacing, z]);
        }
    }
    walls
}

/// Seed fluid and wall particles.
///
/// A lattice point is kept when it lies inside `bounds` and at least one
/// spacing above the ground under it. The total mass
/// `rest_density * total_volume` is split evenly over the kept points.
pub fn seed_particles(
    regions: &[SeedRegion],
    bounds: SimulationBounds,
    terrain: &dyn TerrainSampler,
    spacing: f32,
    rest_density: f32,
    total_volume: f32,
) -> Result<SeededDomain, SolverError> {
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(SolverError::NonPositive { name: "particle spacing", value: spacing });
    }

    let mut fluid = Vec::new();
    let mut stats = Vec::with_capacity(regions.len());
    for region in regions {
        let mut s = RegionStats::default();
        for p in region_lattice(region, spacing) {
            let (u, v) = bounds.uv(p[0], p[2]);
            if bounds.contains(p) && p[1] >= terrain.elevation(u, v) + spacing {
                fluid.push(p);
                s.accepted += 1;
            } else {
                s.rejected += 1;
            }
        }
        tracing::debug!("Seeding region: {} accepted, {} rejected", s.accepted, s.rejected);
        stats.push(s);
    }

    if fluid.is_empty() {
        return Err(SolverError::NoParticlesSeeded);
    }

    let particle_mass = rest_density * total_volume / fluid.len() as f32;
    let walls = wall_layer(&bounds, terrain, spacing);
    let domain = ParticleDomain {
        fluid,
        walls,
        bounds,
        particle_mass,
        effective_radius: EFFECTIVE_RADIUS_FACTOR * spacing,
    };
    let bucket_resolution = domain.bucket_resolution();

    tracing::info!(
        "Seeded {} fluid particles, {} wall particles, particle mass {:.3}",
        domain.fluid.len(),
        domain.walls.len(),
        particle_mass
    );
    tracing::info!(
        "Bucket resolution: {}x{}x{}",
        bucket_resolution[0],
        bucket_resolution[1],
        bucket_resolution[2]
    );

    Ok(SeededDomain { domain, regions: stats, bucket_resolution })
}
