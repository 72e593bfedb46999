//! SPH smoothing kernels and the per-particle SPH operators.
//!
//! Uses the Müller et al. (2003) kernel family with compact support radius
//! `h` (the effective radius):
//!
//! - poly6 for density summation,
//! - spiky gradient for pressure,
//! - viscosity Laplacian for the viscous term.
//!
//! The operators read neighbor candidates from the bucket grid and a
//! [`ParticleView`] of the *current* buffer only; they never write shared
//! state, so the solver can evaluate them for all particles in parallel.

use std::f32::consts::PI;

use crate::bucket::BucketGrid;
use crate::eos;
use crate::particle::FluidParticle;
use crate::rheology::Rheology;

/// Distance below which two particles are treated as coincident and the
/// gradient is taken as zero.
const COINCIDENT_EPS: f32 = 1.0e-12;

/// Fraction of `h` used as the lower bound on pair distance when forming a
/// shear rate estimate.
const SHEAR_DISTANCE_FLOOR: f32 = 0.01;

/// Smoothing kernels for a fixed support radius, with the normalization
/// constants precomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingKernels {
    h: f32,
    h2: f32,
    poly6_norm: f32,
    spiky_norm: f32,
    viscosity_norm: f32,
}

impl SmoothingKernels {
    /// Kernels with support radius `h`.
    pub fn new(h: f32) -> Self {
        let h2 = h * h;
        let h3 = h2 * h;
        let h6 = h3 * h3;
        let h9 = h6 * h3;
        Self {
            h,
            h2,
            poly6_norm: 315.0 / (64.0 * PI * h9),
            spiky_norm: 45.0 / (PI * h6),
            viscosity_norm: 45.0 / (PI * h6),
        }
    }

    /// Support radius.
    pub fn radius(&self) -> f32 {
        self.h
    }

    /// Poly6 kernel evaluated from the squared distance.
    ///
    /// ```text
    /// W(r, h) = 315 / (64 pi h^9) * (h^2 - r^2)^3    for r < h
    /// ```
    #[inline]
    pub fn poly6(&self, r2: f32) -> f32 {
        if r2 >= self.h2 {
            return 0.0;
        }
        let d = self.h2 - r2;
        self.poly6_norm * d * d * d
    }

    /// Spiky kernel gradient with respect to `x_i`, given `d = x_i - x_j`
    /// and `r = |d|`.
    ///
    /// ```text
    /// grad W = -45 / (pi h^6) * (h - r)^2 * d / r    for 0 < r < h
    /// ```
    #[inline]
    pub fn spiky_gradient(&self, d: [f32; 3], r: f32) -> [f32; 3] {
        if r >= self.h || r < COINCIDENT_EPS {
            return [0.0; 3];
        }
        let t = self.h - r;
        let s = -self.spiky_norm * t * t / r;
        [s * d[0], s * d[1], s * d[2]]
    }

    /// Viscosity kernel Laplacian.
    ///
    /// ```text
    /// lap W = 45 / (pi h^6) * (h - r)    for r < h
    /// ```
    #[inline]
    pub fn viscosity_laplacian(&self, r: f32) -> f32 {
        if r >= self.h {
            return 0.0;
        }
        self.viscosity_norm * (self.h - r)
    }
}

/// Read-only view of everything a particle can interact with during one
/// phase.
#[derive(Clone, Copy)]
pub struct ParticleView<'a> {
    /// Fluid particles (current buffer).
    pub fluid: &'a [FluidParticle],
    /// Densities from the last density pass, indexed like `fluid`.
    pub densities: &'a [f32],
    /// Static wall particle positions.
    pub walls: &'a [[f32; 3]],
    /// Bucket grid built over `fluid` followed by `walls`.
    pub grid: &'a BucketGrid,
}

impl ParticleView<'_> {
    /// Visit each fluid neighbor `j != i` and each wall neighbor within the
    /// support radius of particle `i`.
    ///
    /// `fluid(j, d, r)` and `wall(d, r)` receive `d = x_i - x_j` and its
    /// length.
    #[inline]
    fn for_each_neighbor<F, W>(&self, i: usize, h2: f32, mut fluid: F, mut wall: W)
    where
        F: FnMut(usize, [f32; 3], f32),
        W: FnMut([f32; 3], f32),
    {
        let n = self.fluid.len();
        let pi = self.fluid[i].position;
        self.grid.for_each_candidate(pi, |j| {
            if j == i {
                return;
            }
            let pj = if j < n {
                self.fluid[j].position
            } else {
                match self.walls.get(j - n) {
                    Some(p) => *p,
                    None => return,
                }
            };
            let d = [pi[0] - pj[0], pi[1] - pj[1], pi[2] - pj[2]];
            let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
            if r2 >= h2 {
                return;
            }
            let r = r2.sqrt();
            if j < n {
                fluid(j, d, r);
            } else {
                wall(d, r);
            }
        });
    }
}

/// Material and discretisation constants shared by every particle pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluidModel {
    /// Smoothing kernels for the effective radius.
    pub kernels: SmoothingKernels,
    /// Mass of every fluid particle; wall particles use the same mass.
    pub particle_mass: f32,
    /// Rest density rho0.
    pub rest_density: f32,
    /// Equation-of-state stiffness.
    pub gas_constant: f32,
    /// Clamp negative pressure to zero.
    pub clamp_negative_pressure: bool,
    /// Viscosity law.
    pub rheology: Rheology,
}

impl FluidModel {
    /// Pressure at `density`.
    #[inline]
    pub fn pressure(&self, density: f32) -> f32 {
        eos::pressure(
            density,
            self.rest_density,
            self.gas_constant,
            self.clamp_negative_pressure,
        )
    }

    /// SPH density of fluid particle `i`.
    ///
    /// ```text
    /// rho_i = m W(0) + sum_j m W(|x_i - x_j|, h)
    /// ```
    ///
    /// The self term is added explicitly so a particle dropped from a full
    /// voxel still has a positive density. Wall neighbors contribute the
    /// fluid particle mass.
    pub fn density(&self, i: usize, fluid: &[FluidParticle], walls: &[[f32; 3]], grid: &BucketGrid) -> f32 {
        let k = &self.kernels;
        let m = self.particle_mass;
        let mut rho = m * k.poly6(0.0);

        let view = ParticleView {
            fluid,
            densities: &[],
            walls,
            grid,
        };
        let mut sum = 0.0f32;
        let mut wall_sum = 0.0f32;
        view.for_each_neighbor(
            i,
            k.h2,
            |_, _, r| sum += k.poly6(r * r),
            |_, r| wall_sum += k.poly6(r * r),
        );
        rho += m * (sum + wall_sum);
        rho
    }

    /// Acceleration on fluid particle `i` from pressure and viscosity.
    ///
    /// ```text
    /// a_p = -sum_j m (p_i + p_j) / (2 rho_i rho_j) grad W_ij
    /// a_v =  sum_j mu_eff m (v_j - v_i) / (rho_i rho_j) lap W_ij
    /// ```
    ///
    /// The pressure term is antisymmetric in `(i, j)`. For wall neighbors
    /// both sides use `max(p_i, 0)` and `rho_j = rho0` so walls never pull
    /// fluid in; wall velocity is zero. `mu_eff` comes from the rheology
    /// model evaluated at the pair shear rate `|v_i - v_j| / max(r, 0.01 h)`.
    pub fn acceleration(&self, i: usize, view: &ParticleView<'_>) -> [f32; 3] {
        let k = &self.kernels;
        let m = self.particle_mass;
        let me = &view.fluid[i];
        let rho_i = view.densities[i];
        let p_i = self.pressure(rho_i);
        let p_i_wall = p_i.max(0.0);
        let vi = me.velocity;
        let r_floor = SHEAR_DISTANCE_FLOOR * k.h;
        let mut acc = [0.0f32; 3];
        let mut wall_acc = [0.0f32; 3];

        let add_pair = |acc: &mut [f32; 3], d: [f32; 3], r: f32, pressure_term: f32, vj: [f32; 3], rho_j: f32| {
            let grad = k.spiky_gradient(d, r);
            let dv = [vj[0] - vi[0], vj[1] - vi[1], vj[2] - vi[2]];
            let shear = (dv[0] * dv[0] + dv[1] * dv[1] + dv[2] * dv[2]).sqrt() / r.max(r_floor);
            let mu = self.rheology.effective_viscosity(shear);
            let visc = mu * m * k.viscosity_laplacian(r) / (rho_i * rho_j);
            for a in 0..3 {
                acc[a] += -m * pressure_term * grad[a] + visc * dv[a];
            }
        };

        view.for_each_neighbor(
            i,
            k.h2,
            |j, d, r| {
                let other = &view.fluid[j];
                let rho_j = view.densities[j];
                let p_j = self.pressure(rho_j);
                let term = (p_i + p_j) / (2.0 * rho_i * rho_j);
                add_pair(&mut acc, d, r, term, other.velocity, rho_j);
            },
            |d, r| {
                let rho_w = self.rest_density;
                let term = p_i_wall / (rho_i * rho_w);
                add_pair(&mut wall_acc, d, r, term, [0.0; 3], rho_w);
            },
        );
        [acc[0] + wall_acc[0], acc[1] + wall_acc[1], acc[2] + wall_acc[2]]
    }
}
