//! Terrain contact and planar containment.
//!
//! Wall particles give the terrain an SPH presence, but at typical spacings
//! they cannot stop a fast particle on their own. The integrator therefore
//! also resolves contact against the height field directly with a
//! penalty (spring-dashpot) response along the surface normal plus Coulomb
//! friction. The dashpot strength comes from the restitution-derived
//! damping coefficient, which is how restitution couples to contact.

use crate::bounds::SimulationBounds;
use crate::terrain::TerrainSampler;

/// Contact spring period, in sub-steps. The spring completes half an
/// oscillation over this many sub-steps, which keeps `k dt^2` small enough
/// for semi-implicit Euler.
pub const CONTACT_SUBSTEPS: f32 = 10.0;

/// Contact response parameters for one sub-step size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactModel {
    /// Normal spring stiffness per unit mass.
    pub stiffness: f32,
    /// Normal dashpot coefficient per unit mass.
    pub dashpot: f32,
    /// Coulomb friction coefficient.
    pub friction: f32,
    /// Penetration beyond which the particle is projected back onto the
    /// surface.
    pub max_penetration: f32,
}

impl ContactModel {
    /// Contact model for sub-step `dt`.
    ///
    /// ```text
    /// k = (pi / (CONTACT_SUBSTEPS dt))^2
    /// c = 2 damping sqrt(k)
    /// ```
    pub fn new(dt: f32, damping: f32, friction: f32, max_penetration: f32) -> Self {
        let omega = std::f32::consts::PI / (CONTACT_SUBSTEPS * dt);
        Self {
            stiffness: omega * omega,
            dashpot: 2.0 * damping * omega,
            friction,
            max_penetration,
        }
    }

    /// Same model with a new damping coefficient.
    pub fn with_damping(self, damping: f32) -> Self {
        Self {
            dashpot: 2.0 * damping * self.stiffness.sqrt(),
            ..self
        }
    }
}

/// Terrain elevation below world planar position `(x, z)`.
#[inline]
pub fn ground_height(terrain: &dyn TerrainSampler, bounds: &SimulationBounds, x: f32, z: f32) -> f32 {
    let (u, v) = bounds.uv(x, z);
    terrain.elevation(u, v)
}

/// Upward unit normal of the terrain surface at world planar position
/// `(x, z)`, from central differences one texel apart.
pub fn surface_normal(terrain: &dyn TerrainSampler, bounds: &SimulationBounds, x: f32, z: f32) -> [f32; 3] {
    let res = terrain.resolution().max(1) as f32;
    let ex = bounds.size[0] / res;
    let ez = bounds.size[2] / res;
    let dhdx = (ground_height(terrain, bounds, x + ex, z) - ground_height(terrain, bounds, x - ex, z)) / (2.0 * ex);
    let dhdz = (ground_height(terrain, bounds, x, z + ez) - ground_height(terrain, bounds, x, z - ez)) / (2.0 * ez);
    let n = [-dhdx, 1.0, -dhdz];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len.is_finite() && len > 0.0 {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0, 1.0, 0.0]
    }
}

#[inline]
fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn advance(p: [f32; 3], v: [f32; 3], dt: f32) -> [f32; 3] {
    [p[0] + v[0] * dt, p[1] + v[1] * dt, p[2] + v[2] * dt]
}

impl ContactModel {
    /// Move a particle from `position` with the already-updated velocity
    /// `velocity`, resolving terrain contact on the way. Returns the new
    /// position and velocity.
    ///
    /// With predicted penetration `delta > 0` the normal velocity gains
    /// `max(k delta - c v.n, 0) dt` (never adhesive), and friction removes
    /// up to `friction` times that gain from the tangential speed. A
    /// particle still deeper than `max_penetration` afterwards is placed on
    /// the surface and loses its inward normal velocity.
    pub fn resolve(
        &self,
        terrain: &dyn TerrainSampler,
        bounds: &SimulationBounds,
        position: [f32; 3],
        velocity: [f32; 3],
        dt: f32,
    ) -> ([f32; 3], [f32; 3]) {
        let mut v = velocity;
        let predicted = advance(position, v, dt);
        let ground = ground_height(terrain, bounds, predicted[0], predicted[2]);
        let penetration = ground - predicted[1];
        if !(penetration > 0.0) {
            return (predicted, v);
        }

        let n = surface_normal(terrain, bounds, predicted[0], predicted[2]);
        let vn = dot(v, n);
        let dvn = ((self.stiffness * penetration - self.dashpot * vn) * dt).max(0.0);
        for a in 0..3 {
            v[a] += n[a] * dvn;
        }

        // Coulomb friction on the tangential part
        let vn = dot(v, n);
        let vt = [v[0] - vn * n[0], v[1] - vn * n[1], v[2] - vn * n[2]];
        let vt_len = dot(vt, vt).sqrt();
        if vt_len > 0.0 {
            let keep = 1.0 - (self.friction * dvn).min(vt_len) / vt_len;
            v = [
                vn * n[0] + vt[0] * keep,
                vn * n[1] + vt[1] * keep,
                vn * n[2] + vt[2] * keep,
            ];
        }

        let mut p = advance(position, v, dt);
        let ground = ground_height(terrain, bounds, p[0], p[2]);
        if ground - p[1] > self.max_penetration {
            p[1] = ground;
            let vn = dot(v, n);
            if vn < 0.0 {
                for a in 0..3 {
                    v[a] -= vn * n[a];
                }
            }
        }
        (p, v)
    }
}

/// Keep a particle inside the planar (x/z) extent of `bounds`, zeroing the
/// velocity component that points out of the box.
#[inline]
pub fn clamp_planar(bounds: &SimulationBounds, position: &mut [f32; 3], velocity: &mut [f32; 3]) {
    let max = bounds.max();
    for a in [0, 2] {
        if position[a] < bounds.min[a] {
            position[a] = bounds.min[a];
            velocity[a] = velocity[a].max(0.0);
        } else if position[a] > max[a] {
            position[a] = max[a];
            velocity[a] = velocity[a].min(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::HeightField;

    fn flat() -> (HeightField, SimulationBounds) {
        let terrain = HeightField::flat(4, 0.0).unwrap();
        let bounds = SimulationBounds::from_min_size([0.0, -10.0, 0.0], [40.0, 50.0, 40.0]).unwrap();
        (terrain, bounds)
    }

    #[test]
    fn flat_terrain_normal_points_up() {
        let (terrain, bounds) = flat();
        assert_eq!(surface_normal(&terrain, &bounds, 20.0, 20.0), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn sloped_terrain_normal_leans_downhill() {
        // Elevation rises along +x
        let row = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        let raw: Vec<f32> = (0..4).flat_map(|_| row).collect();
        let terrain = HeightField::from_grid(4, 4, raw, 0.0, 30.0).unwrap();
        let bounds = SimulationBounds::from_min_size([0.0, -10.0, 0.0], [40.0, 50.0, 40.0]).unwrap();
        let n = surface_normal(&terrain, &bounds, 20.0, 20.0);
        assert!(n[0] < 0.0 && n[1] > 0.0, "n={n:?}");
        assert!(n[2].abs() < 1e-6);
        assert!((dot(n, n) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn free_flight_is_plain_euler_drift() {
        let (terrain, bounds) = flat();
        let model = ContactModel::new(0.01, 0.5, 0.1, 1.0);
        let (p, v) = model.resolve(&terrain, &bounds, [5.0, 10.0, 5.0], [1.0, -2.0, 0.0], 0.01);
        assert_eq!(v, [1.0, -2.0, 0.0]);
        assert!((p[0] - 5.01).abs() < 1e-6 && (p[1] - 9.98).abs() < 1e-6);
    }

    #[test]
    fn contact_pushes_back_and_never_pulls() {
        let (terrain, bounds) = flat();
        let model = ContactModel::new(0.01, 0.9, 0.0, 1.0);
        let (_, v) = model.resolve(&terrain, &bounds, [5.0, 0.001, 5.0], [0.0, -1.0, 0.0], 0.01);
        assert!(v[1] > -1.0, "contact must slow the descent, v={v:?}");

        // Already leaving the surface: no adhesive pull back down
        let (_, v) = model.resolve(&terrain, &bounds, [5.0, -0.05, 5.0], [0.0, 3.0, 0.0], 0.01);
        assert!(v[1] >= 3.0);
    }

    #[test]
    fn friction_slows_sliding() {
        let (terrain, bounds) = flat();
        let slippery = ContactModel::new(0.01, 0.9, 0.0, 1.0);
        let sticky = ContactModel::new(0.01, 0.9, 0.5, 1.0);
        let start = ([5.0, 0.0, 5.0], [2.0, -0.5, 0.0]);
        let (_, v0) = slippery.resolve(&terrain, &bounds, start.0, start.1, 0.01);
        let (_, v1) = sticky.resolve(&terrain, &bounds, start.0, start.1, 0.01);
        assert_eq!(v0[0], 2.0);
        assert!(v1[0] < 2.0 && v1[0] >= 0.0, "v1={v1:?}");
    }

    #[test]
    fn deep_penetration_is_projected_to_surface() {
        let (terrain, bounds) = flat();
        let model = ContactModel::new(0.01, 0.9, 0.0, 0.5);
        let (p, v) = model.resolve(&terrain, &bounds, [5.0, -3.0, 5.0], [0.0, -50.0, 0.0], 0.01);
        assert_eq!(p[1], 0.0);
        assert!(v[1] >= 0.0);
    }

    #[test]
    fn planar_clamp_zeroes_outward_velocity() {
        let (_, bounds) = flat();
        let mut p = [-1.0, 5.0, 45.0];
        let mut v = [-3.0, 1.0, 2.0];
        clamp_planar(&bounds, &mut p, &mut v);
        assert_eq!(p, [0.0, 5.0, 40.0]);
        assert_eq!(v, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn stiffness_scales_with_substep() {
        let a = ContactModel::new(0.01, 0.5, 0.0, 1.0);
        let b = ContactModel::new(0.02, 0.5, 0.0, 1.0);
        assert!((a.stiffness / b.stiffness - 4.0).abs() < 1e-3);
        let c = a.with_damping(0.25);
        assert!((c.dashpot - a.dashpot * 0.5).abs() < 1e-3);
    }
}
