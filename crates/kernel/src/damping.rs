//! Contact damping derived from a coefficient of restitution.

use crate::error::SolverError;

/// Contact-stiffness dependent constant in the damping formula.
pub const ALPHA_D: f64 = 0.7;

/// Damping coefficient for restitution `e`.
///
/// ```text
/// damping = -ln(e) / (alpha_d * sqrt(ln(e)^2 + pi^2))
/// ```
///
/// Evaluated in `f64`; `e = 1` (perfectly elastic) gives zero damping.
pub fn damping_coefficient(restitution: f32) -> Result<f32, SolverError> {
    if !(restitution > 0.0 && restitution <= 1.0) {
        return Err(SolverError::InvalidRestitution(restitution));
    }
    let ln_e = f64::from(restitution).ln();
    let d = -ln_e / (ALPHA_D * (ln_e * ln_e + std::f64::consts::PI * std::f64::consts::PI).sqrt());
    Ok(d as f32)
}

/// Caches the damping coefficient and recomputes it only when the
/// restitution actually changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampingTracker {
    restitution: f32,
    damping: f32,
    recomputations: u32,
}

impl DampingTracker {
    /// Tracker initialised for `restitution`.
    pub fn new(restitution: f32) -> Result<Self, SolverError> {
        Ok(Self {
            restitution,
            damping: damping_coefficient(restitution)?,
            recomputations: 1,
        })
    }

    /// Current damping coefficient.
    pub fn damping(&self) -> f32 {
        self.damping
    }

    /// Current restitution.
    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    /// How many times the coefficient has been derived.
    pub fn recomputations(&self) -> u32 {
        self.recomputations
    }

    /// Update the restitution. Returns `Ok(true)` when the damping was
    /// recomputed, `Ok(false)` when `restitution` is unchanged. An invalid
    /// value leaves the tracker untouched.
    pub fn set_restitution(&mut self, restitution: f32) -> Result<bool, SolverError> {
        if restitution == self.restitution {
            return Ok(false);
        }
        self.damping = damping_coefficient(restitution)?;
        self.restitution = restitution;
        self.recomputations += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(e: f64) -> f64 {
        let l = e.ln();
        -l / (0.7 * (l * l + std::f64::consts::PI.powi(2)).sqrt())
    }

    #[test]
    fn matches_reference_values() {
        let cases = [(0.07_f32, 0.922_974_7_f32), (0.5, 0.307_79), (0.9, 0.047_883)];
        for (e, expected) in cases {
            let d = damping_coefficient(e).unwrap();
            let rel = (d - expected).abs() / expected;
            assert!(rel < 1e-4, "e={e}: got {d}, expected {expected}");
        }
    }

    #[test]
    fn agrees_with_f64_closed_form() {
        for e in [0.0667_f32, 0.2, 0.35, 0.8] {
            let d = f64::from(damping_coefficient(e).unwrap());
            let r = reference(f64::from(e));
            assert!((d - r).abs() / r < 1e-5, "e={e}: {d} vs {r}");
        }
    }

    #[test]
    fn elastic_contact_has_no_damping() {
        assert_eq!(damping_coefficient(1.0).unwrap(), 0.0);
    }

    #[test]
    fn out_of_range_restitution_is_rejected() {
        for e in [0.0, -0.5, 1.5, f32::NAN] {
            assert!(damping_coefficient(e).is_err(), "e={e}");
        }
    }

    #[test]
    fn tracker_recomputes_only_on_change() {
        let mut t = DampingTracker::new(0.07).unwrap();
        assert_eq!(t.recomputations(), 1);
        assert_eq!(t.set_restitution(0.07), Ok(false));
        assert_eq!(t.recomputations(), 1);
        assert_eq!(t.set_restitution(0.5), Ok(true));
        assert_eq!(t.recomputations(), 2);
        assert!((t.damping() - 0.307_79).abs() < 1e-4);
    }

    #[test]
    fn tracker_keeps_state_on_invalid_update() {
        let mut t = DampingTracker::new(0.5).unwrap();
        let before = t;
        assert!(t.set_restitution(0.0).is_err());
        assert_eq!(t, before);
    }
}
