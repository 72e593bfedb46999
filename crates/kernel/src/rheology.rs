//! Rheology models: effective viscosity as a function of shear rate.
//!
//! ```text
//! Newtonian           mu_eff = mu
//! Power-Law           mu_eff = mu * g^(n-1)
//! Bingham-Plastic     mu_eff = tau_y / g + mu * g^(n-1)
//! Herschel-Bulkley    mu_eff = tau_y / g + mu * g^(n-1)
//! ```
//!
//! Near zero shear the yield term diverges. The shear rate is floored at
//! `1 / solid_approximation_factor` (and [`MIN_SHEAR_RATE`]), so below the
//! floor the material behaves as a very stiff but finite-viscosity solid.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive, SolverError};

/// Absolute lower bound on the shear rate fed into any model (1/s).
pub const MIN_SHEAR_RATE: f32 = 1.0e-6;

/// Which constitutive law the solver uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RheologyKind {
    /// Constant viscosity.
    #[default]
    Newtonian,
    /// Shear-thinning (`n < 1`) or shear-thickening (`n > 1`) fluid.
    PowerLaw,
    /// Yield stress plus plastic viscosity; shares the Herschel-Bulkley law.
    BinghamPlastic,
    /// Yield stress plus power-law viscosity.
    HerschelBulkley,
}

/// Parameters shared by all rheology models, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RheologyParameters {
    /// Selected model.
    #[serde(default)]
    pub model: RheologyKind,
    /// Power-law exponent `n` (1 for Newtonian behaviour).
    #[serde(default = "default_exponent")]
    pub power_law_exponent: f32,
    /// Yield stress `tau_y` (0 for no yield).
    #[serde(default)]
    pub yield_stress: f32,
    /// Bounds apparent viscosity below the yield threshold.
    #[serde(default = "default_solid_factor")]
    pub solid_approximation_factor: f32,
}

fn default_exponent() -> f32 {
    1.0
}

fn default_solid_factor() -> f32 {
    100.0
}

impl Default for RheologyParameters {
    fn default() -> Self {
        Self {
            model: RheologyKind::Newtonian,
            power_law_exponent: default_exponent(),
            yield_stress: 0.0,
            solid_approximation_factor: default_solid_factor(),
        }
    }
}

/// Closed set of rheology models with the parameters each one uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rheology {
    /// `mu`
    Newtonian {
        /// Dynamic viscosity.
        viscosity: f32,
    },
    /// `mu * g^(n-1)`
    PowerLaw {
        /// Consistency.
        viscosity: f32,
        /// Flow index `n`.
        exponent: f32,
        /// Shear-rate floor.
        min_shear_rate: f32,
    },
    /// `tau_y / g + mu * g^(n-1)`, used for both yield-stress models.
    HerschelBulkley {
        /// Consistency / plastic viscosity.
        viscosity: f32,
        /// Flow index `n`.
        exponent: f32,
        /// Yield stress.
        yield_stress: f32,
        /// Shear-rate floor.
        min_shear_rate: f32,
    },
}

impl Rheology {
    /// Resolve configured parameters into a model, validating the fields
    /// the selected model reads.
    pub fn from_parameters(viscosity: f32, params: &RheologyParameters) -> Result<Self, SolverError> {
        if !viscosity.is_finite() {
            return Err(SolverError::NonFinite { name: "viscosity" });
        }
        if viscosity < 0.0 {
            return Err(SolverError::NonPositive { name: "viscosity", value: viscosity });
        }
        if params.model == RheologyKind::Newtonian {
            return Ok(Rheology::Newtonian { viscosity });
        }

        ensure_positive("solid approximation factor", params.solid_approximation_factor)?;
        let min_shear_rate = (1.0 / params.solid_approximation_factor).max(MIN_SHEAR_RATE);

        match params.model {
            RheologyKind::Newtonian => Ok(Rheology::Newtonian { viscosity }),
            RheologyKind::PowerLaw => {
                ensure_positive("power-law exponent", params.power_law_exponent)?;
                Ok(Rheology::PowerLaw {
                    viscosity,
                    exponent: params.power_law_exponent,
                    min_shear_rate,
                })
            }
            RheologyKind::BinghamPlastic | RheologyKind::HerschelBulkley => {
                if !params.yield_stress.is_finite() || params.yield_stress < 0.0 {
                    return Err(SolverError::NonPositive {
                        name: "yield stress",
                        value: params.yield_stress,
                    });
                }
                ensure_positive("power-law exponent", params.power_law_exponent)?;
                Ok(Rheology::HerschelBulkley {
                    viscosity,
                    exponent: params.power_law_exponent,
                    yield_stress: params.yield_stress,
                    min_shear_rate,
                })
            }
        }
    }

    /// Effective (apparent) viscosity at `shear_rate`. Always finite and
    /// non-negative for finite input.
    #[inline]
    pub fn effective_viscosity(&self, shear_rate: f32) -> f32 {
        match *self {
            Rheology::Newtonian { viscosity } => viscosity,
            Rheology::PowerLaw { viscosity, exponent, min_shear_rate } => {
                let g = floor_shear(shear_rate, min_shear_rate);
                viscosity * g.powf(exponent - 1.0)
            }
            Rheology::HerschelBulkley { viscosity, exponent, yield_stress, min_shear_rate } => {
                let g = floor_shear(shear_rate, min_shear_rate);
                yield_stress / g + viscosity * g.powf(exponent - 1.0)
            }
        }
    }
}

#[inline]
fn floor_shear(shear_rate: f32, min_shear_rate: f32) -> f32 {
    if shear_rate.is_nan() {
        min_shear_rate
    } else {
        shear_rate.max(min_shear_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(model: RheologyKind, n: f32, tau: f32) -> RheologyParameters {
        RheologyParameters {
            model,
            power_law_exponent: n,
            yield_stress: tau,
            solid_approximation_factor: 100.0,
        }
    }

    #[test]
    fn newtonian_is_constant() {
        let r = Rheology::from_parameters(750.0, &RheologyParameters::default()).unwrap();
        for g in [0.0, 1e-3, 1.0, 1e4] {
            assert_eq!(r.effective_viscosity(g), 750.0);
        }
    }

    #[test]
    fn power_law_with_unit_exponent_is_newtonian() {
        let r = Rheology::from_parameters(10.0, &params(RheologyKind::PowerLaw, 1.0, 0.0)).unwrap();
        assert!((r.effective_viscosity(0.5) - 10.0).abs() < 1e-5);
        assert!((r.effective_viscosity(50.0) - 10.0).abs() < 1e-5);
    }

    #[test]
    fn power_law_shear_thinning_decreases_with_rate() {
        let r = Rheology::from_parameters(10.0, &params(RheologyKind::PowerLaw, 0.5, 0.0)).unwrap();
        let low = r.effective_viscosity(1.0);
        let high = r.effective_viscosity(100.0);
        assert!((low - 10.0).abs() < 1e-4);
        assert!((high - 1.0).abs() < 1e-4, "10 * 100^-0.5 = 1, got {high}");
    }

    #[test]
    fn bingham_matches_closed_form_above_floor() {
        let r = Rheology::from_parameters(2.0, &params(RheologyKind::BinghamPlastic, 1.0, 50.0)).unwrap();
        let mu = r.effective_viscosity(10.0);
        assert!((mu - (50.0 / 10.0 + 2.0)).abs() < 1e-4, "mu={mu}");
    }

    #[test]
    fn bingham_applies_configured_exponent() {
        // 10 * 4^(0.5 - 1) = 5
        let r = Rheology::from_parameters(10.0, &params(RheologyKind::BinghamPlastic, 0.5, 0.0)).unwrap();
        let mu = r.effective_viscosity(4.0);
        assert!((mu - 5.0).abs() < 1e-4, "mu={mu}");

        let with_yield = Rheology::from_parameters(10.0, &params(RheologyKind::BinghamPlastic, 0.5, 8.0)).unwrap();
        let mu = with_yield.effective_viscosity(4.0);
        assert!((mu - (8.0 / 4.0 + 5.0)).abs() < 1e-4, "mu={mu}");

        let hb = Rheology::from_parameters(10.0, &params(RheologyKind::HerschelBulkley, 0.5, 8.0)).unwrap();
        assert_eq!(with_yield, hb);
    }

    #[test]
    fn bingham_rejects_non_positive_exponent() {
        let err = Rheology::from_parameters(10.0, &params(RheologyKind::BinghamPlastic, 0.0, 1.0)).unwrap_err();
        assert!(matches!(err, SolverError::NonPositive { name: "power-law exponent", .. }));
    }

    #[test]
    fn yield_term_is_bounded_at_zero_shear() {
        let r = Rheology::from_parameters(2.0, &params(RheologyKind::BinghamPlastic, 1.0, 50.0)).unwrap();
        let at_zero = r.effective_viscosity(0.0);
        assert!(at_zero.is_finite());
        // Floor is 1 / 100, so tau_y * 100 + mu
        assert!((at_zero - (5000.0 + 2.0)).abs() < 1e-2, "at_zero={at_zero}");
        assert_eq!(r.effective_viscosity(f32::NAN), at_zero);
    }

    #[test]
    fn apparent_viscosity_rises_as_shear_falls() {
        let r = Rheology::from_parameters(1.0, &params(RheologyKind::HerschelBulkley, 0.8, 20.0)).unwrap();
        let rates = [10.0, 1.0, 0.1, 0.02];
        let mus: Vec<f32> = rates.iter().map(|&g| r.effective_viscosity(g)).collect();
        assert!(mus.windows(2).all(|w| w[1] > w[0]), "{mus:?}");
    }

    #[test]
    fn herschel_bulkley_closed_form() {
        let r = Rheology::from_parameters(3.0, &params(RheologyKind::HerschelBulkley, 0.5, 8.0)).unwrap();
        let g = 4.0_f32;
        let expected = 8.0 / g + 3.0 * g.powf(-0.5);
        assert!((r.effective_viscosity(g) - expected).abs() < 1e-5);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Rheology::from_parameters(-1.0, &RheologyParameters::default()).is_err());
        assert!(Rheology::from_parameters(1.0, &params(RheologyKind::PowerLaw, 0.0, 0.0)).is_err());
        assert!(Rheology::from_parameters(1.0, &params(RheologyKind::BinghamPlastic, 1.0, -5.0)).is_err());
        let mut p = params(RheologyKind::HerschelBulkley, 1.0, 1.0);
        p.solid_approximation_factor = 0.0;
        assert!(Rheology::from_parameters(1.0, &p).is_err());
    }
}
