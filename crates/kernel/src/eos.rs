//! Equation of state for the tailings fluid.
//!
//! A linear (ideal-gas style) stiffness law relating density excess to
//! pressure. Units follow the configuration: density in mass per cubic
//! world unit, pressure in consistent derived units.

/// Linear equation of state.
///
/// ```text
/// P = k * (rho - rho0)
/// ```
///
/// # Arguments
/// * `density` - Current density rho.
/// * `rest_density` - Reference rest density rho0.
/// * `gas_constant` - Stiffness k.
/// * `clamp_negative` - When set, tension (`rho < rho0`) yields zero pressure.
///
/// # Returns
/// Pressure. Negative when expanded unless clamped.
#[inline]
pub fn pressure(density: f32, rest_density: f32, gas_constant: f32, clamp_negative: bool) -> f32 {
    let p = gas_constant * (density - rest_density);
    if clamp_negative {
        p.max(0.0)
    } else {
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_at_rest_density() {
        assert_eq!(pressure(1400.0, 1400.0, 250.0, false), 0.0);
    }

    #[test]
    fn positive_when_compressed() {
        let p = pressure(1410.0, 1400.0, 250.0, false);
        assert!((p - 2500.0).abs() < 1e-3, "p={p}");
    }

    #[test]
    fn tension_unless_clamped() {
        assert!(pressure(1390.0, 1400.0, 250.0, false) < 0.0);
        assert_eq!(pressure(1390.0, 1400.0, 250.0, true), 0.0);
    }

    #[test]
    fn linear_in_gas_constant() {
        let p1 = pressure(1500.0, 1400.0, 100.0, false);
        let p2 = pressure(1500.0, 1400.0, 200.0, false);
        assert!((p2 - 2.0 * p1).abs() < 1e-2);
    }
}
