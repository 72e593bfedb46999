//! Derived scalars sampled periodically for the diagnostics time series.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::particle::FluidParticle;

/// One row of the diagnostics time series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSample {
    /// Simulated time (seconds).
    pub sim_time: f64,
    /// Mean particle speed.
    pub mean_speed: f32,
    /// Largest path length travelled by any particle.
    pub max_distance_travelled: f32,
}

impl DiagnosticSample {
    /// Reduce the particle state to a sample, in parallel.
    pub fn measure(sim_time: f64, particles: &[FluidParticle]) -> Self {
        if particles.is_empty() {
            return Self { sim_time, ..Self::default() };
        }
        let (speed_sum, max_travelled) = particles
            .par_iter()
            .map(|p| (f64::from(p.speed()), p.travelled))
            .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1.max(b.1)));
        Self {
            sim_time,
            mean_speed: (speed_sum / particles.len() as f64) as f32,
            max_distance_travelled: max_travelled,
        }
    }
}
