//! Flow-extent accumulation: the highest particle elevation seen over each
//! terrain cell during the run.
//!
//! Cells hold `f32` bit patterns in `AtomicU32`s and are updated with a
//! compare-and-swap max, so any number of particles may record into the
//! field concurrently and the final field does not depend on order.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::bounds::SimulationBounds;
use crate::dispatch::dispatch_indices;
use crate::particle::FluidParticle;

/// Bit pattern marking a cell no particle has visited (a NaN).
const EMPTY: u32 = u32::MAX;

/// Square grid of maximum observed particle heights, aligned with the
/// terrain footprint.
pub struct FlowAccumulator {
    resolution: usize,
    cells: Vec<AtomicU32>,
}

impl FlowAccumulator {
    /// An empty field of `resolution x resolution` cells.
    pub fn new(resolution: usize) -> Self {
        let resolution = resolution.max(1);
        Self {
            resolution,
            cells: (0..resolution * resolution).map(|_| AtomicU32::new(EMPTY)).collect(),
        }
    }

    /// Cells per side.
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Cell index of a world planar position; positions outside the
    /// footprint clamp to the edge cells.
    #[inline]
    pub fn cell_of(&self, bounds: &SimulationBounds, x: f32, z: f32) -> usize {
        let (u, v) = bounds.uv(x, z);
        let last = self.resolution - 1;
        let to_index = |t: f32| {
            let f = (t * self.resolution as f32).floor();
            if f > 0.0 {
                (f as usize).min(last)
            } else {
                0
            }
        };
        to_index(v) * self.resolution + to_index(u)
    }

    /// Raise `cell` to at least `height`. NaN heights are ignored.
    #[inline]
    pub fn record(&self, cell: usize, height: f32) {
        if height.is_nan() {
            return;
        }
        let Some(slot) = self.cells.get(cell) else {
            return;
        };
        let mut current = slot.load(Ordering::Relaxed);
        loop {
            if current != EMPTY && f32::from_bits(current) >= height {
                return;
            }
            match slot.compare_exchange_weak(current, height.to_bits(), Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Record the current height of every particle, in parallel.
    pub fn accumulate(&self, bounds: &SimulationBounds, particles: &[FluidParticle]) {
        dispatch_indices(particles.len(), |i| {
            let [x, y, z] = particles[i].position;
            self.record(self.cell_of(bounds, x, z), y);
        });
    }

    /// Current field, row-major; `None` for cells never visited.
    pub fn snapshot(&self) -> Vec<Option<f32>> {
        self.cells
            .iter()
            .map(|c| match c.load(Ordering::Relaxed) {
                EMPTY => None,
                bits => Some(f32::from_bits(bits)),
            })
            .collect()
    }
}
