//! Uniform voxel grid ("bucket") for neighbor search.
//!
//! Every voxel owns a fixed block of `max_per_voxel` slots. Particles are
//! appended with an atomic counter per voxel; once a voxel is full, further
//! particles are dropped from it for the rest of the frame. There is no
//! spill list and no resize, so a crowded voxel silently loses neighbors.
//! The number of dropped entries is returned from every rebuild so the
//! caller can report it.
//!
//! Global particle indices: fluid particles occupy `0..fluid_count`, wall
//! particles `fluid_count..fluid_count + wall_count`. Empty slots hold the
//! total particle count, which is never a valid index.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::bounds::SimulationBounds;
use crate::dispatch::dispatch_indices;

/// Result of one bucket rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStats {
    /// Entries that found a free slot.
    pub inserted: u32,
    /// Entries dropped because their voxel was full.
    pub dropped: u32,
}

/// Uniform 3-D voxel grid with a bounded slot list per voxel.
pub struct BucketGrid {
    min: [f32; 3],
    cell: [f32; 3],
    resolution: [u32; 3],
    max_per_voxel: usize,
    /// `voxel_count * max_per_voxel` particle indices.
    slots: Vec<AtomicU32>,
    /// Append counter per voxel; may exceed `max_per_voxel`.
    counts: Vec<AtomicU32>,
    sentinel: u32,
}

impl BucketGrid {
    /// Create a grid covering `bounds` with `resolution` voxels per axis.
    pub fn new(bounds: &SimulationBounds, resolution: [u32; 3], max_per_voxel: usize) -> Self {
        let resolution = resolution.map(|r| r.max(1));
        let cell = [
            bounds.size[0] / resolution[0] as f32,
            bounds.size[1] / resolution[1] as f32,
            bounds.size[2] / resolution[2] as f32,
        ];
        let voxels = resolution.iter().map(|&r| r as usize).product::<usize>();
        Self {
            min: bounds.min,
            cell,
            resolution,
            max_per_voxel,
            slots: (0..voxels * max_per_voxel).map(|_| AtomicU32::new(0)).collect(),
            counts: (0..voxels).map(|_| AtomicU32::new(0)).collect(),
            sentinel: 0,
        }
    }

    /// Voxels per axis.
    pub fn resolution(&self) -> [u32; 3] {
        self.resolution
    }

    /// Total number of voxels.
    pub fn voxel_count(&self) -> usize {
        self.counts.len()
    }

    /// Slot capacity of each voxel.
    pub fn max_per_voxel(&self) -> usize {
        self.max_per_voxel
    }

    /// Voxel coordinates of a world position, clamped to the grid.
    #[inline]
    pub fn voxel_of(&self, p: [f32; 3]) -> [u32; 3] {
        let mut v = [0u32; 3];
        for a in 0..3 {
            let f = ((p[a] - self.min[a]) / self.cell[a]).floor();
            // NaN fails both comparisons and lands in voxel 0
            v[a] = if f > 0.0 {
                (f as u32).min(self.resolution[a] - 1)
            } else {
                0
            };
        }
        v
    }

    #[inline]
    fn flat(&self, v: [u32; 3]) -> usize {
        (v[0] + v[1] * self.resolution[0] + v[2] * self.resolution[0] * self.resolution[1]) as usize
    }

    /// Rebuild from scratch: clear every voxel, then insert all fluid
    /// positions followed by all wall positions.
    pub fn rebuild(&mut self, fluid: &[[f32; 3]], walls: &[[f32; 3]]) -> BucketStats {
        let total = (fluid.len() + walls.len()) as u32;
        self.sentinel = total;
        self.clear();

        let grid = &*self;
        let dropped = AtomicU32::new(0);
        let fluid_count = fluid.len();
        dispatch_indices(fluid_count + walls.len(), |i| {
            let p = if i < fluid_count { fluid[i] } else { walls[i - fluid_count] };
            if !grid.insert(i as u32, p) {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        });

        let dropped = dropped.into_inner();
        BucketStats {
            inserted: total - dropped,
            dropped,
        }
    }

    fn clear(&mut self) {
        let sentinel = self.sentinel;
        let slots = &self.slots;
        let counts = &self.counts;
        let per = self.max_per_voxel;
        dispatch_indices(counts.len(), |v| {
            counts[v].store(0, Ordering::Relaxed);
            for slot in &slots[v * per..(v + 1) * per] {
                slot.store(sentinel, Ordering::Relaxed);
            }
        });
    }

    /// Append `index` to the voxel containing `p`. Returns `false` when the
    /// voxel is already full and the entry was dropped.
    fn insert(&self, index: u32, p: [f32; 3]) -> bool {
        let v = self.flat(self.voxel_of(p));
        let slot = self.counts[v].fetch_add(1, Ordering::Relaxed) as usize;
        if slot >= self.max_per_voxel {
            return false;
        }
        self.slots[v * self.max_per_voxel + slot].store(index, Ordering::Relaxed);
        true
    }

    /// Particle indices stored in voxel `v` (in insertion order, which is
    /// unspecified under parallel rebuilds).
    pub fn voxel_contents(&self, v: [u32; 3]) -> impl Iterator<Item = u32> + '_ {
        let flat = self.flat(v);
        let stored = (self.counts[flat].load(Ordering::Relaxed) as usize).min(self.max_per_voxel);
        let sentinel = self.sentinel;
        self.slots[flat * self.max_per_voxel..flat * self.max_per_voxel + stored]
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .take_while(move |&j| j != sentinel)
    }

    /// Invoke `f(j)` for every indexed particle in the 3x3x3 block of voxels
    /// around `p`. No distance filtering is done here and `j` may be the
    /// querying particle itself.
    pub fn for_each_candidate<F>(&self, p: [f32; 3], mut f: F)
    where
        F: FnMut(usize),
    {
        let [cx, cy, cz] = self.voxel_of(p);
        let [rx, ry, rz] = self.resolution;
        for z in cz.saturating_sub(1)..=(cz + 1).min(rz - 1) {
            for y in cy.saturating_sub(1)..=(cy + 1).min(ry - 1) {
                for x in cx.saturating_sub(1)..=(cx + 1).min(rx - 1) {
                    for j in self.voxel_contents([x, y, z]) {
                        f(j as usize);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_bounds() -> SimulationBounds {
        SimulationBounds::from_min_size([0.0; 3], [1.0; 3]).unwrap()
    }

    fn candidates(grid: &BucketGrid, p: [f32; 3]) -> Vec<usize> {
        let mut out = Vec::new();
        grid.for_each_candidate(p, |j| out.push(j));
        out.sort_unstable();
        out
    }

    #[test]
    fn grid_dimensions() {
        let grid = BucketGrid::new(&unit_bounds(), [10, 10, 10], 16);
        assert_eq!(grid.voxel_count(), 1000);
        assert_eq!(grid.resolution(), [10, 10, 10]);
    }

    #[test]
    fn single_particle_sees_only_itself() {
        let mut grid = BucketGrid::new(&unit_bounds(), [5, 5, 5], 16);
        let stats = grid.rebuild(&[[0.5, 0.5, 0.5]], &[]);
        assert_eq!(stats, BucketStats { inserted: 1, dropped: 0 });
        assert_eq!(candidates(&grid, [0.5, 0.5, 0.5]), vec![0]);
    }

    #[test]
    fn adjacent_voxels_are_searched() {
        let mut grid = BucketGrid::new(&unit_bounds(), [5, 5, 5], 16);
        // 0.19 and 0.21 straddle the voxel boundary at 0.2
        grid.rebuild(&[[0.19, 0.5, 0.5], [0.21, 0.5, 0.5]], &[]);
        assert_eq!(candidates(&grid, [0.19, 0.5, 0.5]), vec![0, 1]);
    }

    #[test]
    fn distant_particles_are_not_candidates() {
        let mut grid = BucketGrid::new(&unit_bounds(), [5, 5, 5], 16);
        grid.rebuild(&[[0.1, 0.1, 0.1], [0.9, 0.9, 0.9]], &[]);
        assert_eq!(candidates(&grid, [0.1, 0.1, 0.1]), vec![0]);
    }

    #[test]
    fn wall_indices_are_offset_by_fluid_count() {
        let mut grid = BucketGrid::new(&unit_bounds(), [5, 5, 5], 16);
        grid.rebuild(&[[0.5, 0.5, 0.5], [0.52, 0.5, 0.5]], &[[0.5, 0.45, 0.5]]);
        assert_eq!(candidates(&grid, [0.5, 0.5, 0.5]), vec![0, 1, 2]);
    }

    #[test]
    fn positions_outside_bounds_clamp_to_edge_voxels() {
        let grid = BucketGrid::new(&unit_bounds(), [4, 4, 4], 16);
        assert_eq!(grid.voxel_of([-5.0, 0.5, 7.0]), [0, 2, 3]);
        assert_eq!(grid.voxel_of([f32::NAN, 1.0, 0.99]), [0, 3, 3]);
    }

    #[test]
    fn overflow_beyond_capacity_is_dropped() {
        let mut grid = BucketGrid::new(&unit_bounds(), [2, 2, 2], 4);
        let crowd: Vec<[f32; 3]> = (0..10).map(|i| [0.1 + i as f32 * 0.01, 0.1, 0.1]).collect();
        let stats = grid.rebuild(&crowd, &[]);
        assert_eq!(stats, BucketStats { inserted: 4, dropped: 6 });
        assert_eq!(grid.voxel_contents([0, 0, 0]).count(), 4);
    }

    #[test]
    fn rebuild_clears_previous_contents() {
        let mut grid = BucketGrid::new(&unit_bounds(), [2, 2, 2], 4);
        grid.rebuild(&[[0.1, 0.1, 0.1]], &[]);
        grid.rebuild(&[[0.9, 0.9, 0.9]], &[]);
        assert_eq!(grid.voxel_contents([0, 0, 0]).count(), 0);
        assert_eq!(grid.voxel_contents([1, 1, 1]).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn rebuild_is_idempotent_up_to_slot_order() {
        let positions: Vec<[f32; 3]> = (0..500)
            .map(|i| {
                let t = i as f32 * 0.618_034;
                [t.fract(), (t * 1.7).fract(), (t * 2.3).fract()]
            })
            .collect();
        let mut grid = BucketGrid::new(&unit_bounds(), [4, 4, 4], 16);

        let snapshot = |grid: &BucketGrid| -> Vec<Vec<u32>> {
            let [rx, ry, rz] = grid.resolution();
            let mut all = Vec::new();
            for z in 0..rz {
                for y in 0..ry {
                    for x in 0..rx {
                        let mut v: Vec<u32> = grid.voxel_contents([x, y, z]).collect();
                        v.sort_unstable();
                        all.push(v);
                    }
                }
            }
            all
        };

        let first_stats = grid.rebuild(&positions, &[]);
        let first = snapshot(&grid);
        let second_stats = grid.rebuild(&positions, &[]);
        let second = snapshot(&grid);
        assert_eq!(first_stats.inserted + first_stats.dropped, 500);
        assert_eq!(first_stats.dropped, second_stats.dropped);
        // Voxels that did not overflow hold identical sets
        for (a, b) in first.iter().zip(&second) {
            if a.len() < grid.max_per_voxel() {
                assert_eq!(a, b);
            } else {
                assert_eq!(a.len(), b.len());
            }
        }
    }
}
