//! Data-parallel dispatch.
//!
//! Every solver phase is one parallel-for over particle or voxel indices.
//! Work is split into groups of at least [`GROUP_SIZE`] indices; a dispatch
//! returns only when every index has run, which is the barrier between
//! phases.

use rayon::prelude::*;

/// Minimum number of indices handed to one worker at a time.
pub const GROUP_SIZE: usize = 32;

/// Run `kernel(i, &mut out[i])` for every index of `out` in parallel.
///
/// Each invocation owns exactly one output slot, so writes never conflict;
/// anything the kernel reads must come from a different buffer.
pub fn dispatch<T, F>(out: &mut [T], kernel: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    out.par_iter_mut()
        .with_min_len(GROUP_SIZE)
        .enumerate()
        .for_each(|(i, slot)| kernel(i, slot));
}

/// Run `kernel(i)` for every index in `0..count` in parallel.
///
/// Used by phases whose writes go through atomics (bucket insertion, flow
/// accumulation) rather than one owned slot per index.
pub fn dispatch_indices<F>(count: usize, kernel: F)
where
    F: Fn(usize) + Sync + Send,
{
    (0..count)
        .into_par_iter()
        .with_min_len(GROUP_SIZE)
        .for_each(kernel);
}
