//! Particle records and the double-buffered particle state.
//!
//! Fluid particles are stored as fixed-size arrays of plain records so a
//! sub-step can write one record per particle into the *next* buffer while
//! every reader sees the *current* one. Wall particles are positions only;
//! they never move after seeding.

/// Kinematic state of one fluid particle.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FluidParticle {
    /// World position.
    pub position: [f32; 3],
    /// Path length travelled since seeding (world units).
    pub travelled: f32,
    /// Velocity (world units per second).
    pub velocity: [f32; 3],
    /// Padding to a 32-byte record.
    pub _pad: f32,
}

impl FluidParticle {
    /// A particle at rest at `position`.
    pub fn at_rest(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Speed (velocity magnitude).
    #[inline]
    pub fn speed(&self) -> f32 {
        let [vx, vy, vz] = self.velocity;
        (vx * vx + vy * vy + vz * vz).sqrt()
    }
}

/// Two same-shaped buffers with an explicit "current" index.
///
/// Readers borrow [`PingPong::current`]; a phase writes through the second
/// half of [`PingPong::split`] and then calls [`PingPong::swap`]. The
/// generation counter counts completed swaps.
#[derive(Debug, Clone)]
pub struct PingPong<T> {
    buffers: [Vec<T>; 2],
    current: usize,
    generation: u64,
}

impl<T: Clone> PingPong<T> {
    /// Both buffers start as copies of `initial`.
    pub fn new(initial: Vec<T>) -> Self {
        Self {
            buffers: [initial.clone(), initial],
            current: 0,
            generation: 0,
        }
    }
}

impl<T> PingPong<T> {
    /// The buffer every reader of the current phase sees.
    pub fn current(&self) -> &[T] {
        &self.buffers[self.current]
    }

    /// `(read, write)`: the current buffer and the other one.
    pub fn split(&mut self) -> (&[T], &mut [T]) {
        let (first, second) = self.buffers.split_at_mut(1);
        if self.current == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    /// Make the written buffer current.
    pub fn swap(&mut self) {
        self.current ^= 1;
        self.generation += 1;
    }

    /// Number of completed swaps.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Records per buffer.
    pub fn len(&self) -> usize {
        self.buffers[0].len()
    }

    /// Whether the buffers are empty.
    pub fn is_empty(&self) -> bool {
        self.buffers[0].is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_32_bytes_and_castable() {
        assert_eq!(std::mem::size_of::<FluidParticle>(), 32);
        let p = [FluidParticle::at_rest([1.0, 2.0, 3.0])];
        let floats: &[f32] = bytemuck::cast_slice(&p);
        assert_eq!(&floats[..3], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn speed_is_velocity_magnitude() {
        let mut p = FluidParticle::at_rest([0.0; 3]);
        p.velocity = [3.0, 0.0, 4.0];
        assert!((p.speed() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn split_writes_land_in_the_other_buffer() {
        let mut pp = PingPong::new(vec![0u32; 4]);
        {
            let (read, write) = pp.split();
            assert_eq!(read, &[0, 0, 0, 0]);
            write.copy_from_slice(&[1, 2, 3, 4]);
        }
        // Not visible until swapped
        assert_eq!(pp.current(), &[0, 0, 0, 0]);
        pp.swap();
        assert_eq!(pp.current(), &[1, 2, 3, 4]);
        assert_eq!(pp.generation(), 1);
    }

    #[test]
    fn second_swap_returns_to_first_buffer() {
        let mut pp = PingPong::new(vec![10u32]);
        pp.split().1[0] = 11;
        pp.swap();
        let (read, write) = pp.split();
        assert_eq!(read, &[11]);
        write[0] = read[0] + 1;
        pp.swap();
        assert_eq!(pp.current(), &[12]);
        assert_eq!(pp.generation(), 2);
        assert_eq!(pp.len(), 1);
    }
}
