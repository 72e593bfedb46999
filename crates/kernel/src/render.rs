//! Per-instance render records for an external instanced renderer.
//!
//! The solver only writes these records; how they are drawn is not its
//! concern. Fluid particles occupy entries `[0, N)` and wall particles
//! `[N, N + W)`.

use bytemuck::Zeroable;
use serde::{Deserialize, Serialize};

use crate::particle::FluidParticle;

/// Colour used for fluid particles when density colouring is off.
pub const TAILINGS_COLOR: [f32; 4] = [0.55, 0.42, 0.28, 1.0];

/// Colour of wall particles.
pub const WALL_COLOR: [f32; 4] = [0.3, 0.3, 0.3, 1.0];

/// One instance record, laid out for direct upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshProperties {
    /// Column-major 4x4 transform (uniform scale, then translation).
    pub transform: [f32; 16],
    /// RGBA colour.
    pub color: [f32; 4],
    /// Non-zero when the instance should be drawn.
    pub visible: u32,
    /// Padding to a 16-byte multiple.
    pub _pad: [u32; 3],
}

impl MeshProperties {
    /// Record for an instance at `position` drawn with `scale` and `color`.
    pub fn new(position: [f32; 3], scale: f32, color: [f32; 4], visible: bool) -> Self {
        let [x, y, z] = position;
        #[rustfmt::skip]
        let transform = [
            scale, 0.0, 0.0, 0.0,
            0.0, scale, 0.0, 0.0,
            0.0, 0.0, scale, 0.0,
            x, y, z, 1.0,
        ];
        Self {
            transform,
            color,
            visible: u32::from(visible),
            _pad: [0; 3],
        }
    }

    /// Translation part of the transform.
    pub fn position(&self) -> [f32; 3] {
        [self.transform[12], self.transform[13], self.transform[14]]
    }
}

/// Write-only destination for render records.
pub trait RenderSink {
    /// Overwrite records starting at `offset`.
    fn write(&mut self, offset: usize, records: &[MeshProperties]);
}

/// In-memory render buffer; grows on demand.
#[derive(Debug, Clone, Default)]
pub struct RenderPropertyBuffer {
    records: Vec<MeshProperties>,
}

impl RenderPropertyBuffer {
    /// Buffer pre-sized for `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    /// Records written so far.
    pub fn records(&self) -> &[MeshProperties] {
        &self.records
    }

    /// Raw bytes, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.records)
    }
}

impl RenderSink for RenderPropertyBuffer {
    fn write(&mut self, offset: usize, records: &[MeshProperties]) {
        let end = offset + records.len();
        if self.records.len() < end {
            self.records.resize(end, MeshProperties::zeroed());
        }
        self.records[offset..end].copy_from_slice(records);
    }
}

/// How particles are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Instance scale.
    pub particle_radius: f32,
    /// Colour fluid particles by density.
    pub color_density: bool,
    /// Density mapped to blue.
    pub low_value: f32,
    /// Density mapped to red.
    pub high_value: f32,
    /// Draw wall particles.
    pub render_wall_particles: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            particle_radius: 5.0,
            color_density: false,
            low_value: 1000.0,
            high_value: 2000.0,
            render_wall_particles: false,
        }
    }
}

impl RenderSettings {
    /// Blue-to-red ramp over `[low_value, high_value]`.
    pub fn density_color(&self, density: f32) -> [f32; 4] {
        let span = self.high_value - self.low_value;
        let t = if span.abs() > f32::EPSILON {
            ((density - self.low_value) / span).clamp(0.0, 1.0)
        } else if density >= self.high_value {
            1.0
        } else {
            0.0
        };
        let t = if t.is_nan() { 0.0 } else { t };
        [t, 0.0, 1.0 - t, 1.0]
    }

    /// Records for the fluid particles.
    pub fn fluid_records(&self, particles: &[FluidParticle], densities: &[f32]) -> Vec<MeshProperties> {
        particles
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let color = if self.color_density {
                    self.density_color(densities.get(i).copied().unwrap_or(0.0))
                } else {
                    TAILINGS_COLOR
                };
                MeshProperties::new(p.position, self.particle_radius, color, true)
            })
            .collect()
    }

    /// Records for the wall particles.
    pub fn wall_records(&self, walls: &[[f32; 3]]) -> Vec<MeshProperties> {
        walls
            .iter()
            .map(|&p| MeshProperties::new(p, self.particle_radius, WALL_COLOR, self.render_wall_particles))
            .collect()
    }
}
