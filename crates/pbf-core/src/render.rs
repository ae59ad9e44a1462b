//! Read-only export of particle state for an external renderer.

use glam::Vec3;

use crate::particle::{ParticleFlags, ParticleSet};

/// GPU-compatible particle record: 48 bytes, position and velocity each
/// padded to a 16-byte row.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderParticle {
    pub position: [f32; 3], // 12 bytes
    pub density: f32,       //  4 bytes
    pub velocity: [f32; 3], // 12 bytes
    pub flags: u32,         //  4 bytes
    pub particle_id: u32,   //  4 bytes
    pub source_id: u32,     //  4 bytes
    pub _pad: [u32; 2],     //  8 bytes
}

/// Borrowed view over the live particles.
#[derive(Clone, Copy)]
pub struct ParticleView<'a> {
    particles: &'a ParticleSet,
}

impl<'a> ParticleView<'a> {
    pub(crate) fn new(particles: &'a ParticleSet) -> Self {
        Self { particles }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn positions(&self) -> &'a [Vec3] {
        &self.particles.position
    }

    pub fn velocities(&self) -> &'a [Vec3] {
        &self.particles.velocity
    }

    pub fn densities(&self) -> &'a [f32] {
        &self.particles.density
    }

    pub fn flags(&self) -> &'a [ParticleFlags] {
        &self.particles.flags
    }

    pub fn particle_ids(&self) -> &'a [u32] {
        &self.particles.particle_id
    }

    pub fn source_ids(&self) -> &'a [u32] {
        &self.particles.source_id
    }

    pub fn neighbor_counts(&self) -> &'a [u32] {
        &self.particles.neighbor_count
    }

    /// Replace `out` with one record per particle.
    pub fn write_into(&self, out: &mut Vec<RenderParticle>) {
        let p = self.particles;
        out.clear();
        out.extend((0..p.len()).map(|i| RenderParticle {
            position: p.position[i].to_array(),
            density: p.density[i],
            velocity: p.velocity[i].to_array(),
            flags: p.flags[i].0,
            particle_id: p.particle_id[i],
            source_id: p.source_id[i],
            _pad: [0; 2],
        }));
    }
}
