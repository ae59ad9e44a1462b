//! Soft binding of fluid particles to animated boundary surfaces.
//!
//! An attached particle follows its boundary particle: each step its
//! predicted position is pulled toward `anchor + local_offset`, and the
//! offset left over after the pull becomes the drift carried into the next
//! step. The pass runs after collision and its result is not resolved
//! against the colliders again.

use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::boundary::BoundaryParticle;
use crate::grid::NeighborSearch;
use crate::particle::{ParticleFlags, ParticleSet};

/// Binding of one particle to a boundary particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attachment {
    /// Boundary particle index, -1 when unattached.
    pub target: i32,
    pub normal: Vec3,
    /// Boundary particle position seen last step.
    pub last_position: Vec3,
    pub local_offset: Vec3,
}

impl Attachment {
    pub const DETACHED: Self = Self {
        target: -1,
        normal: Vec3::ZERO,
        last_position: Vec3::ZERO,
        local_offset: Vec3::ZERO,
    };

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.target >= 0
    }
}

impl Default for Attachment {
    fn default() -> Self {
        Self::DETACHED
    }
}

/// Distances in world units, already scaled by the smoothing radius.
#[derive(Clone, Copy, Debug)]
pub struct AttachmentParams {
    pub attach_radius: f32,
    pub detach_jump: f32,
    pub max_drift: f32,
    /// Fraction of the way toward the anchor per step.
    pub stickiness: f32,
}

impl AttachmentParams {
    pub fn from_config(config: &crate::config::FluidConfig) -> Self {
        let h = config.smoothing_radius;
        Self {
            attach_radius: config.attach_radius_factor.max(0.0) * h,
            detach_jump: config.detach_jump_factor.max(0.0) * h,
            max_drift: config.max_drift_factor.max(0.0) * h,
            stickiness: config.stickiness,
        }
    }
}

/// Release every binding, e.g. after the boundary set was regenerated and
/// old indices no longer mean anything.
pub fn detach_all(particles: &mut ParticleSet) {
    for (a, flags) in particles.attachment.iter_mut().zip(&mut particles.flags) {
        *a = Attachment::DETACHED;
        flags.remove(ParticleFlags::ATTACHED);
    }
}

/// Attach, follow or detach every particle against the current boundary
/// set. `index` must be built over `boundary` positions.
pub fn update_attachments<S: NeighborSearch + Sync>(
    particles: &mut ParticleSet,
    boundary: &[BoundaryParticle],
    index: &S,
    params: &AttachmentParams,
) {
    if particles.is_empty() {
        return;
    }
    let predicted = &particles.predicted;
    let attachment = &particles.attachment;

    let step = |i: usize| -> (Vec3, Attachment) {
        let p = predicted[i];
        let a = attachment[i];
        if a.is_attached() {
            follow(p, a, boundary, params)
        } else {
            (p, try_attach(p, boundary, index, params))
        }
    };

    #[cfg(feature = "parallel")]
    let results: Vec<(Vec3, Attachment)> = (0..particles.len()).into_par_iter().map(step).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<(Vec3, Attachment)> = (0..particles.len()).map(step).collect();

    for (i, (position, a)) in results.into_iter().enumerate() {
        particles.predicted[i] = position;
        particles.attachment[i] = a;
        particles.flags[i].set(ParticleFlags::ATTACHED, a.is_attached());
    }
}

fn follow(
    p: Vec3,
    a: Attachment,
    boundary: &[BoundaryParticle],
    params: &AttachmentParams,
) -> (Vec3, Attachment) {
    let Some(b) = boundary.get(a.target as usize) else {
        return (p, Attachment::DETACHED);
    };
    // A jump this large means the surface mapping is no longer trustworthy.
    if (b.position - a.last_position).length() > params.detach_jump {
        return (p, Attachment::DETACHED);
    }
    let goal = b.position + a.local_offset;
    let pulled = p.lerp(goal, params.stickiness);
    let offset = pulled - b.position;
    if offset.length() > params.max_drift {
        return (p, Attachment::DETACHED);
    }
    (
        pulled,
        Attachment {
            target: a.target,
            normal: b.normal,
            last_position: b.position,
            local_offset: offset,
        },
    )
}

fn try_attach<S: NeighborSearch>(
    p: Vec3,
    boundary: &[BoundaryParticle],
    index: &S,
    params: &AttachmentParams,
) -> Attachment {
    if params.attach_radius <= 0.0 {
        return Attachment::DETACHED;
    }
    let mut best: Option<(u32, f32)> = None;
    index.for_each_neighbor(p, params.attach_radius, |k| {
        let Some(b) = boundary.get(k as usize) else {
            return;
        };
        let d2 = (b.position - p).length_squared();
        // Ties go to the lower index so the result is order independent.
        let closer = match best {
            None => true,
            Some((bk, bd)) => d2 < bd || (d2 == bd && k < bk),
        };
        if closer {
            best = Some((k, d2));
        }
    });
    match best {
        Some((k, _)) => {
            let b = &boundary[k as usize];
            Attachment {
                target: k as i32,
                normal: b.normal,
                last_position: b.position,
                local_offset: p - b.position,
            }
        }
        None => Attachment::DETACHED,
    }
}
