use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{CollisionPrimitive, Contact, DistanceField};
use crate::feedback::{CollisionFeedbackEntry, FeedbackFrame};
use crate::particle::{ParticleFlags, ParticleSet};

/// Per-step inputs shared by both collision paths.
#[derive(Clone, Copy, Debug)]
pub struct CollisionParams {
    /// Surface offset particles are pushed out to.
    pub margin: f32,
    /// Scales each primitive's friction.
    pub friction: f32,
    /// Scales each primitive's restitution.
    pub restitution: f32,
    pub particle_mass: f32,
    pub dt: f32,
}

struct Hit {
    collider: u32,
    push: Vec3,
}

struct Outcome {
    position: Vec3,
    contact: Option<Contact>,
    hits: Vec<Hit>,
}

/// Push particles out of the baked field. Contacts recorded here carry no
/// collider and produce no feedback.
pub fn resolve_distance_field(
    particles: &mut ParticleSet,
    field: &DistanceField,
    params: &CollisionParams,
) -> usize {
    let predicted = &particles.predicted;
    let resolve = |i: usize| -> Option<(Vec3, Contact)> {
        let p = predicted[i];
        let s = field.sample(p)?;
        if s.distance >= params.margin {
            return None;
        }
        let resolved = p + s.gradient * (params.margin - s.distance);
        Some((
            resolved,
            Contact {
                collider: None,
                normal: s.gradient,
                friction: params.friction,
                restitution: params.restitution,
            },
        ))
    };

    #[cfg(feature = "parallel")]
    let outcomes: Vec<Option<(Vec3, Contact)>> =
        (0..particles.len()).into_par_iter().map(resolve).collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<Option<(Vec3, Contact)>> = (0..particles.len()).map(resolve).collect();

    let mut resolved = 0;
    for (i, outcome) in outcomes.into_iter().enumerate() {
        if let Some((position, contact)) = outcome {
            particles.predicted[i] = position;
            particles.contact[i] = Some(contact);
            particles.flags[i].insert(ParticleFlags::COLLIDED);
            resolved += 1;
        }
    }
    resolved
}

/// Resolve every particle against the analytic primitives, in list order.
///
/// A particle that penetrates several primitives is pushed out of each in
/// turn; the last one it touched supplies the contact used by the velocity
/// response. When `feedback` is given, one entry per resolved
/// particle/primitive pair is recorded after resolution, so recording never
/// changes the outcome.
pub fn resolve_primitives(
    particles: &mut ParticleSet,
    primitives: &[CollisionPrimitive],
    params: &CollisionParams,
    feedback: Option<&mut FeedbackFrame>,
) -> usize {
    if primitives.is_empty() || particles.is_empty() {
        return 0;
    }
    let predicted = &particles.predicted;
    let margin = params.margin;

    let resolve = |i: usize| -> Option<Outcome> {
        let mut p = predicted[i];
        let mut contact = None;
        let mut hits = Vec::new();
        for (k, prim) in primitives.iter().enumerate() {
            // Broad phase against the bounding sphere.
            let reach = prim.bounding_radius() + margin;
            if (p - prim.center()).length_squared() > reach * reach {
                continue;
            }
            let s = prim.signed_distance(p);
            if s.distance >= margin {
                continue;
            }
            let push = s.gradient * (margin - s.distance);
            p += push;
            contact = Some(Contact {
                collider: Some(k as u32),
                normal: s.gradient,
                friction: prim.friction * params.friction,
                restitution: prim.restitution * params.restitution,
            });
            hits.push(Hit {
                collider: k as u32,
                push,
            });
        }
        contact.map(|contact| Outcome {
            position: p,
            contact: Some(contact),
            hits,
        })
    };

    #[cfg(feature = "parallel")]
    let outcomes: Vec<Option<Outcome>> =
        (0..particles.len()).into_par_iter().map(resolve).collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<Option<Outcome>> = (0..particles.len()).map(resolve).collect();

    let force_scale = if params.dt > 0.0 {
        params.particle_mass / (params.dt * params.dt)
    } else {
        0.0
    };
    let inv_dt = if params.dt > 0.0 { 1.0 / params.dt } else { 0.0 };

    let mut feedback = feedback;
    let mut resolved = 0;
    for (i, outcome) in outcomes.into_iter().enumerate() {
        let Some(outcome) = outcome else {
            continue;
        };
        particles.predicted[i] = outcome.position;
        particles.contact[i] = outcome.contact;
        particles.flags[i].insert(ParticleFlags::COLLIDED);
        resolved += 1;

        if let Some(frame) = feedback.as_deref_mut() {
            let velocity = (outcome.position - particles.position[i]) * inv_dt;
            for hit in &outcome.hits {
                frame.record(CollisionFeedbackEntry {
                    position: outcome.position,
                    velocity,
                    force: hit.push * force_scale,
                    collider: hit.collider,
                });
            }
        }
    }
    resolved
}
