//! Collision against scene geometry.
//!
//! Two resolution paths run on predicted positions after the density solve:
//! a coarse baked [`DistanceField`] for static environment shape, then the
//! analytic [`CollisionPrimitive`] list. Primitives run last, so when both
//! touch the same particle the primitive result stands.

pub mod distance_field;
pub mod primitives;
pub mod resolve;

use glam::Vec3;

pub use distance_field::DistanceField;
pub use primitives::{CollisionPrimitive, Plane, Pose, PrimitiveShape, SdfSample, ShapeKind};
pub use resolve::{resolve_distance_field, resolve_primitives, CollisionParams};

/// Surface contact a particle picked up this step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// Primitive index in the frame's list; `None` for the distance field.
    pub collider: Option<u32>,
    /// Outward surface normal.
    pub normal: Vec3,
    pub friction: f32,
    pub restitution: f32,
}

impl Contact {
    /// Reflect the normal velocity component by restitution and scale the
    /// tangential one by `1 - friction`. Separating velocities are kept.
    pub fn respond(&self, velocity: Vec3) -> Vec3 {
        let vn = velocity.dot(self.normal);
        if vn >= 0.0 {
            return velocity;
        }
        let normal_part = self.normal * vn;
        let tangent = velocity - normal_part;
        tangent * (1.0 - self.friction) - normal_part * self.restitution
    }
}
