//! Analytic collision primitives.
//!
//! Each primitive stores its geometry in a local frame (capsule axis along
//! +Y, box axis-aligned, convex planes relative to the bounding centre) plus
//! a world [`Pose`]. Queries transform the point into the local frame,
//! evaluate the signed distance there and rotate the gradient back out.

use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3};

use crate::math::{any_perpendicular, Fingerprint, DEGENERATE_LENGTH};

/// Rigid transform (no scale).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation: rotation.normalize(),
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quat::IDENTITY)
    }

    /// Rigid part of an affine transform; scale is discarded.
    pub fn from_affine(transform: &Affine3A) -> Self {
        let (_, rotation, translation) = transform.to_scale_rotation_translation();
        if rotation.is_finite() && translation.is_finite() {
            Self::new(translation, rotation)
        } else {
            Self::IDENTITY
        }
    }

    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.translation
    }

    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.inverse() * (p - self.translation)
    }

    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation * v
    }

    /// `self` applied after `local`.
    pub fn compose(&self, local: &Pose) -> Pose {
        Pose::new(
            self.transform_point(local.translation),
            self.rotation * local.rotation,
        )
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Half-space `normal . p <= distance`; `normal` points outward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Normalizes `normal`; a zero normal becomes +Y.
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let len = normal.length();
        if len > DEGENERATE_LENGTH {
            Self {
                normal: normal / len,
                distance: distance / len,
            }
        } else {
            Self {
                normal: Vec3::Y,
                distance,
            }
        }
    }

    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.try_normalize().unwrap_or(Vec3::Y);
        Self {
            normal: n,
            distance: n.dot(point),
        }
    }

    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) - self.distance
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeKind {
    Sphere,
    Capsule,
    Box,
    Convex,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveShape {
    Sphere {
        radius: f32,
    },
    /// Segment from `-half_height` to `+half_height` on local Y.
    Capsule {
        half_height: f32,
        radius: f32,
    },
    Box {
        half_extents: Vec3,
    },
    /// Intersection of half-spaces, relative to the bounding-sphere centre.
    Convex {
        bounding_radius: f32,
        planes: Arc<[Plane]>,
    },
}

impl PrimitiveShape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            PrimitiveShape::Sphere { .. } => ShapeKind::Sphere,
            PrimitiveShape::Capsule { .. } => ShapeKind::Capsule,
            PrimitiveShape::Box { .. } => ShapeKind::Box,
            PrimitiveShape::Convex { .. } => ShapeKind::Convex,
        }
    }

    /// Radius of a local-origin sphere enclosing the shape.
    pub fn bounding_radius(&self) -> f32 {
        match self {
            PrimitiveShape::Sphere { radius } => *radius,
            PrimitiveShape::Capsule { half_height, radius } => half_height + radius,
            PrimitiveShape::Box { half_extents } => half_extents.length(),
            PrimitiveShape::Convex {
                bounding_radius, ..
            } => *bounding_radius,
        }
    }

    /// Signed distance in the local frame. A zero gradient marks the
    /// degenerate case the caller resolves in world space.
    fn local_sdf(&self, p: Vec3) -> SdfSample {
        match self {
            PrimitiveShape::Sphere { radius } => {
                let len = p.length();
                if len < DEGENERATE_LENGTH {
                    return SdfSample::new(-radius, Vec3::ZERO);
                }
                SdfSample::new(len - radius, p / len)
            }
            PrimitiveShape::Capsule { half_height, radius } => {
                let on_axis = Vec3::new(0.0, p.y.clamp(-half_height, *half_height), 0.0);
                let d = p - on_axis;
                let len = d.length();
                if len < DEGENERATE_LENGTH {
                    return SdfSample::new(-radius, Vec3::ZERO);
                }
                SdfSample::new(len - radius, d / len)
            }
            PrimitiveShape::Box { half_extents } => box_sdf(p, *half_extents),
            PrimitiveShape::Convex {
                bounding_radius,
                planes,
            } => {
                let mut best: Option<SdfSample> = None;
                for plane in planes.iter() {
                    let d = plane.signed_distance(p);
                    if best.map_or(true, |b| d > b.distance) {
                        best = Some(SdfSample::new(d, plane.normal));
                    }
                }
                // A convex without planes degrades to its bounding sphere.
                best.unwrap_or_else(|| {
                    PrimitiveShape::Sphere {
                        radius: *bounding_radius,
                    }
                    .local_sdf(p)
                })
            }
        }
    }

    fn write_fingerprint(&self, fp: &mut Fingerprint) {
        fp.write_u32(self.kind() as u32);
        match self {
            PrimitiveShape::Sphere { radius } => fp.write_f32(*radius),
            PrimitiveShape::Capsule { half_height, radius } => {
                fp.write_f32(*half_height);
                fp.write_f32(*radius);
            }
            PrimitiveShape::Box { half_extents } => fp.write_vec3(*half_extents),
            PrimitiveShape::Convex {
                bounding_radius,
                planes,
            } => {
                fp.write_f32(*bounding_radius);
                fp.write_u32(planes.len() as u32);
                for plane in planes.iter() {
                    fp.write_vec3(plane.normal);
                    fp.write_f32(plane.distance);
                }
            }
        }
    }
}

/// Axis-aligned box SDF in its own frame.
fn box_sdf(p: Vec3, half_extents: Vec3) -> SdfSample {
    let q = p.abs() - half_extents;
    let excess = q.max(Vec3::ZERO);
    let outside = excess.length();
    if outside > 0.0 {
        let dir = excess * sign_or_positive(p);
        return SdfSample::new(outside, dir / outside);
    }

    // Inside: the axis with the least penetration wins, first axis on ties.
    let mut axis = 0;
    for k in 1..3 {
        if q[k] > q[axis] {
            axis = k;
        }
    }
    let mut gradient = Vec3::ZERO;
    gradient[axis] = if p[axis] >= 0.0 { 1.0 } else { -1.0 };
    SdfSample::new(q[axis], gradient)
}

#[inline]
fn sign_or_positive(v: Vec3) -> Vec3 {
    Vec3::new(
        if v.x >= 0.0 { 1.0 } else { -1.0 },
        if v.y >= 0.0 { 1.0 } else { -1.0 },
        if v.z >= 0.0 { 1.0 } else { -1.0 },
    )
}

/// Signed distance and its gradient (outward unit normal direction).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SdfSample {
    pub distance: f32,
    pub gradient: Vec3,
}

impl SdfSample {
    #[inline]
    pub fn new(distance: f32, gradient: Vec3) -> Self {
        Self { distance, gradient }
    }
}

/// One collider from the host scene, copied for the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionPrimitive {
    pub shape: PrimitiveShape,
    pub pose: Pose,
    pub owner_id: u32,
    /// Bone of the owner's skeleton the pose is relative to.
    pub bone: Option<usize>,
    pub friction: f32,
    pub restitution: f32,
}

impl CollisionPrimitive {
    pub fn new(shape: PrimitiveShape, pose: Pose) -> Self {
        Self {
            shape,
            pose,
            owner_id: 0,
            bone: None,
            friction: 0.0,
            restitution: 0.0,
        }
    }

    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self::new(
            PrimitiveShape::Sphere {
                radius: radius.max(0.0),
            },
            Pose::from_translation(center),
        )
    }

    /// Capsule around the segment `a`-`b`.
    pub fn capsule(a: Vec3, b: Vec3, radius: f32) -> Self {
        let axis = b - a;
        let len = axis.length();
        let rotation = if len > DEGENERATE_LENGTH {
            Quat::from_rotation_arc(Vec3::Y, axis / len)
        } else {
            Quat::IDENTITY
        };
        Self::new(
            PrimitiveShape::Capsule {
                half_height: len * 0.5,
                radius: radius.max(0.0),
            },
            Pose::new((a + b) * 0.5, rotation),
        )
    }

    pub fn cuboid(center: Vec3, half_extents: Vec3, rotation: Quat) -> Self {
        Self::new(
            PrimitiveShape::Box {
                half_extents: half_extents.abs(),
            },
            Pose::new(center, rotation),
        )
    }

    /// Convex hull from world-space planes and its bounding sphere.
    pub fn convex(center: Vec3, bounding_radius: f32, planes: &[Plane]) -> Self {
        let local: Vec<Plane> = planes
            .iter()
            .map(|p| Plane::new(p.normal, p.distance - p.normal.dot(center)))
            .collect();
        Self::new(
            PrimitiveShape::Convex {
                bounding_radius: bounding_radius.max(0.0),
                planes: local.into(),
            },
            Pose::from_translation(center),
        )
    }

    pub fn with_owner(mut self, owner_id: u32) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn with_bone(mut self, bone: usize) -> Self {
        self.bone = Some(bone);
        self
    }

    pub fn with_material(mut self, friction: f32, restitution: f32) -> Self {
        self.friction = friction.clamp(0.0, 1.0);
        self.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    #[inline]
    pub fn kind(&self) -> ShapeKind {
        self.shape.kind()
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        self.pose.translation
    }

    #[inline]
    pub fn bounding_radius(&self) -> f32 {
        self.shape.bounding_radius()
    }

    /// Signed distance (negative inside) and outward gradient at world point `p`.
    pub fn signed_distance(&self, p: Vec3) -> SdfSample {
        let local = self.pose.inverse_transform_point(p);
        let s = self.shape.local_sdf(local);
        if s.gradient != Vec3::ZERO {
            return SdfSample::new(s.distance, self.pose.transform_vector(s.gradient));
        }
        let fallback = match self.shape {
            PrimitiveShape::Capsule { .. } => {
                any_perpendicular(self.pose.transform_vector(Vec3::Y))
            }
            _ => Vec3::Y,
        };
        SdfSample::new(s.distance, fallback)
    }

    /// Nearest point on the surface.
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        let s = self.signed_distance(p);
        p - s.gradient * s.distance
    }

    /// True when `p` is inside or on the surface.
    pub fn contains(&self, p: Vec3) -> bool {
        self.signed_distance(p).distance <= 0.0
    }

    /// Hash of the local geometry plus `extra` resolution values. The pose
    /// is excluded so moving a primitive keeps its fingerprint.
    pub fn fingerprint(&self, extra: &[f32]) -> u64 {
        let mut fp = Fingerprint::new();
        self.shape.write_fingerprint(&mut fp);
        for &v in extra {
            fp.write_f32(v);
        }
        fp.finish()
    }

    /// Copy with the pose placed under `parent`.
    pub fn posed(&self, parent: &Affine3A) -> CollisionPrimitive {
        let mut out = self.clone();
        out.pose = Pose::from_affine(parent).compose(&self.pose);
        out
    }
}
