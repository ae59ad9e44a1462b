//! Surface samplers for boundary particles.
//!
//! Each sampler works in the primitive's local frame and returns points with
//! outward unit normals, spaced roughly `spacing` apart over the surface.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::collision::{Plane, PrimitiveShape};
use crate::math::{tangent_basis, DEGENERATE_LENGTH};

/// Golden angle in radians.
const GOLDEN_ANGLE: f32 = 2.399_963;

/// Surface points are kept when they lie this close (relative to spacing)
/// inside every other face of a convex.
const CONVEX_TOLERANCE: f32 = 1.0e-3;

/// Upper bound on grid steps from a convex face centre in each direction.
pub const MAX_FACE_STEPS: i32 = 2048;

/// A sample in primitive-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub normal: Vec3,
}

/// Sample the surface of `shape` at roughly `spacing` intervals.
pub fn sample_surface(shape: &PrimitiveShape, spacing: f32) -> Vec<SurfacePoint> {
    let spacing = spacing.max(DEGENERATE_LENGTH);
    match shape {
        PrimitiveShape::Sphere { radius } => sample_sphere(*radius, spacing),
        PrimitiveShape::Capsule {
            half_height,
            radius,
        } => sample_capsule(*half_height, *radius, spacing),
        PrimitiveShape::Box { half_extents } => sample_box(*half_extents, spacing),
        PrimitiveShape::Convex {
            bounding_radius,
            planes,
        } => sample_convex(planes, *bounding_radius, spacing),
    }
}

/// Number of points [`sample_surface`] would return, computed without
/// sampling. Exact for spheres, capsules and boxes; an upper bound for
/// convex hulls, whose face grids are clipped. Saturates at `usize::MAX`.
pub fn estimate_samples(shape: &PrimitiveShape, spacing: f32) -> usize {
    let spacing = spacing.max(DEGENERATE_LENGTH);
    match shape {
        PrimitiveShape::Sphere { radius } => {
            if *radius <= DEGENERATE_LENGTH {
                1
            } else {
                lattice_count(*radius, spacing, 1)
            }
        }
        PrimitiveShape::Capsule {
            half_height,
            radius,
        } => {
            if *radius <= DEGENERATE_LENGTH {
                return ceil_count(2.0 * half_height / spacing, 1).saturating_add(1);
            }
            let rings = ceil_count(2.0 * half_height / spacing, 0);
            let per_ring = ceil_count(TAU * radius / spacing, 3);
            rings
                .saturating_sub(1)
                .saturating_mul(per_ring)
                .saturating_add(lattice_count(*radius, spacing, 2))
        }
        PrimitiveShape::Box { half_extents } => (0..3).fold(0usize, |total, axis| {
            let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
            let face = face_cells(half_extents[u], spacing).saturating_mul(face_cells(half_extents[v], spacing));
            total.saturating_add(face.saturating_mul(2))
        }),
        PrimitiveShape::Convex {
            bounding_radius,
            planes,
        } => {
            if planes.is_empty() {
                return estimate_samples(
                    &PrimitiveShape::Sphere {
                        radius: *bounding_radius,
                    },
                    spacing,
                );
            }
            let side = 2 * face_steps(*bounding_radius, spacing) as usize + 1;
            planes.len().saturating_mul(side * side)
        }
    }
}

/// `ceil(x)` as a count of at least `min`. Float to int casts saturate, so
/// huge or infinite `x` maps to `usize::MAX`.
#[inline]
fn ceil_count(x: f32, min: usize) -> usize {
    (x.ceil() as usize).max(min)
}

/// Fibonacci points covering a sphere of `radius` at `spacing`.
#[inline]
fn lattice_count(radius: f32, spacing: f32, min: usize) -> usize {
    let area = 4.0 * PI * radius * radius;
    ceil_count(area / (spacing * spacing), min)
}

#[inline]
fn face_cells(half_extent: f32, spacing: f32) -> usize {
    ceil_count(2.0 * half_extent / spacing, 1)
}

#[inline]
fn face_steps(bounding_radius: f32, spacing: f32) -> i32 {
    ((bounding_radius / spacing).ceil() as i32).clamp(1, MAX_FACE_STEPS)
}

/// Fibonacci lattice over the unit sphere, `n` points.
fn fibonacci_directions(n: usize) -> impl Iterator<Item = Vec3> {
    (0..n).map(move |i| {
        let y = 1.0 - 2.0 * (i as f32 + 0.5) / n as f32;
        let r = (1.0 - y * y).max(0.0).sqrt();
        let theta = GOLDEN_ANGLE * i as f32;
        Vec3::new(r * theta.cos(), y, r * theta.sin())
    })
}

fn sample_sphere(radius: f32, spacing: f32) -> Vec<SurfacePoint> {
    if radius <= DEGENERATE_LENGTH {
        return vec![SurfacePoint {
            position: Vec3::ZERO,
            normal: Vec3::Y,
        }];
    }
    fibonacci_directions(lattice_count(radius, spacing, 1))
        .map(|dir| SurfacePoint {
            position: dir * radius,
            normal: dir,
        })
        .collect()
}

/// Rings along the cylinder plus a split sphere lattice for the two caps.
fn sample_capsule(half_height: f32, radius: f32, spacing: f32) -> Vec<SurfacePoint> {
    if radius <= DEGENERATE_LENGTH {
        // Bare segment: points along the axis.
        let n = ceil_count(2.0 * half_height / spacing, 1);
        return (0..=n)
            .map(|i| SurfacePoint {
                position: Vec3::new(0.0, -half_height + 2.0 * half_height * i as f32 / n as f32, 0.0),
                normal: Vec3::X,
            })
            .collect();
    }

    let mut out = Vec::new();
    let rings = ceil_count(2.0 * half_height / spacing, 0);
    let per_ring = ceil_count(TAU * radius / spacing, 3);
    // Ring 0 and ring `rings` sit on the cap seams, which the caps cover.
    for ring in 1..rings {
        let y = -half_height + 2.0 * half_height * ring as f32 / rings as f32;
        // Stagger alternate rings by half a step.
        let phase = if ring % 2 == 0 { 0.0 } else { 0.5 };
        for k in 0..per_ring {
            let theta = TAU * (k as f32 + phase) / per_ring as f32;
            let normal = Vec3::new(theta.cos(), 0.0, theta.sin());
            out.push(SurfacePoint {
                position: normal * radius + Vec3::new(0.0, y, 0.0),
                normal,
            });
        }
    }

    for dir in fibonacci_directions(lattice_count(radius, spacing, 2)) {
        let offset = if dir.y >= 0.0 { half_height } else { -half_height };
        out.push(SurfacePoint {
            position: dir * radius + Vec3::new(0.0, offset, 0.0),
            normal: dir,
        });
    }
    out
}

/// Cell-centred grid on each of the six faces.
fn sample_box(half_extents: Vec3, spacing: f32) -> Vec<SurfacePoint> {
    let mut out = Vec::new();
    for axis in 0..3 {
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        let nu = face_cells(half_extents[u], spacing);
        let nv = face_cells(half_extents[v], spacing);
        for sign in [1.0f32, -1.0] {
            let mut normal = Vec3::ZERO;
            normal[axis] = sign;
            for i in 0..nu {
                for j in 0..nv {
                    let mut p = Vec3::ZERO;
                    p[axis] = sign * half_extents[axis];
                    p[u] = -half_extents[u] + (i as f32 + 0.5) * 2.0 * half_extents[u] / nu as f32;
                    p[v] = -half_extents[v] + (j as f32 + 0.5) * 2.0 * half_extents[v] / nv as f32;
                    out.push(SurfacePoint { position: p, normal });
                }
            }
        }
    }
    out
}

/// Grid on each face plane, clipped by every other plane and the bounding sphere.
fn sample_convex(planes: &[Plane], bounding_radius: f32, spacing: f32) -> Vec<SurfacePoint> {
    if planes.is_empty() {
        return sample_sphere(bounding_radius, spacing);
    }
    let tolerance = CONVEX_TOLERANCE * spacing;
    let steps = face_steps(bounding_radius, spacing);
    let mut out = Vec::new();
    for (f, face) in planes.iter().enumerate() {
        let center = face.normal * face.distance;
        let (t1, t2) = tangent_basis(face.normal);
        for a in -steps..=steps {
            for b in -steps..=steps {
                let q = center + t1 * (a as f32 * spacing) + t2 * (b as f32 * spacing);
                if q.length() > bounding_radius + tolerance {
                    continue;
                }
                let inside_others = planes
                    .iter()
                    .enumerate()
                    .all(|(g, other)| g == f || other.signed_distance(q) <= tolerance);
                if inside_others {
                    out.push(SurfacePoint {
                        position: q,
                        normal: face.normal,
                    });
                }
            }
        }
    }
    out
}
