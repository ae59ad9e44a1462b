use glam::{UVec3, Vec3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::primitives::{CollisionPrimitive, SdfSample};

/// Signed distance baked onto a regular grid of sample points.
///
/// Values live at `origin + (x, y, z) * voxel_size`, x fastest. Lookups
/// outside the sampled box return `None`.
#[derive(Clone, Debug)]
pub struct DistanceField {
    origin: Vec3,
    voxel_size: f32,
    dims: UVec3,
    values: Vec<f32>,
}

impl DistanceField {
    /// Wrap pre-baked values. `None` when the value count does not match
    /// `dims`, or any dimension is below 2.
    pub fn from_values(origin: Vec3, voxel_size: f32, dims: UVec3, values: Vec<f32>) -> Option<Self> {
        let expected = dims.x as usize * dims.y as usize * dims.z as usize;
        if dims.min_element() < 2 || values.len() != expected || !(voxel_size > 0.0) {
            return None;
        }
        Some(Self {
            origin,
            voxel_size,
            dims,
            values,
        })
    }

    /// Sample `f` over the box `[min, max]` every `voxel_size`.
    pub fn bake<F>(min: Vec3, max: Vec3, voxel_size: f32, f: F) -> Option<Self>
    where
        F: Fn(Vec3) -> f32 + Sync,
    {
        if !(voxel_size > 0.0) || !min.is_finite() || !max.is_finite() {
            return None;
        }
        let lo = min.min(max);
        let extent = max.max(min) - lo;
        let dims = ((extent / voxel_size).ceil().as_uvec3() + UVec3::ONE).max(UVec3::splat(2));
        let (nx, ny) = (dims.x as usize, dims.y as usize);
        let total = nx * ny * dims.z as usize;

        let sample = |idx: usize| {
            let x = idx % nx;
            let y = (idx / nx) % ny;
            let z = idx / (nx * ny);
            f(lo + Vec3::new(x as f32, y as f32, z as f32) * voxel_size)
        };

        #[cfg(feature = "parallel")]
        let values: Vec<f32> = (0..total).into_par_iter().map(sample).collect();
        #[cfg(not(feature = "parallel"))]
        let values: Vec<f32> = (0..total).map(sample).collect();

        Self::from_values(lo, voxel_size, dims, values)
    }

    /// Union of the primitives' signed distances.
    pub fn bake_primitives(
        primitives: &[CollisionPrimitive],
        min: Vec3,
        max: Vec3,
        voxel_size: f32,
    ) -> Option<Self> {
        Self::bake(min, max, voxel_size, |p| {
            primitives
                .iter()
                .map(|prim| prim.signed_distance(p).distance)
                .fold(f32::INFINITY, f32::min)
        })
    }

    #[inline]
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    #[inline]
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        let max = self.origin + (self.dims - UVec3::ONE).as_vec3() * self.voxel_size;
        (self.origin, max)
    }

    #[inline]
    fn value(&self, x: u32, y: u32, z: u32) -> f32 {
        let idx = x as usize
            + self.dims.x as usize * (y as usize + self.dims.y as usize * z as usize);
        self.values[idx]
    }

    /// Trilinear distance at `p`, `None` outside the sampled box.
    pub fn distance(&self, p: Vec3) -> Option<f32> {
        let g = (p - self.origin) / self.voxel_size;
        let last = (self.dims - UVec3::ONE).as_vec3();
        if !g.is_finite() || g.cmplt(Vec3::ZERO).any() || g.cmpgt(last).any() {
            return None;
        }
        let base = g.floor().min(last - Vec3::ONE);
        let t = g - base;
        let b = base.as_uvec3();

        let c000 = self.value(b.x, b.y, b.z);
        let c100 = self.value(b.x + 1, b.y, b.z);
        let c010 = self.value(b.x, b.y + 1, b.z);
        let c110 = self.value(b.x + 1, b.y + 1, b.z);
        let c001 = self.value(b.x, b.y, b.z + 1);
        let c101 = self.value(b.x + 1, b.y, b.z + 1);
        let c011 = self.value(b.x, b.y + 1, b.z + 1);
        let c111 = self.value(b.x + 1, b.y + 1, b.z + 1);

        let c00 = c000 + (c100 - c000) * t.x;
        let c10 = c010 + (c110 - c010) * t.x;
        let c01 = c001 + (c101 - c001) * t.x;
        let c11 = c011 + (c111 - c011) * t.x;
        let c0 = c00 + (c10 - c00) * t.y;
        let c1 = c01 + (c11 - c01) * t.y;
        Some(c0 + (c1 - c0) * t.z)
    }

    /// Distance plus a central-difference gradient. Difference taps that
    /// leave the box are clamped back inside it.
    pub fn sample(&self, p: Vec3) -> Option<SdfSample> {
        let d = self.distance(p)?;
        let (lo, hi) = self.bounds();
        let e = self.voxel_size * 0.5;
        let tap = |offset: Vec3| self.distance((p + offset).clamp(lo, hi)).unwrap_or(d);
        let grad = Vec3::new(
            tap(Vec3::X * e) - tap(-Vec3::X * e),
            tap(Vec3::Y * e) - tap(-Vec3::Y * e),
            tap(Vec3::Z * e) - tap(-Vec3::Z * e),
        );
        Some(SdfSample::new(d, grad.try_normalize().unwrap_or(Vec3::Y)))
    }
}
