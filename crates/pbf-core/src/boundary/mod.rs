//! Boundary particles: static ghost samples on collider surfaces that add
//! density near solid walls (Akinci et al. 2012).
//!
//! Samples are generated once per primitive configuration in the
//! primitive's local frame and cached under a [`PrimitiveKey`]. Each frame
//! the working set is re-posed with [`BoundaryGenerator::update_world`], so
//! a primitive that only moves never regenerates.

pub mod sampling;

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;

use crate::collision::{CollisionPrimitive, ShapeKind};
use crate::config::clamp_ratio;
use crate::fluids::Kernels;
use crate::grid::SpatialHashMap;

pub use sampling::{estimate_samples, sample_surface, SurfacePoint};

/// Samples kept across all cached primitives before the cache stops growing.
pub const DEFAULT_MAX_CACHED_SAMPLES: usize = 1 << 20;

/// Default sample spacing as a fraction of the smoothing radius.
pub const DEFAULT_SPACING_RATIO: f32 = 0.5;

/// Cache identity of a primitive's samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrimitiveKey {
    pub kind: ShapeKind,
    pub owner_id: u32,
    /// Local geometry plus spacing, smoothing radius and rest density.
    pub fingerprint: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CachedSample {
    position: Vec3,
    normal: Vec3,
    psi: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundaryParticle {
    pub local_position: Vec3,
    pub local_normal: Vec3,
    /// World position under the pose from the last `update_world`.
    pub position: Vec3,
    pub normal: Vec3,
    /// Density contribution weight.
    pub psi: f32,
    pub owner_id: u32,
    /// Index of the source primitive in the list passed to `generate`.
    pub collider: u32,
}

pub struct BoundaryGenerator {
    cache: HashMap<PrimitiveKey, Arc<[CachedSample]>>,
    cached_samples: usize,
    max_cached_samples: usize,
    capacity_warned: bool,
    spacing_ratio: f32,
    working_keys: Vec<PrimitiveKey>,
    /// Particle range per working-set primitive.
    ranges: Vec<std::ops::Range<usize>>,
    particles: Vec<BoundaryParticle>,
    generation: u64,
}

impl Default for BoundaryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundaryGenerator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CACHED_SAMPLES)
    }

    pub fn with_capacity(max_cached_samples: usize) -> Self {
        Self {
            cache: HashMap::new(),
            cached_samples: 0,
            max_cached_samples,
            capacity_warned: false,
            spacing_ratio: DEFAULT_SPACING_RATIO,
            working_keys: Vec::new(),
            ranges: Vec::new(),
            particles: Vec::new(),
            generation: 0,
        }
    }

    /// Spacing ratio used by [`BoundaryGenerator::generate`], clamped to the valid range.
    pub fn set_spacing_ratio(&mut self, ratio: f32) {
        self.spacing_ratio = clamp_ratio(ratio);
    }

    #[inline]
    pub fn spacing_ratio(&self) -> f32 {
        self.spacing_ratio
    }

    /// Current working set.
    #[inline]
    pub fn particles(&self) -> &[BoundaryParticle] {
        &self.particles
    }

    /// Number of primitive configurations held in the cache.
    #[inline]
    pub fn cached_shapes(&self) -> usize {
        self.cache.len()
    }

    #[inline]
    pub fn cached_samples(&self) -> usize {
        self.cached_samples
    }

    #[inline]
    pub fn max_cached_samples(&self) -> usize {
        self.max_cached_samples
    }

    /// Bumped every time the working set changes.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generate with spacing `spacing_ratio * smoothing_radius`. Returns
    /// whether the working set changed.
    pub fn generate(
        &mut self,
        primitives: &[CollisionPrimitive],
        smoothing_radius: f32,
        rest_density: f32,
    ) -> bool {
        let spacing = self.spacing_ratio * smoothing_radius;
        self.generate_with_spacing(primitives, spacing, smoothing_radius, rest_density)
    }

    pub fn generate_with_spacing(
        &mut self,
        primitives: &[CollisionPrimitive],
        spacing: f32,
        smoothing_radius: f32,
        rest_density: f32,
    ) -> bool {
        let h = smoothing_radius.max(crate::config::MIN_SMOOTHING_RADIUS);
        let spacing = if spacing.is_finite() && spacing > 0.0 {
            spacing.clamp(
                crate::config::MIN_SPACING_RATIO * h,
                crate::config::MAX_SPACING_RATIO * h,
            )
        } else {
            DEFAULT_SPACING_RATIO * h
        };
        let rest_density = rest_density.max(crate::config::MIN_REST_DENSITY);

        let keys: Vec<PrimitiveKey> = primitives
            .iter()
            .map(|p| PrimitiveKey {
                kind: p.kind(),
                owner_id: p.owner_id,
                fingerprint: p.fingerprint(&[spacing, h, rest_density]),
            })
            .collect();

        // Unchanged list, unchanged samples. Primitives skipped for capacity
        // stay unsampled until the list changes.
        if keys == self.working_keys && self.ranges.len() == keys.len() {
            self.update_world(primitives);
            return false;
        }

        let kernels = Kernels::new(h);
        let mut particles = Vec::new();
        let mut ranges = Vec::with_capacity(primitives.len());
        for (index, (prim, key)) in primitives.iter().zip(&keys).enumerate() {
            let start = particles.len();
            if let Some(samples) = self.samples_for(prim, *key, spacing, &kernels, rest_density) {
                particles.extend(samples.iter().map(|s| BoundaryParticle {
                    local_position: s.position,
                    local_normal: s.normal,
                    position: s.position,
                    normal: s.normal,
                    psi: s.psi,
                    owner_id: prim.owner_id,
                    collider: index as u32,
                }));
            }
            ranges.push(start..particles.len());
        }

        self.particles = particles;
        self.ranges = ranges;
        self.working_keys = keys;
        self.generation += 1;
        self.update_world(primitives);
        log::debug!(
            "boundary working set regenerated: {} primitives, {} samples",
            primitives.len(),
            self.particles.len()
        );
        true
    }

    fn samples_for(
        &mut self,
        prim: &CollisionPrimitive,
        key: PrimitiveKey,
        spacing: f32,
        kernels: &Kernels,
        rest_density: f32,
    ) -> Option<Arc<[CachedSample]>> {
        if let Some(samples) = self.cache.get(&key) {
            return Some(Arc::clone(samples));
        }
        // Estimate first; the surface is only built when it fits.
        let remaining = self.max_cached_samples.saturating_sub(self.cached_samples);
        if estimate_samples(&prim.shape, spacing) > remaining {
            self.warn_full(prim.owner_id);
            return None;
        }
        let surface = sample_surface(&prim.shape, spacing);
        if surface.len() > remaining {
            self.warn_full(prim.owner_id);
            return None;
        }
        let samples: Arc<[CachedSample]> = compute_psi(&surface, kernels, rest_density).into();
        self.cached_samples += samples.len();
        self.cache.insert(key, Arc::clone(&samples));
        Some(samples)
    }

    fn warn_full(&mut self, owner_id: u32) {
        if !self.capacity_warned {
            log::warn!(
                "boundary cache full ({} of {} samples), owner {} left unsampled",
                self.cached_samples,
                self.max_cached_samples,
                owner_id
            );
            self.capacity_warned = true;
        }
    }

    /// Re-pose the working set from this frame's primitive poses. Ignored
    /// when `posed` does not match the primitive list of the last generation.
    pub fn update_world(&mut self, posed: &[CollisionPrimitive]) {
        if posed.len() != self.ranges.len() {
            log::debug!(
                "boundary pose update skipped: {} poses for {} primitives",
                posed.len(),
                self.ranges.len()
            );
            return;
        }
        for (prim, range) in posed.iter().zip(&self.ranges) {
            for b in &mut self.particles[range.clone()] {
                b.position = prim.pose.transform_point(b.local_position);
                b.normal = prim.pose.transform_vector(b.local_normal);
            }
        }
    }

    /// Drop every cached sample set and the working set.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.cached_samples = 0;
        self.capacity_warned = false;
        self.working_keys.clear();
        self.ranges.clear();
        self.particles.clear();
        self.generation += 1;
    }
}

/// `psi_b = rho0 / sum_k W(x_b - x_k)` over the samples of one primitive.
fn compute_psi(surface: &[SurfacePoint], kernels: &Kernels, rest_density: f32) -> Vec<CachedSample> {
    let positions: Vec<Vec3> = surface.iter().map(|s| s.position).collect();
    let mut index = SpatialHashMap::new(kernels.h);
    index.build(&positions);

    let mut found = Vec::new();
    surface
        .iter()
        .map(|s| {
            found.clear();
            index.query_radius(s.position, kernels.h, &mut found);
            let sum: f32 = found
                .iter()
                .map(|&k| kernels.poly6_sq((s.position - positions[k as usize]).length_squared()))
                .sum();
            let psi = if sum > 0.0 { rest_density / sum } else { 0.0 };
            CachedSample {
                position: s.position,
                normal: s.normal,
                psi,
            }
        })
        .collect()
}
