use glam::Vec3;

use crate::attachment::{detach_all, update_attachments, AttachmentParams};
use crate::boundary::BoundaryGenerator;
use crate::collision::{
    resolve_distance_field, resolve_primitives, CollisionParams, CollisionPrimitive, DistanceField,
};
use crate::config::{EvictionPolicy, FluidConfig};
use crate::constraints::density::{apply_corrections, solve_density, DensityParams};
use crate::error::{FluidError, Readiness};
use crate::feedback::{
    AsyncTransfer, FeedbackFrame, FeedbackPipeline, FeedbackReader, LatencyReadback,
    ThreadedReadback,
};
use crate::fluids::viscosity::apply_xsph_viscosity;
use crate::fluids::Kernels;
use crate::grid::{NeighborLists, SortedGrid};
use crate::particle::{ParticleFlags, ParticleSet};
use crate::quality::{IterationController, StepStats};
use crate::render::{ParticleView, RenderParticle};
use crate::transforms::TransformStore;

/// Position-based fluid solver.
///
/// Each [`FluidSolver::step`] runs a fixed pipeline:
///
/// 1. Skin bone-relative primitives with this step's transform snapshot.
/// 2. Refresh the boundary working set (cached per primitive).
/// 3. Predict positions from velocity and gravity.
/// 4. Rebuild the sorted grids and gather neighbor lists.
/// 5. Density solve and correction, `K` times.
/// 6. Collide: distance field first, then primitives.
/// 7. Attachment update.
/// 8. Finalize velocities, apply the contact response and XSPH viscosity.
/// 9. Submit this step's feedback and poll for completed readbacks.
///
/// When construction fails to allocate the solver comes up
/// [`Readiness::NotReady`] and every operation is a no-op.
pub struct FluidSolver<B: AsyncTransfer<FeedbackFrame> = LatencyReadback> {
    readiness: Readiness,
    config: FluidConfig,
    particles: ParticleSet,
    next_id: u32,
    frame: u64,
    fluid_grid: SortedGrid,
    boundary_grid: SortedGrid,
    fluid_neighbors: NeighborLists,
    boundary_neighbors: NeighborLists,
    boundary: BoundaryGenerator,
    boundary_positions: Vec<Vec3>,
    skinned: Vec<CollisionPrimitive>,
    feedback: FeedbackPipeline<B>,
    transforms: TransformStore,
    distance_field: Option<DistanceField>,
    controller: IterationController,
    stats: StepStats,
}

impl FluidSolver<LatencyReadback> {
    pub fn try_new(config: FluidConfig) -> Result<Self, FluidError> {
        Self::try_with_backend(config, LatencyReadback::default())
    }

    /// Like [`FluidSolver::try_new`], but a failure yields a not-ready solver.
    pub fn new(config: FluidConfig) -> Self {
        Self::with_backend(config, LatencyReadback::default())
    }
}

impl FluidSolver<ThreadedReadback<FeedbackFrame>> {
    /// Solver whose feedback readback runs on a dedicated copy thread.
    pub fn try_threaded(config: FluidConfig) -> Result<Self, FluidError> {
        Self::try_with_backend(config, ThreadedReadback::new()?)
    }
}

impl<B: AsyncTransfer<FeedbackFrame>> FluidSolver<B> {
    pub fn try_with_backend(config: FluidConfig, backend: B) -> Result<Self, FluidError> {
        let mut solver = Self::empty(config, backend);
        solver.particles = ParticleSet::with_capacity(solver.config.max_particles)?;
        solver.readiness = Readiness::Ready;
        log::info!(
            "fluid solver ready: capacity {}, h = {}, rest density = {}",
            solver.config.max_particles,
            solver.config.smoothing_radius,
            solver.config.rest_density
        );
        Ok(solver)
    }

    pub fn with_backend(config: FluidConfig, backend: B) -> Self {
        let mut solver = Self::empty(config, backend);
        match ParticleSet::with_capacity(solver.config.max_particles) {
            Ok(particles) => {
                solver.particles = particles;
                solver.readiness = Readiness::Ready;
            }
            Err(e) => log::error!("fluid solver not ready: {}", e),
        }
        solver
    }

    fn empty(mut config: FluidConfig, backend: B) -> Self {
        config.recompute_derived();
        let mut boundary = BoundaryGenerator::new();
        boundary.set_spacing_ratio(config.boundary_spacing_ratio);
        let mut feedback = FeedbackPipeline::new(backend);
        feedback.set_enabled(config.feedback_enabled);
        let controller = IterationController::new(1, config.solver_iterations);
        Self {
            readiness: Readiness::NotReady,
            fluid_grid: SortedGrid::new(config.cell_size),
            boundary_grid: SortedGrid::new(config.cell_size),
            fluid_neighbors: NeighborLists::new(),
            boundary_neighbors: NeighborLists::new(),
            boundary,
            boundary_positions: Vec::new(),
            skinned: Vec::new(),
            feedback,
            transforms: TransformStore::new(),
            distance_field: None,
            controller,
            stats: StepStats::default(),
            particles: ParticleSet::EMPTY,
            next_id: 0,
            frame: 0,
            config,
        }
    }

    #[inline]
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    pub fn config(&self) -> &FluidConfig {
        &self.config
    }

    /// Replace the configuration. Derived values are recomputed; the particle
    /// capacity is fixed at construction and is not changed here.
    pub fn set_config(&mut self, mut config: FluidConfig) {
        config.recompute_derived();
        if self.is_ready() && config.max_particles != self.particles.capacity() {
            log::warn!(
                "max_particles {} ignored, capacity stays {}",
                config.max_particles,
                self.particles.capacity()
            );
            config.max_particles = self.particles.capacity();
        }
        self.fluid_grid.set_cell_size(config.cell_size);
        self.boundary_grid.set_cell_size(config.cell_size);
        self.boundary.set_spacing_ratio(config.boundary_spacing_ratio);
        self.feedback.set_enabled(config.feedback_enabled);
        if !config.attachment_enabled {
            detach_all(&mut self.particles);
        }
        self.controller.max_iterations = config.solver_iterations.max(self.controller.min_iterations);
        self.config = config;
    }

    /// Add a particle. Returns its id, or `None` when rejected.
    pub fn spawn(&mut self, position: Vec3, velocity: Vec3, source_id: u32) -> Option<u32> {
        if !self.is_ready() || !position.is_finite() {
            return None;
        }
        let velocity = if velocity.is_finite() { velocity } else { Vec3::ZERO };
        if self.particles.is_full() {
            match self.config.eviction {
                EvictionPolicy::Reject => return None,
                EvictionPolicy::EvictOldest => {
                    let oldest = self.particles.oldest()?;
                    self.particles.swap_remove(oldest);
                }
            }
        }
        let id = self.next_id;
        self.particles.push(position, velocity, id, source_id)?;
        self.next_id = self.next_id.wrapping_add(1);
        Some(id)
    }

    /// Remove the particle at `index`; the last particle takes its slot.
    pub fn despawn(&mut self, index: usize) -> bool {
        self.is_ready() && self.particles.swap_remove(index)
    }

    pub fn despawn_id(&mut self, particle_id: u32) -> bool {
        match self.particles.index_of(particle_id) {
            Some(index) => self.despawn(index),
            None => false,
        }
    }

    /// Remove every particle.
    pub fn clear(&mut self) {
        self.particles.clear();
        self.fluid_neighbors.clear();
        self.boundary_neighbors.clear();
    }

    pub fn particles(&self) -> ParticleView<'_> {
        ParticleView::new(&self.particles)
    }

    pub fn write_render_buffer(&self, out: &mut Vec<RenderParticle>) {
        self.particles().write_into(out);
    }

    pub fn feedback_reader(&self) -> FeedbackReader {
        self.feedback.reader()
    }

    /// Shared handle the host uploads skeletal poses through.
    pub fn transforms(&self) -> TransformStore {
        self.transforms.clone()
    }

    pub fn set_distance_field(&mut self, field: Option<DistanceField>) {
        self.distance_field = field;
    }

    pub fn distance_field(&self) -> Option<&DistanceField> {
        self.distance_field.as_ref()
    }

    pub fn boundary(&self) -> &BoundaryGenerator {
        &self.boundary
    }

    /// Drop all cached boundary samples, e.g. on a world change.
    pub fn invalidate_boundary_cache(&mut self) {
        self.boundary.invalidate();
        detach_all(&mut self.particles);
    }

    pub fn iteration_controller(&mut self) -> &mut IterationController {
        &mut self.controller
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    /// Number of steps run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Advance the simulation by `dt` seconds against this frame's colliders.
    pub fn step(&mut self, dt: f32, primitives: &[CollisionPrimitive]) {
        if !self.is_ready() || !(dt > 0.0) || !dt.is_finite() {
            return;
        }
        self.frame += 1;
        let mut stats = StepStats::default();

        // Skin + boundary refresh
        self.transforms.snapshot().skin(primitives, &mut self.skinned);
        let changed = self.boundary.generate(
            &self.skinned,
            self.config.smoothing_radius,
            self.config.rest_density,
        );
        if changed {
            detach_all(&mut self.particles);
        }
        self.boundary_positions.clear();
        self.boundary_positions
            .extend(self.boundary.particles().iter().map(|b| b.position));
        self.boundary_grid.build(&self.boundary_positions);
        stats.boundary_changed = changed;
        stats.boundary_count = self.boundary_positions.len() as u32;

        self.predict(dt);
        self.build_index();

        let kernels = Kernels::new(self.config.smoothing_radius);
        let density = DensityParams {
            rest_density: self.config.rest_density,
            particle_mass: self.config.particle_mass,
            relaxation: self.config.relaxation,
            tensile_correction: self.config.tensile_correction,
        };
        let iterations = self.controller.iterations(self.config.solver_iterations);
        let mut error = 0.0;
        for _ in 0..iterations {
            error = solve_density(
                &mut self.particles,
                &self.fluid_neighbors,
                &self.boundary_neighbors,
                self.boundary.particles(),
                &kernels,
                &density,
            );
            apply_corrections(&mut self.particles);
        }
        self.controller.update(error);
        stats.iterations = iterations;
        stats.density_error = error;

        self.collide(dt, &mut stats);

        if self.config.attachment_enabled {
            let params = AttachmentParams::from_config(&self.config);
            update_attachments(
                &mut self.particles,
                self.boundary.particles(),
                &self.boundary_grid,
                &params,
            );
        }

        self.finalize(dt, &kernels);
        self.feedback.poll();

        stats.particle_count = self.particles.len() as u32;
        stats.attached = self
            .particles
            .flags
            .iter()
            .filter(|f| f.contains(ParticleFlags::ATTACHED))
            .count() as u32;
        self.stats = stats;
    }

    fn predict(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        let max_velocity = self.config.max_velocity;
        let p = &mut self.particles;
        for i in 0..p.len() {
            let v = clamp_speed(p.velocity[i] + gravity * dt, max_velocity);
            p.velocity[i] = v;
            p.predicted[i] = p.position[i] + v * dt;
            p.contact[i] = None;
            p.flags[i].remove(ParticleFlags::COLLIDED);
        }
    }

    fn build_index(&mut self) {
        let h = self.config.smoothing_radius;
        self.fluid_grid.build(&self.particles.predicted);
        self.fluid_neighbors
            .gather(&self.fluid_grid, &self.particles.predicted, h);
        self.boundary_neighbors
            .gather(&self.boundary_grid, &self.particles.predicted, h);

        let p = &mut self.particles;
        for i in 0..p.len() {
            // Fluid lists include the particle itself.
            p.neighbor_count[i] = self.fluid_neighbors.neighbors(i).len().saturating_sub(1) as u32;
            let adjacent = !self.boundary_neighbors.neighbors(i).is_empty();
            p.flags[i].set(ParticleFlags::BOUNDARY_ADJACENT, adjacent);
        }
    }

    fn collide(&mut self, dt: f32, stats: &mut StepStats) {
        let params = CollisionParams {
            margin: self.config.collision_margin,
            friction: self.config.friction,
            restitution: self.config.restitution,
            particle_mass: self.config.particle_mass,
            dt,
        };

        if self.config.distance_field_enabled {
            if let Some(field) = &self.distance_field {
                stats.field_contacts =
                    resolve_distance_field(&mut self.particles, field, &params) as u32;
            }
        }

        if self.feedback.is_enabled() {
            let mut frame = self.feedback.take_frame(self.frame);
            stats.primitive_contacts =
                resolve_primitives(&mut self.particles, &self.skinned, &params, Some(&mut frame))
                    as u32;
            self.feedback.submit(frame);
        } else {
            stats.primitive_contacts =
                resolve_primitives(&mut self.particles, &self.skinned, &params, None) as u32;
        }
    }

    fn finalize(&mut self, dt: f32, kernels: &Kernels) {
        let inv_dt = 1.0 / dt;
        let max_velocity = self.config.max_velocity;
        let p = &mut self.particles;
        for i in 0..p.len() {
            let mut v = (p.predicted[i] - p.position[i]) * inv_dt;
            if let Some(contact) = p.contact[i] {
                v = contact.respond(v);
            }
            if !v.is_finite() || !p.predicted[i].is_finite() {
                // Leave the particle where it was rather than propagate NaN.
                p.predicted[i] = p.position[i];
                v = Vec3::ZERO;
            }
            p.velocity[i] = clamp_speed(v, max_velocity);
            p.position[i] = p.predicted[i];
        }

        apply_xsph_viscosity(
            &mut self.particles,
            &self.fluid_neighbors,
            kernels,
            self.config.particle_mass,
            self.config.viscosity,
        );
    }
}

#[inline]
fn clamp_speed(v: Vec3, max_speed: f32) -> Vec3 {
    if max_speed > 0.0 {
        v.clamp_length_max(max_speed)
    } else {
        v
    }
}
