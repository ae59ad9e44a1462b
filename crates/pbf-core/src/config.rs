use glam::Vec3;

pub const MIN_SMOOTHING_RADIUS: f32 = 1.0e-3;
pub const MIN_REST_DENSITY: f32 = 1.0e-3;
pub const MIN_PARTICLE_MASS: f32 = 1.0e-9;
pub const MIN_SPACING_RATIO: f32 = 0.1;
pub const MAX_SPACING_RATIO: f32 = 0.7;
pub const MAX_SOLVER_ITERATIONS: u32 = 32;
/// Upper bound on the attachment distance factors, in smoothing radii.
pub const MAX_ATTACHMENT_FACTOR: f32 = 4.0;

/// What `spawn` does when the particle buffer is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Refuse the new particle.
    Reject,
    /// Recycle the oldest live particle.
    EvictOldest,
}

/// Per-preset simulation parameters.
///
/// Source fields are set by the owner; the derived block at the bottom is
/// only ever written by [`FluidConfig::recompute_derived`], which must be
/// called after any source field changes.
#[derive(Clone, Debug)]
pub struct FluidConfig {
    pub rest_density: f32,
    pub smoothing_radius: f32,
    /// Particle spacing as a fraction of the smoothing radius.
    pub spacing_ratio: f32,
    /// Boundary sample spacing as a fraction of the smoothing radius.
    pub boundary_spacing_ratio: f32,
    pub solver_iterations: u32,
    pub gravity: Vec3,
    pub max_velocity: f32,
    /// Constraint relaxation; the lambda denominator gets `relaxation / h^2`.
    pub relaxation: f32,
    pub tensile_correction: bool,
    /// XSPH viscosity coefficient, 0 disables the pass.
    pub viscosity: f32,
    /// Particles closer than this to a collider surface are pushed out.
    pub collision_margin: f32,
    pub restitution: f32,
    pub friction: f32,
    pub feedback_enabled: bool,
    pub distance_field_enabled: bool,
    pub attachment_enabled: bool,
    pub attach_radius_factor: f32,
    pub detach_jump_factor: f32,
    pub max_drift_factor: f32,
    /// Blend toward the anchor per step while attached, in [0, 1].
    pub stickiness: f32,
    pub max_particles: usize,
    pub eviction: EvictionPolicy,

    // Derived
    pub particle_spacing: f32,
    pub particle_mass: f32,
    pub cell_size: f32,
}

impl Default for FluidConfig {
    fn default() -> Self {
        let mut config = Self {
            rest_density: 1000.0,
            smoothing_radius: 0.1,
            spacing_ratio: 0.5,
            boundary_spacing_ratio: 0.5,
            solver_iterations: 4,
            gravity: Vec3::new(0.0, -9.81, 0.0),
            max_velocity: 20.0,
            relaxation: 5.0,
            tensile_correction: false,
            viscosity: 0.0,
            collision_margin: 0.0,
            restitution: 0.0,
            friction: 0.0,
            feedback_enabled: false,
            distance_field_enabled: false,
            attachment_enabled: false,
            attach_radius_factor: 0.5,
            detach_jump_factor: 1.0,
            max_drift_factor: 0.5,
            stickiness: 0.5,
            max_particles: 16_384,
            eviction: EvictionPolicy::Reject,
            particle_spacing: 0.0,
            particle_mass: 0.0,
            cell_size: 0.0,
        };
        config.recompute_derived();
        config
    }
}

impl FluidConfig {
    /// Clamp source fields into range and refresh the derived values.
    pub fn recompute_derived(&mut self) {
        if !(self.smoothing_radius >= MIN_SMOOTHING_RADIUS) {
            log::debug!(
                "smoothing radius {} clamped to {}",
                self.smoothing_radius,
                MIN_SMOOTHING_RADIUS
            );
            self.smoothing_radius = MIN_SMOOTHING_RADIUS;
        }
        if !(self.rest_density >= MIN_REST_DENSITY) {
            self.rest_density = MIN_REST_DENSITY;
        }
        self.spacing_ratio = clamp_ratio(self.spacing_ratio);
        self.boundary_spacing_ratio = clamp_ratio(self.boundary_spacing_ratio);
        self.solver_iterations = self.solver_iterations.clamp(1, MAX_SOLVER_ITERATIONS);
        self.restitution = clamp_unit(self.restitution);
        self.friction = clamp_unit(self.friction);
        self.stickiness = clamp_unit(self.stickiness);
        self.viscosity = non_negative(self.viscosity);
        self.relaxation = non_negative(self.relaxation);
        self.collision_margin = non_negative(self.collision_margin);
        self.max_velocity = non_negative(self.max_velocity);
        self.attach_radius_factor = clamp_factor(self.attach_radius_factor);
        self.detach_jump_factor = clamp_factor(self.detach_jump_factor);
        self.max_drift_factor = clamp_factor(self.max_drift_factor);

        self.particle_spacing = self.spacing_ratio * self.smoothing_radius;
        self.particle_mass =
            (self.rest_density * self.particle_spacing.powi(3)).max(MIN_PARTICLE_MASS);
        self.cell_size = self.smoothing_radius;
    }

    /// Sample spacing used for boundary particles.
    pub fn boundary_spacing(&self) -> f32 {
        clamp_ratio(self.boundary_spacing_ratio) * self.smoothing_radius.max(MIN_SMOOTHING_RADIUS)
    }
}

/// Clamp a spacing ratio into `[MIN_SPACING_RATIO, MAX_SPACING_RATIO]`; NaN maps to the default.
pub fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_nan() {
        return 0.5;
    }
    ratio.clamp(MIN_SPACING_RATIO, MAX_SPACING_RATIO)
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn clamp_factor(v: f32) -> f32 {
    non_negative(v).min(MAX_ATTACHMENT_FACTOR)
}

fn non_negative(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.max(0.0)
    }
}
