use crate::config::FluidConfig;

/// Named bundle of fluid parameters.
///
/// Applying a preset overwrites only the fields it carries; spacing, the
/// smoothing radius and particle budget stay with the caller, so the
/// particle mass follows the new rest density through `recompute_derived`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialPreset {
    pub name: &'static str,
    pub rest_density: f32,
    pub viscosity: f32,
    pub solver_iterations: u32,
    pub surface_friction: f32,
    pub bounce: f32,
    /// Surface attachment strength, `None` for fluids that never cling.
    pub cling: Option<f32>,
    pub tensile_correction: bool,
}

impl MaterialPreset {
    pub const WATER: Self = Self {
        name: "water",
        rest_density: 1000.0,
        viscosity: 0.01,
        solver_iterations: 4,
        surface_friction: 0.1,
        bounce: 0.3,
        cling: None,
        tensile_correction: true,
    };

    /// Dense and slow; extra iterations keep it from compressing under its own weight.
    pub const HONEY: Self = Self {
        name: "honey",
        rest_density: 1400.0,
        viscosity: 0.5,
        solver_iterations: 6,
        surface_friction: 0.4,
        bounce: 0.1,
        cling: Some(0.3),
        tensile_correction: false,
    };

    /// Rides along with animated colliders.
    pub const SLIME: Self = Self {
        name: "slime",
        rest_density: 1100.0,
        viscosity: 0.3,
        solver_iterations: 5,
        surface_friction: 0.6,
        bounce: 0.0,
        cling: Some(0.9),
        tensile_correction: false,
    };

    pub const GAS: Self = Self {
        name: "gas",
        rest_density: 10.0,
        viscosity: 0.005,
        solver_iterations: 3,
        surface_friction: 0.0,
        bounce: 0.0,
        cling: None,
        tensile_correction: false,
    };

    pub const ALL: [Self; 4] = [Self::WATER, Self::HONEY, Self::SLIME, Self::GAS];

    /// Case-insensitive lookup by preset name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Write this preset into `config` and refresh its derived values.
    pub fn apply_to(&self, config: &mut FluidConfig) {
        config.rest_density = self.rest_density;
        config.viscosity = self.viscosity;
        config.solver_iterations = self.solver_iterations;
        config.friction = self.surface_friction;
        config.restitution = self.bounce;
        config.tensile_correction = self.tensile_correction;
        match self.cling {
            Some(stickiness) => {
                config.attachment_enabled = true;
                config.stickiness = stickiness;
            }
            None => config.attachment_enabled = false,
        }
        config.recompute_derived();
    }
}
