/// Adaptive solver iteration count.
///
/// Tracks an exponential moving average of the mean density error reported
/// by the density solve and moves the iteration count within
/// `[min_iterations, max_iterations]`: up while the error is above target,
/// down after it has stayed well below target for a while.
pub struct IterationController {
    /// Acceptable mean density error (fraction of rest density).
    pub target_error: f32,
    pub min_iterations: u32,
    pub max_iterations: u32,
    /// Whether adaptive iteration is enabled.
    pub enabled: bool,
    current_iterations: u32,
    /// Exponential moving average of the density error.
    ema_error: f32,
    /// Number of consecutive steps well under target.
    steps_under_target: u32,
}

/// Steps the error must stay low before an iteration is removed.
const RELAX_AFTER_STEPS: u32 = 30;

impl IterationController {
    pub fn new(min_iterations: u32, max_iterations: u32) -> Self {
        let min_iterations = min_iterations.max(1);
        let max_iterations = max_iterations.max(min_iterations);
        Self {
            target_error: 0.01,
            min_iterations,
            max_iterations,
            enabled: false,
            current_iterations: max_iterations,
            ema_error: 0.0,
            steps_under_target: 0,
        }
    }

    /// Iterations to run this step. `fixed` is used while disabled.
    pub fn iterations(&self, fixed: u32) -> u32 {
        if self.enabled {
            self.current_iterations
        } else {
            fixed
        }
    }

    pub fn ema_error(&self) -> f32 {
        self.ema_error
    }

    /// Feed the mean density error measured on the last iteration of a step.
    pub fn update(&mut self, density_error: f32) {
        if !self.enabled || !density_error.is_finite() {
            return;
        }

        // EMA with alpha=0.3 for responsiveness
        self.ema_error = self.ema_error * 0.7 + density_error * 0.3;

        if self.ema_error > self.target_error {
            self.steps_under_target = 0;
            if self.current_iterations < self.max_iterations {
                self.current_iterations += 1;
            }
        } else if self.ema_error < self.target_error * 0.5 {
            self.steps_under_target += 1;
            // Wait before dropping to avoid oscillation
            if self.steps_under_target > RELAX_AFTER_STEPS {
                self.steps_under_target = 0;
                if self.current_iterations > self.min_iterations {
                    self.current_iterations -= 1;
                }
            }
        } else {
            self.steps_under_target = self.steps_under_target.saturating_add(1).min(RELAX_AFTER_STEPS / 2);
        }
    }
}

/// Counters from a single solver step.
#[derive(Clone, Copy, Debug, Default)]
pub struct StepStats {
    pub particle_count: u32,
    pub boundary_count: u32,
    pub iterations: u32,
    /// Mean density error after the last iteration.
    pub density_error: f32,
    /// Particles pushed out by primitives.
    pub primitive_contacts: u32,
    /// Particles pushed out by the distance field.
    pub field_contacts: u32,
    pub attached: u32,
    /// True when the boundary working set was regenerated this step.
    pub boundary_changed: bool,
}
