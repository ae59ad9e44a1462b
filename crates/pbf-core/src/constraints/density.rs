use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::boundary::BoundaryParticle;
use crate::fluids::Kernels;
use crate::grid::NeighborLists;
use crate::particle::ParticleSet;

/// Tensile instability correction coefficient (k in the paper).
const TENSILE_K: f32 = 0.001;

/// Tensile instability correction exponent (n in the paper).
const TENSILE_N: i32 = 4;

/// Fraction of smoothing radius used as the tensile reference distance.
const TENSILE_DQ_FACTOR: f32 = 0.3;

/// Constants for one density solve, fixed for the whole step.
#[derive(Clone, Copy, Debug)]
pub struct DensityParams {
    pub rest_density: f32,
    pub particle_mass: f32,
    /// Scaled by `1 / h^2` to form the lambda denominator relaxation.
    pub relaxation: f32,
    pub tensile_correction: bool,
}

/// One PBF density iteration.
///
/// Reference: "Position Based Fluids", Macklin & Muller, SIGGRAPH 2013,
/// with boundary handling after Akinci et al. 2012.
///
/// 1. Density from fluid neighbors (self included) plus boundary `psi`.
/// 2. Lambda from the unilateral constraint `max(rho / rho0 - 1, 0)`.
/// 3. Position corrections, written to `particles.corrections`.
///
/// Corrections are computed from a consistent snapshot (Jacobi) and are not
/// applied here; see [`apply_corrections`]. Returns the mean constraint
/// error over all particles.
pub fn solve_density(
    particles: &mut ParticleSet,
    fluid: &NeighborLists,
    boundary_neighbors: &NeighborLists,
    boundary: &[BoundaryParticle],
    kernels: &Kernels,
    params: &DensityParams,
) -> f32 {
    let count = particles.len();
    if count == 0 {
        return 0.0;
    }
    let inv_rho0 = 1.0 / params.rest_density;
    let mass = params.particle_mass;
    let epsilon = params.relaxation / kernels.h2;

    // ------------------------------------------------------------------
    // Phase 1: density and lambda.
    // ------------------------------------------------------------------
    let predicted = &particles.predicted;
    let density_lambda = |i: usize| -> (f32, f32) {
        let pos_i = predicted[i];
        let mut rho = 0.0_f32;
        let mut grad_sum_sq = 0.0_f32;
        let mut grad_self = Vec3::ZERO;

        for &j in fluid.neighbors(i) {
            let j = j as usize;
            let r = pos_i - predicted[j];
            let r2 = r.length_squared();
            rho += mass * kernels.poly6_sq(r2);
            if j == i {
                continue;
            }
            let grad_j = kernels.spiky_gradient(r, r2.sqrt()) * (mass * inv_rho0);
            grad_sum_sq += grad_j.length_squared();
            grad_self += grad_j;
        }

        for &b in boundary_neighbors.neighbors(i) {
            let Some(bp) = boundary.get(b as usize) else {
                continue;
            };
            let r = pos_i - bp.position;
            let r2 = r.length_squared();
            rho += bp.psi * kernels.poly6_sq(r2);
            grad_self += kernels.spiky_gradient(r, r2.sqrt()) * (bp.psi * inv_rho0);
        }

        grad_sum_sq += grad_self.length_squared();
        let c = (rho * inv_rho0 - 1.0).max(0.0);
        (rho, -c / (grad_sum_sq + epsilon))
    };

    #[cfg(feature = "parallel")]
    let phase1: Vec<(f32, f32)> = (0..count).into_par_iter().map(density_lambda).collect();
    #[cfg(not(feature = "parallel"))]
    let phase1: Vec<(f32, f32)> = (0..count).map(density_lambda).collect();

    let mut error = 0.0_f32;
    for (i, (rho, lambda)) in phase1.into_iter().enumerate() {
        particles.density[i] = rho;
        particles.lambda[i] = lambda;
        error += (rho * inv_rho0 - 1.0).max(0.0);
    }

    // ------------------------------------------------------------------
    // Phase 2: position corrections.
    // ------------------------------------------------------------------
    let poly6_dq = if params.tensile_correction {
        let dq = kernels.h * TENSILE_DQ_FACTOR;
        kernels.poly6_sq(dq * dq)
    } else {
        1.0
    };
    let predicted = &particles.predicted;
    let lambda = &particles.lambda;
    let correction = |i: usize| -> Vec3 {
        let pos_i = predicted[i];
        let lambda_i = lambda[i];
        let mut delta_p = Vec3::ZERO;

        for &j in fluid.neighbors(i) {
            let j = j as usize;
            if j == i {
                continue;
            }
            let r = pos_i - predicted[j];
            let r2 = r.length_squared();
            let s_corr = if params.tensile_correction {
                let ratio = kernels.poly6_sq(r2) / poly6_dq;
                -TENSILE_K * ratio.powi(TENSILE_N)
            } else {
                0.0
            };
            delta_p += (lambda_i + lambda[j] + s_corr) * mass * kernels.spiky_gradient(r, r2.sqrt());
        }

        for &b in boundary_neighbors.neighbors(i) {
            let Some(bp) = boundary.get(b as usize) else {
                continue;
            };
            let r = pos_i - bp.position;
            delta_p += lambda_i * bp.psi * kernels.spiky_gradient(r, r.length());
        }

        delta_p * inv_rho0
    };

    #[cfg(feature = "parallel")]
    (0..count)
        .into_par_iter()
        .map(correction)
        .collect_into_vec(&mut particles.corrections);
    #[cfg(not(feature = "parallel"))]
    for (i, dp) in particles.corrections.iter_mut().enumerate() {
        *dp = correction(i);
    }

    error / count as f32
}

/// Commit the accumulated corrections to predicted positions.
pub fn apply_corrections(particles: &mut ParticleSet) {
    for (p, dp) in particles.predicted.iter_mut().zip(&particles.corrections) {
        if dp.is_finite() {
            *p += *dp;
        }
    }
}
