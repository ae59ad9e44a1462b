use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::fluids::Kernels;
use crate::grid::NeighborLists;
use crate::particle::ParticleSet;

/// Apply XSPH viscosity to fluid particle velocities.
///
/// XSPH smooths velocities by blending each particle's velocity toward
/// the weighted average of its neighbors' velocities.
///
/// Formula: v_i += c * sum_j { (v_j - v_i) * m * poly6(|x_i - x_j|, h) / rho_j }
///
/// Applied after velocities are derived from the position change, against
/// the finalized predicted positions.
pub fn apply_xsph_viscosity(
    particles: &mut ParticleSet,
    neighbors: &NeighborLists,
    kernels: &Kernels,
    mass: f32,
    viscosity: f32,
) {
    if viscosity <= 0.0 {
        return;
    }
    let count = particles.len();
    let predicted = &particles.predicted;
    let velocity = &particles.velocity;
    let density = &particles.density;

    let correction = |i: usize| -> Vec3 {
        let pos_i = predicted[i];
        let vel_i = velocity[i];
        let mut sum = Vec3::ZERO;
        for &j in neighbors.neighbors(i) {
            let j = j as usize;
            if j == i {
                continue;
            }
            let w = kernels.poly6_sq((pos_i - predicted[j]).length_squared());
            if w > 0.0 {
                let rho_j = density[j].max(1e-6);
                sum += (velocity[j] - vel_i) * (mass * w / rho_j);
            }
        }
        sum * viscosity
    };

    // Collect first, then apply, so every particle reads the same snapshot.
    #[cfg(feature = "parallel")]
    let vel_corrections: Vec<Vec3> = (0..count).into_par_iter().map(correction).collect();
    #[cfg(not(feature = "parallel"))]
    let vel_corrections: Vec<Vec3> = (0..count).map(correction).collect();

    for (v, dv) in particles.velocity.iter_mut().zip(vel_corrections) {
        *v += dv;
    }
}
