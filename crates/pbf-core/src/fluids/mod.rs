pub mod viscosity;

use glam::Vec3;
use std::f32::consts::PI;

/// Poly6 smoothing kernel for SPH density estimation.
///
/// Returns `W(r, h) = 315 / (64 * PI * h^9) * (h^2 - r^2)^3` when `r < h`,
/// and `0.0` when `r >= h`.
#[inline]
pub fn poly6_kernel(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    Kernels::new(h).poly6_sq(r * r)
}

/// Spiky kernel gradient for SPH pressure correction.
///
/// Returns `(r / r_len) * (-45 / (PI * h^6)) * (h - r_len)^2` when
/// `r_len < h` and `r_len > 1e-6`, and `Vec3::ZERO` otherwise.
#[inline]
pub fn spiky_gradient(r: Vec3, r_len: f32, h: f32) -> Vec3 {
    Kernels::new(h).spiky_gradient(r, r_len)
}

/// Kernel coefficients for one smoothing radius, computed once per step.
#[derive(Clone, Copy, Debug)]
pub struct Kernels {
    pub h: f32,
    pub h2: f32,
    poly6_coeff: f32,
    spiky_coeff: f32,
}

impl Kernels {
    pub fn new(h: f32) -> Self {
        let h2 = h * h;
        let h6 = h2 * h2 * h2;
        let h9 = h6 * h2 * h;
        Self {
            h,
            h2,
            poly6_coeff: 315.0 / (64.0 * PI * h9),
            spiky_coeff: -45.0 / (PI * h6),
        }
    }

    /// Poly6 from squared distance.
    #[inline]
    pub fn poly6_sq(&self, r2: f32) -> f32 {
        if r2 >= self.h2 {
            return 0.0;
        }
        let diff = self.h2 - r2;
        self.poly6_coeff * diff * diff * diff
    }

    /// Gradient of the spiky kernel with respect to the first particle,
    /// `r = x_i - x_j`.
    #[inline]
    pub fn spiky_gradient(&self, r: Vec3, r_len: f32) -> Vec3 {
        if r_len >= self.h || r_len <= 1e-6 {
            return Vec3::ZERO;
        }
        let diff = self.h - r_len;
        (r / r_len) * self.spiky_coeff * diff * diff
    }
}
