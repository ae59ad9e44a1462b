use glam::Vec3;

/// Lengths below this are treated as zero when normalizing.
pub const DEGENERATE_LENGTH: f32 = 1.0e-6;

/// Unit vector perpendicular to `axis`.
///
/// Crosses with +Y first and falls back to +X when `axis` is (anti)parallel
/// to +Y, so the result is deterministic and never NaN.
#[inline]
pub fn any_perpendicular(axis: Vec3) -> Vec3 {
    let c = axis.cross(Vec3::Y);
    if c.length_squared() > DEGENERATE_LENGTH * DEGENERATE_LENGTH {
        return c.normalize();
    }
    let c = axis.cross(Vec3::X);
    if c.length_squared() > DEGENERATE_LENGTH * DEGENERATE_LENGTH {
        c.normalize()
    } else {
        Vec3::Z
    }
}

/// Orthonormal tangent pair for a unit normal.
#[inline]
pub fn tangent_basis(normal: Vec3) -> (Vec3, Vec3) {
    let t1 = any_perpendicular(normal);
    let t2 = normal.cross(t1).normalize_or_zero();
    (t1, t2)
}

/// FNV-1a accumulator over raw float bits, used for geometry fingerprints.
#[derive(Clone, Copy, Debug)]
pub struct Fingerprint(u64);

impl Fingerprint {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    pub fn new() -> Self {
        Self(Self::OFFSET)
    }

    #[inline]
    pub fn write_u32(&mut self, v: u32) {
        for byte in v.to_le_bytes() {
            self.0 ^= byte as u64;
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    /// Hashes the bit pattern, with `-0.0` folded onto `0.0`.
    #[inline]
    pub fn write_f32(&mut self, v: f32) {
        let v = if v == 0.0 { 0.0 } else { v };
        self.write_u32(v.to_bits());
    }

    #[inline]
    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}
