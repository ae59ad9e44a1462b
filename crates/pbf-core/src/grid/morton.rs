//! 63-bit Morton (Z-order) codes over 21-bit grid coordinates.

/// Largest coordinate representable per axis.
pub const MAX_COORD: u32 = (1 << 21) - 1;

/// Spread the low 21 bits of `v` so there are two zero bits between each.
#[inline]
fn part1by2(v: u32) -> u64 {
    let mut x = (v & MAX_COORD) as u64;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

#[inline]
fn compact1by2(v: u64) -> u32 {
    let mut x = v & 0x1249_2492_4924_9249;
    x = (x ^ (x >> 2)) & 0x10c3_0c30_c30c_30c3;
    x = (x ^ (x >> 4)) & 0x100f_00f0_0f00_f00f;
    x = (x ^ (x >> 8)) & 0x001f_0000_ff00_00ff;
    x = (x ^ (x >> 16)) & 0x001f_0000_0000_ffff;
    x = (x ^ (x >> 32)) & 0x0000_0000_001f_ffff;
    x as u32
}

/// Interleave `(x, y, z)` as `... z1 y1 x1 z0 y0 x0`.
#[inline]
pub fn encode(x: u32, y: u32, z: u32) -> u64 {
    part1by2(x) | (part1by2(y) << 1) | (part1by2(z) << 2)
}

#[inline]
pub fn decode(code: u64) -> (u32, u32, u32) {
    (compact1by2(code), compact1by2(code >> 1), compact1by2(code >> 2))
}
