//! Stateless integer hashing shared by the density gate and the time-bucketed
//! post effects.
//!
//! The same integer ops are re-expressed in `shaders/wgsl/pattern.wgsl`, so a
//! given `(x, y, seed)` draws the identical value on both backends.

/// Salt for the horizontal component of cell jitter.
pub const JITTER_X_SALT: u32 = 0x6a09_e667;
/// Salt for the vertical component of cell jitter.
pub const JITTER_Y_SALT: u32 = 0xbb67_ae85;
/// Salt for the glitch trigger roll.
pub const GLITCH_TRIGGER_SALT: u32 = 0x3c6e_f372;
/// Salt for the glitch shift amount.
pub const GLITCH_SHIFT_SALT: u32 = 0xa54f_f53a;
/// Salt for value-noise lattice points.
pub const NOISE_SALT: u32 = 0x510e_527f;

const UNIT_SCALE: f32 = 1.0 / 16_777_216.0;

/// Murmur3 finalizer.
#[inline(always)]
pub const fn mix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[inline(always)]
pub const fn hash_u32(x: i32, y: i32, seed: u32) -> u32 {
    mix32(mix32(mix32(seed) ^ x as u32) ^ y as u32)
}

/// Uniform value in `[0, 1)` derived from the top 24 bits of [`hash_u32`].
///
/// 24 bits keep the result exactly representable as `f32`, which is what lets
/// the shader reproduce it bit for bit.
#[inline(always)]
pub fn cell_hash(x: i32, y: i32, seed: u32) -> f32 {
    (hash_u32(x, y, seed) >> 8) as f32 * UNIT_SCALE
}

/// Smooth 2D value noise over the integer lattice, output in `[0, 1]`.
pub fn value_noise(x: f32, y: f32) -> f32 {
    let ix = x.floor();
    let iy = y.floor();
    let fx = x - ix;
    let fy = y - iy;
    let (ix, iy) = (ix as i32, iy as i32);

    let a = cell_hash(ix, iy, NOISE_SALT);
    let b = cell_hash(ix.wrapping_add(1), iy, NOISE_SALT);
    let c = cell_hash(ix, iy.wrapping_add(1), NOISE_SALT);
    let d = cell_hash(ix.wrapping_add(1), iy.wrapping_add(1), NOISE_SALT);

    let ux = fx * fx * (3.0 - 2.0 * fx);
    let uy = fy * fy * (3.0 - 2.0 * fy);
    let top = a + (b - a) * ux;
    let bottom = c + (d - c) * ux;
    top + (bottom - top) * uy
}
