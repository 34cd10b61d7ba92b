//! Screen-space effect math for the pattern engine.
//!
//! Each function is one stage of the fixed chain and is a no-op when its
//! intensity is zero. UVs are top-down, `[0, 1]` across the frame.

use crate::grading::luma;
use crate::hash::{
    cell_hash, value_noise, GLITCH_SHIFT_SALT, GLITCH_TRIGGER_SALT, JITTER_X_SALT, JITTER_Y_SALT,
};
use crate::schema::{ColorPalette, PostEffects};

/// Final luminance below this is treated as black by `make_black_transparent`.
pub const BLACK_LUMA_THRESHOLD: f32 = 0.01;

/// Barrel warp. `None` when the warped point leaves the screen.
pub fn curvature(uv: [f32; 2], amount: f32) -> Option<[f32; 2]> {
    if amount <= 0.0 {
        return Some(uv);
    }
    let cx = uv[0] * 2.0 - 1.0;
    let cy = uv[1] * 2.0 - 1.0;
    let factor = 1.0 + amount * (cx * cx + cy * cy);
    let warped = [cx * factor * 0.5 + 0.5, cy * factor * 0.5 + 0.5];
    if warped.iter().all(|c| (0.0..=1.0).contains(c)) {
        Some(warped)
    } else {
        None
    }
}

pub fn wave(uv: [f32; 2], post: &PostEffects, time: f32) -> [f32; 2] {
    if post.wave_amplitude <= 0.0 {
        return uv;
    }
    let phase = time * post.wave_speed;
    let x = uv[0] + (uv[1] * post.wave_frequency + phase).sin() * post.wave_amplitude;
    let y = uv[1] + (x * post.wave_frequency + phase).cos() * post.wave_amplitude;
    [x, y]
}

/// Fractional cell offset for the current jitter time bucket.
pub fn jitter(cell: [i32; 2], post: &PostEffects, time: f32) -> [f32; 2] {
    if post.jitter_intensity <= 0.0 {
        return [0.0, 0.0];
    }
    let bucket = (time * post.jitter_speed).floor() as i32;
    let spread = post.jitter_intensity * 2.0;
    [
        (cell_hash(cell[1], bucket, JITTER_X_SALT) - 0.5) * spread,
        (cell_hash(cell[0], bucket, JITTER_Y_SALT) - 0.5) * spread,
    ]
}

/// Horizontal cell shift for a glitching row, zero when the row is clean.
pub fn glitch_shift(row: i32, post: &PostEffects, time: f32) -> f32 {
    if post.glitch_intensity <= 0.0 || post.glitch_frequency <= 0.0 {
        return 0.0;
    }
    let tick = (time * post.glitch_frequency).floor() as i32;
    if cell_hash(tick, row, GLITCH_TRIGGER_SALT) < post.glitch_intensity {
        (cell_hash(tick, row, GLITCH_SHIFT_SALT) - 0.5) * 20.0
    } else {
        0.0
    }
}

/// Additive animated noise for a sampled color.
pub fn noise_offset(uv: [f32; 2], post: &PostEffects, time: f32) -> f32 {
    if post.noise_intensity <= 0.0 {
        return 0.0;
    }
    let drift = time * post.noise_speed;
    let value = value_noise(uv[0] * post.noise_scale + drift, uv[1] * post.noise_scale + drift);
    (value - 0.5) * post.noise_intensity
}

pub fn apply_palette(rgb: [f32; 3], palette: ColorPalette) -> [f32; 3] {
    let lum = luma(rgb);
    match palette {
        ColorPalette::Original => rgb,
        ColorPalette::Green => [0.1, lum * 0.9, 0.1],
        ColorPalette::Amber => [lum, lum * 0.6, lum * 0.2],
        ColorPalette::Cyan => [0.0, lum * 0.8, lum],
        ColorPalette::Blue => [0.1, 0.2, lum],
    }
}

/// Additive glow from the pointer, both positions in physical pixels.
pub fn mouse_glow(pixel: [f32; 2], mouse: [f32; 2], post: &PostEffects) -> f32 {
    if !post.mouse_glow_enabled {
        return 0.0;
    }
    let dx = pixel[0] - mouse[0];
    let dy = pixel[1] - mouse[1];
    let dist = (dx * dx + dy * dy).sqrt();
    (-dist / post.mouse_glow_radius).exp() * post.mouse_glow_intensity
}

/// Multiplier for scanline darkening at screen row `uv_y`.
pub fn scanline_factor(uv_y: f32, post: &PostEffects) -> f32 {
    if post.scanline_intensity <= 0.0 {
        return 1.0;
    }
    let line = (uv_y * post.scanline_count * std::f32::consts::PI).sin() * 0.5 + 0.5;
    1.0 - line * post.scanline_intensity
}

pub fn vignette_factor(uv: [f32; 2], post: &PostEffects) -> f32 {
    if post.vignette_intensity <= 0.0 {
        return 1.0;
    }
    let cx = uv[0] * 2.0 - 1.0;
    let cy = uv[1] * 2.0 - 1.0;
    let vignette = 1.0 - (cx * cx + cy * cy) / post.vignette_radius;
    1.0 + (vignette - 1.0) * post.vignette_intensity
}

pub fn is_black(rgb: [f32; 3]) -> bool {
    luma(rgb) < BLACK_LUMA_THRESHOLD
}
