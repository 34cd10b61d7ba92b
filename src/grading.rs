//! Brightness and color grading shared by both pipelines.
//!
//! Order is fixed: saturation, brightness offset, luma, contrast, invert.
//! `shaders/wgsl/pattern.wgsl` carries the same steps in `grade`.

use crate::schema::EffectParameters;

/// Callers skip pixels whose alpha is below this (no cell drawn).
pub const ALPHA_SKIP_THRESHOLD: u8 = 10;

const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingParams {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub invert: bool,
}

impl GradingParams {
    pub fn foreground(params: &EffectParameters) -> Self {
        Self {
            brightness: params.brightness,
            contrast: params.contrast,
            saturation: params.saturation,
            invert: params.invert,
        }
    }

    pub fn background(params: &EffectParameters) -> Self {
        Self {
            brightness: params.background.brightness,
            contrast: params.background.contrast,
            saturation: params.background.saturation,
            invert: params.invert,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Graded {
    /// Color after saturation and brightness offset, before contrast.
    pub rgb: [f32; 3],
    /// Final brightness in `[0, 1]`, inverted if requested.
    pub lum: f32,
}

pub fn luma(rgb: [f32; 3]) -> f32 {
    rgb[0] * LUMA_WEIGHTS[0] + rgb[1] * LUMA_WEIGHTS[1] + rgb[2] * LUMA_WEIGHTS[2]
}

pub fn grade(rgb: [f32; 3], params: &GradingParams) -> Graded {
    let mut rgb = rgb.map(|c| c.clamp(0.0, 1.0));

    if params.saturation != 1.0 {
        let gray = luma(rgb);
        rgb = rgb.map(|c| (gray + params.saturation * (c - gray)).clamp(0.0, 1.0));
    }

    if params.brightness != 0.0 {
        rgb = rgb.map(|c| (c + params.brightness).clamp(0.0, 1.0));
    }

    let mut lum = apply_contrast(luma(rgb), params.contrast);
    if params.invert {
        lum = 1.0 - lum;
    }

    Graded { rgb, lum }
}

pub fn apply_contrast(lum: f32, contrast: f32) -> f32 {
    ((lum - 0.5) * contrast + 0.5).clamp(0.0, 1.0)
}

/// Grades with the background values when the raw color sits within the
/// configured tolerance of the backdrop color.
pub fn grade_pixel(rgb: [f32; 3], params: &EffectParameters) -> Graded {
    if is_background(rgb, params) {
        grade(rgb, &GradingParams::background(params))
    } else {
        grade(rgb, &GradingParams::foreground(params))
    }
}

pub fn is_background(rgb: [f32; 3], params: &EffectParameters) -> bool {
    let background = &params.background;
    if !background.enabled {
        return false;
    }
    let [br, bg, bb] = background.color.0;
    let distance =
        ((rgb[0] - br).powi(2) + (rgb[1] - bg).powi(2) + (rgb[2] - bb).powi(2)).sqrt();
    distance <= background.tolerance
}

pub fn rgb8_to_unit(rgb: [u8; 3]) -> [f32; 3] {
    rgb.map(|c| f32::from(c) / 255.0)
}

pub fn unit_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::HexColor;

    fn identity() -> GradingParams {
        GradingParams {
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            invert: false,
        }
    }

    #[test]
    fn identity_grading_is_plain_luma() {
        let graded = grade([0.2, 0.4, 0.6], &identity());
        let expected = 0.299 * 0.2 + 0.587 * 0.4 + 0.114 * 0.6;
        assert!((graded.lum - expected).abs() < 1e-6);
        assert_eq!(graded.rgb, [0.2, 0.4, 0.6]);
    }

    #[test]
    fn zero_saturation_collapses_to_gray() {
        let params = GradingParams {
            saturation: 0.0,
            ..identity()
        };
        let graded = grade([1.0, 0.0, 0.0], &params);
        assert!((graded.rgb[0] - 0.299).abs() < 1e-6);
        assert!((graded.rgb[1] - 0.299).abs() < 1e-6);
        assert!((graded.rgb[2] - 0.299).abs() < 1e-6);
    }

    #[test]
    fn brightness_offset_clamps_channels() {
        let params = GradingParams {
            brightness: 0.5,
            ..identity()
        };
        let graded = grade([0.8, 0.1, 0.0], &params);
        for (actual, expected) in graded.rgb.iter().zip([1.0, 0.6, 0.5]) {
            assert!((actual - expected).abs() < 1e-6, "{actual} vs {expected}");
        }
    }

    #[test]
    fn contrast_output_stays_in_unit_range() {
        for contrast in [0.5_f32, 1.0, 1.5, 2.0, 10.0] {
            for step in 0..=20 {
                let lum = step as f32 / 20.0;
                let out = apply_contrast(lum, contrast);
                assert!((0.0..=1.0).contains(&out), "contrast {contrast} lum {lum}");
            }
        }
    }

    #[test]
    fn grayscale_ramp_is_monotonic_under_identity() {
        let mut previous = -1.0_f32;
        for value in 0..=255_u8 {
            let lum = grade(rgb8_to_unit([value; 3]), &identity()).lum;
            assert!(lum >= previous, "lum decreased at {value}");
            previous = lum;
        }
    }

    #[test]
    fn invert_is_applied_after_contrast() {
        let params = GradingParams {
            contrast: 2.0,
            invert: true,
            ..identity()
        };
        let graded = grade([0.9, 0.9, 0.9], &params);
        assert!((graded.lum - 0.0).abs() < 1e-6);
    }

    #[test]
    fn backdrop_pixels_skip_foreground_grading() {
        let mut params = EffectParameters::default();
        params.contrast = 2.0;
        params.saturation = 0.0;
        params.background.enabled = true;
        params.background.color = HexColor::parse("#5c5c5c").expect("hex");
        params.background.tolerance = 0.05;

        let backdrop = rgb8_to_unit([0x5c, 0x5d, 0x5b]);
        let graded = grade_pixel(backdrop, &params);
        assert_eq!(graded.rgb, backdrop);
        assert!((graded.lum - luma(backdrop)).abs() < 1e-6);

        let foreground = rgb8_to_unit([200, 40, 40]);
        let graded = grade_pixel(foreground, &params);
        assert!((graded.rgb[0] - graded.rgb[1]).abs() < 1e-6);
    }

    #[test]
    fn disabled_background_grading_never_matches() {
        let params = EffectParameters::default();
        assert!(!is_background(params.background.color.0, &params));
    }
}
