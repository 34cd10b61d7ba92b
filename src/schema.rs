use anyhow::{bail, Result};
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};

use crate::charset::CharacterSet;
use crate::glyph_style::{DotShape, GlyphStyle};

/// Every tunable knob of both pipelines. One snapshot is taken per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EffectParameters {
    pub cell_size: f32,
    pub cell_spacing: f32,
    pub style: GlyphStyle,
    pub character_set: CharacterSet,
    pub invert: bool,
    pub color_mode: bool,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub dots: DotShape,
    pub density: DensityMaskConfig,
    pub background: BackgroundGrading,
    pub post: PostEffects,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            cell_size: 16.0,
            cell_spacing: 0.0,
            style: GlyphStyle::Standard,
            character_set: CharacterSet::Basic,
            invert: false,
            color_mode: true,
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            dots: DotShape::default(),
            density: DensityMaskConfig::default(),
            background: BackgroundGrading::default(),
            post: PostEffects::default(),
        }
    }
}

impl EffectParameters {
    pub fn validate(&self) -> Result<()> {
        check_range("cell_size", self.cell_size, 2.0, 128.0)?;
        check_range("cell_spacing", self.cell_spacing, -0.5, 0.5)?;
        check_range("brightness", self.brightness, -0.5, 0.5)?;
        check_range("contrast", self.contrast, 0.5, 2.0)?;
        check_range("saturation", self.saturation, 0.0, 2.0)?;

        check_range("dots.blur_amount", self.dots.blur_amount, 0.5, 3.0)?;
        check_range("dots.min_size", self.dots.min_size, 0.1, 1.0)?;
        check_range("dots.max_size", self.dots.max_size, 1.0, 3.0)?;

        self.density.validate()?;
        self.background.validate()?;
        self.post.validate()?;
        Ok(())
    }

    /// `cell_size * (1 + spacing)` in logical pixels.
    pub fn effective_cell_size(&self) -> f32 {
        self.cell_size * (1.0 + self.cell_spacing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DensityMode {
    #[default]
    None,
    Uniform,
    #[serde(alias = "linear-gradient")]
    GradientLinear,
    #[serde(alias = "radial-gradient")]
    GradientRadial,
    LogoMask,
    ImageMask,
}

impl DensityMode {
    pub const ALL: [DensityMode; 6] = [
        Self::None,
        Self::Uniform,
        Self::GradientLinear,
        Self::GradientRadial,
        Self::LogoMask,
        Self::ImageMask,
    ];

    pub fn id(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Uniform => 1,
            Self::GradientLinear => 2,
            Self::GradientRadial => 3,
            Self::LogoMask => 4,
            Self::ImageMask => 5,
        }
    }

    pub fn uses_mask(self) -> bool {
        matches!(self, Self::LogoMask | Self::ImageMask)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientDirection {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

impl GradientDirection {
    pub fn id(self) -> u32 {
        match self {
            Self::Up => 0,
            Self::Down => 1,
            Self::Left => 2,
            Self::Right => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DensityMaskConfig {
    pub mode: DensityMode,
    /// Uniform keep percentage.
    pub cell_density: f32,
    pub density_start: f32,
    pub density_end: f32,
    pub gradient_direction: GradientDirection,
    pub gradient_midpoint: f32,
    pub random_seed: u32,
    pub mask_scale: f32,
    pub mask_offset_x: f32,
    pub mask_offset_y: f32,
}

impl Default for DensityMaskConfig {
    fn default() -> Self {
        Self {
            mode: DensityMode::None,
            cell_density: 100.0,
            density_start: 0.0,
            density_end: 100.0,
            gradient_direction: GradientDirection::Up,
            gradient_midpoint: 0.5,
            random_seed: 0,
            mask_scale: 1.0,
            mask_offset_x: 0.0,
            mask_offset_y: 0.0,
        }
    }
}

impl DensityMaskConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("density.cell_density", self.cell_density, 0.0, 100.0)?;
        check_range("density.density_start", self.density_start, 0.0, 100.0)?;
        check_range("density.density_end", self.density_end, 0.0, 100.0)?;
        check_range("density.gradient_midpoint", self.gradient_midpoint, 0.0, 1.0)?;
        check_range("density.mask_scale", self.mask_scale, 0.1, 10.0)?;
        check_range("density.mask_offset_x", self.mask_offset_x, -2.0, 2.0)?;
        check_range("density.mask_offset_y", self.mask_offset_y, -2.0, 2.0)?;
        Ok(())
    }
}

/// Grading applied instead of the foreground grading to pixels that match the
/// scene backdrop. The defaults are identity, i.e. the backdrop is left alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackgroundGrading {
    pub enabled: bool,
    pub color: HexColor,
    /// Euclidean RGB distance in `[0, 1]` channel units.
    pub tolerance: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for BackgroundGrading {
    fn default() -> Self {
        Self {
            enabled: false,
            color: HexColor::from_rgb8(0x5c, 0x5c, 0x5c),
            tolerance: 0.1,
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

impl BackgroundGrading {
    pub fn validate(&self) -> Result<()> {
        check_range("background.tolerance", self.tolerance, 0.0, 2.0)?;
        check_range("background.brightness", self.brightness, -0.5, 0.5)?;
        check_range("background.contrast", self.contrast, 0.5, 2.0)?;
        check_range("background.saturation", self.saturation, 0.0, 2.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorPalette {
    #[default]
    Original,
    Green,
    Amber,
    Cyan,
    Blue,
}

impl ColorPalette {
    pub const ALL: [ColorPalette; 5] = [
        Self::Original,
        Self::Green,
        Self::Amber,
        Self::Cyan,
        Self::Blue,
    ];

    pub fn id(self) -> u32 {
        match self {
            Self::Original => 0,
            Self::Green => 1,
            Self::Amber => 2,
            Self::Cyan => 3,
            Self::Blue => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Green => "green",
            Self::Amber => "amber",
            Self::Cyan => "cyan",
            Self::Blue => "blue",
        }
    }
}

/// Screen-space effects of the pattern engine. Zero intensity bypasses a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PostEffects {
    pub scanline_intensity: f32,
    pub scanline_count: f32,
    pub target_fps: f32,
    pub jitter_intensity: f32,
    pub jitter_speed: f32,
    pub mouse_glow_enabled: bool,
    pub mouse_glow_radius: f32,
    pub mouse_glow_intensity: f32,
    pub vignette_intensity: f32,
    pub vignette_radius: f32,
    pub color_palette: ColorPalette,
    pub curvature: f32,
    pub aberration_strength: f32,
    pub noise_intensity: f32,
    pub noise_scale: f32,
    pub noise_speed: f32,
    pub wave_amplitude: f32,
    pub wave_frequency: f32,
    pub wave_speed: f32,
    pub glitch_intensity: f32,
    pub glitch_frequency: f32,
    pub make_black_transparent: bool,
}

impl Default for PostEffects {
    fn default() -> Self {
        Self {
            scanline_intensity: 0.0,
            scanline_count: 200.0,
            target_fps: 0.0,
            jitter_intensity: 0.0,
            jitter_speed: 1.0,
            mouse_glow_enabled: false,
            mouse_glow_radius: 200.0,
            mouse_glow_intensity: 1.5,
            vignette_intensity: 0.0,
            vignette_radius: 0.8,
            color_palette: ColorPalette::Original,
            curvature: 0.0,
            aberration_strength: 0.0,
            noise_intensity: 0.0,
            noise_scale: 1.0,
            noise_speed: 1.0,
            wave_amplitude: 0.0,
            wave_frequency: 10.0,
            wave_speed: 1.0,
            glitch_intensity: 0.0,
            glitch_frequency: 0.0,
            make_black_transparent: false,
        }
    }
}

impl PostEffects {
    pub fn validate(&self) -> Result<()> {
        check_range("post.scanline_intensity", self.scanline_intensity, 0.0, 1.0)?;
        check_range("post.scanline_count", self.scanline_count, 1.0, 4000.0)?;
        check_range("post.target_fps", self.target_fps, 0.0, 240.0)?;
        check_range("post.jitter_intensity", self.jitter_intensity, 0.0, 4.0)?;
        check_range("post.jitter_speed", self.jitter_speed, 0.0, 100.0)?;
        check_range("post.mouse_glow_radius", self.mouse_glow_radius, 1.0, 4000.0)?;
        check_range("post.mouse_glow_intensity", self.mouse_glow_intensity, 0.0, 10.0)?;
        check_range("post.vignette_intensity", self.vignette_intensity, 0.0, 1.0)?;
        check_range("post.vignette_radius", self.vignette_radius, 0.05, 4.0)?;
        check_range("post.curvature", self.curvature, 0.0, 1.0)?;
        check_range("post.aberration_strength", self.aberration_strength, 0.0, 0.1)?;
        check_range("post.noise_intensity", self.noise_intensity, 0.0, 1.0)?;
        check_range("post.noise_scale", self.noise_scale, 0.01, 1000.0)?;
        check_range("post.noise_speed", self.noise_speed, 0.0, 100.0)?;
        check_range("post.wave_amplitude", self.wave_amplitude, 0.0, 0.5)?;
        check_range("post.wave_frequency", self.wave_frequency, 0.0, 200.0)?;
        check_range("post.wave_speed", self.wave_speed, 0.0, 100.0)?;
        check_range("post.glitch_intensity", self.glitch_intensity, 0.0, 1.0)?;
        check_range("post.glitch_frequency", self.glitch_frequency, 0.0, 120.0)?;
        Ok(())
    }
}

/// RGB color in `[0, 1]` written as `#rrggbb` in presets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexColor(pub [f32; 3]);

impl HexColor {
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
        ])
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let hex = raw.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("invalid color '{}': bad hex digit", raw);
        }
        let expanded = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
            6 => hex.to_owned(),
            _ => bail!("invalid color '{}': expected #rgb or #rrggbb", raw),
        };
        let channel = |offset: usize| -> Result<u8> {
            u8::from_str_radix(&expanded[offset..offset + 2], 16)
                .map_err(|_| anyhow::anyhow!("invalid color '{}': bad hex digit", raw))
        };
        Ok(Self::from_rgb8(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl Serialize for HexColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HexColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if !value.is_finite() {
        bail!("{name} must be finite, got {value}");
    }
    if value < min || value > max {
        bail!("{name} must be in [{min}, {max}], got {value}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EffectParameters::default()
            .validate()
            .expect("defaults should be valid");
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_fields() {
        let params: EffectParameters = serde_yaml::from_str(
            r#"
cell_size: 12
style: blocks
density:
  mode: gradient-linear
  gradient_direction: left
post:
  color_palette: amber
"#,
        )
        .expect("preset should parse");
        assert_eq!(params.cell_size, 12.0);
        assert_eq!(params.style, GlyphStyle::Blocks);
        assert_eq!(params.density.mode, DensityMode::GradientLinear);
        assert_eq!(params.density.gradient_direction, GradientDirection::Left);
        assert_eq!(params.density.density_end, 100.0);
        assert_eq!(params.post.color_palette, ColorPalette::Amber);
        assert_eq!(params.post.scanline_count, 200.0);
        assert!(params.color_mode);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = serde_yaml::from_str::<EffectParameters>("cell_sise: 12\n")
            .expect_err("typo should be rejected");
        assert!(error.to_string().contains("cell_sise"));
    }

    #[test]
    fn out_of_range_contrast_names_the_field() {
        let mut params = EffectParameters::default();
        params.contrast = 3.0;
        let message = params.validate().expect_err("contrast too high").to_string();
        assert!(message.contains("contrast"), "{message}");
        assert!(message.contains("[0.5, 2]"), "{message}");
    }

    #[test]
    fn nan_is_rejected() {
        let mut params = EffectParameters::default();
        params.post.curvature = f32::NAN;
        assert!(params.validate().is_err());
    }

    #[test]
    fn hex_colors_parse_and_print() {
        let color = HexColor::parse("#5c5c5c").expect("hex");
        assert_eq!(color.to_hex(), "#5c5c5c");
        assert_eq!(HexColor::parse("fff").expect("short hex").0, [1.0, 1.0, 1.0]);
        assert!(HexColor::parse("#12345").is_err());
        assert!(HexColor::parse("#zzzzzz").is_err());
    }

    #[test]
    fn effective_cell_size_includes_spacing() {
        let mut params = EffectParameters::default();
        params.cell_spacing = 0.25;
        assert_eq!(params.effective_cell_size(), 20.0);
    }

    #[test]
    fn parameters_round_trip_through_yaml() {
        let mut params = EffectParameters::default();
        params.character_set = CharacterSet::Braille;
        params.background.color = HexColor::parse("#102030").expect("hex");
        let yaml = serde_yaml::to_string(&params).expect("serialize");
        let parsed: EffectParameters = serde_yaml::from_str(&yaml).expect("reparse");
        assert_eq!(parsed.character_set, CharacterSet::Braille);
        assert_eq!(parsed.background.color.to_hex(), "#102030");
    }
}
