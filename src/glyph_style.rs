//! Procedural sub-cell patterns for the pixel-pattern engine.
//!
//! Every style is an independent piecewise table over brightness bands; no
//! style shares logic with another. `p` is the position inside the cell with
//! `p.y` measured bottom-up, matching the shader.

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GlyphStyle {
    #[default]
    Standard,
    Dense,
    Minimal,
    Blocks,
    StandardDots,
    MeldingDots,
    AsciiCharactersMinimal,
    AsciiCharactersNormal,
}

impl GlyphStyle {
    pub const ALL: [GlyphStyle; 8] = [
        Self::Standard,
        Self::Dense,
        Self::Minimal,
        Self::Blocks,
        Self::StandardDots,
        Self::MeldingDots,
        Self::AsciiCharactersMinimal,
        Self::AsciiCharactersNormal,
    ];

    /// Unknown ids fall back to [`GlyphStyle::Standard`].
    pub fn from_id(id: i64) -> Self {
        usize::try_from(id)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .unwrap_or_default()
    }

    pub fn id(self) -> u32 {
        match self {
            Self::Standard => 0,
            Self::Dense => 1,
            Self::Minimal => 2,
            Self::Blocks => 3,
            Self::StandardDots => 4,
            Self::MeldingDots => 5,
            Self::AsciiCharactersMinimal => 6,
            Self::AsciiCharactersNormal => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Dense => "dense",
            Self::Minimal => "minimal",
            Self::Blocks => "blocks",
            Self::StandardDots => "standard-dots",
            Self::MeldingDots => "melding-dots",
            Self::AsciiCharactersMinimal => "ascii-characters-minimal",
            Self::AsciiCharactersNormal => "ascii-characters-normal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "dots" => Some(Self::StandardDots),
            "melding" => Some(Self::MeldingDots),
            other => Self::ALL.into_iter().find(|style| style.name() == other),
        }
    }
}

impl Serialize for GlyphStyle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for GlyphStyle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(i64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Ok(Self::from_id(id)),
            Raw::Name(name) => Self::from_name(&name).ok_or_else(|| {
                D::Error::custom(format!(
                    "unknown style '{name}', expected one of: {}",
                    Self::ALL.map(GlyphStyle::name).join(", ")
                ))
            }),
        }
    }
}

/// Dot sizing for the two circular styles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DotShape {
    pub blur_amount: f32,
    pub min_size: f32,
    pub max_size: f32,
}

impl Default for DotShape {
    fn default() -> Self {
        Self {
            blur_amount: 1.0,
            min_size: 0.2,
            max_size: 1.8,
        }
    }
}

/// Coverage in `[0, 1]` of `style` at intra-cell position `p` for a cell of
/// the given brightness.
pub fn coverage(style: GlyphStyle, brightness: f32, p: [f32; 2], dots: &DotShape) -> f32 {
    let b = brightness.clamp(0.0, 1.0);
    let p = [p[0].clamp(0.0, 0.99999), p[1].clamp(0.0, 0.99999)];
    match style {
        GlyphStyle::Standard => standard(b, grid(p, 4.0)),
        GlyphStyle::Dense => dense(b, grid(p, 4.0)),
        GlyphStyle::Minimal => minimal(b, grid(p, 4.0)),
        GlyphStyle::Blocks => blocks(b, (p[1] * 7.0).floor()),
        GlyphStyle::StandardDots => standard_dots(b, center_distance(p), dots),
        GlyphStyle::MeldingDots => melding_dots(b, center_distance(p), dots),
        GlyphStyle::AsciiCharactersMinimal => ascii_minimal(b, grid(p, 5.0)),
        GlyphStyle::AsciiCharactersNormal => ascii_normal(b, grid(p, 5.0)),
    }
}

fn grid(p: [f32; 2], divisions: f32) -> (f32, f32) {
    ((p[0] * divisions).floor(), (p[1] * divisions).floor())
}

fn center_distance(p: [f32; 2]) -> f32 {
    let dx = (p[0] - 0.5) * 2.0;
    let dy = (p[1] - 0.5) * 2.0;
    (dx * dx + dy * dy).sqrt()
}

fn pick(condition: bool, on: f32, off: f32) -> f32 {
    if condition {
        on
    } else {
        off
    }
}

fn standard(b: f32, (x, y): (f32, f32)) -> f32 {
    if b < 0.2 {
        pick(x == 1.0 && y == 1.0, 0.3, 0.0)
    } else if b < 0.35 {
        pick((x == 1.0 || x == 2.0) && (y == 1.0 || y == 2.0), 1.0, 0.0)
    } else if b < 0.5 {
        pick(y == 1.0 || y == 2.0, 1.0, 0.0)
    } else if b < 0.65 {
        if y == 0.0 || y == 3.0 {
            1.0
        } else {
            pick(y == 1.0 || y == 2.0, 0.5, 0.0)
        }
    } else if b < 0.8 {
        pick(x == 0.0 || x == 2.0 || y == 0.0 || y == 2.0, 1.0, 0.3)
    } else {
        1.0
    }
}

fn dense(b: f32, (x, y): (f32, f32)) -> f32 {
    if b < 0.15 {
        pick(x == 2.0 && y == 2.0, 0.2, 0.0)
    } else if b < 0.25 {
        pick((x == 1.0 && y == 2.0) || (x == 2.0 && y == 1.0), 0.4, 0.0)
    } else if b < 0.35 {
        pick((x == 1.0 || x == 2.0) && (y == 1.0 || y == 2.0), 0.6, 0.0)
    } else if b < 0.45 {
        pick(x == 1.0 || x == 2.0, 0.7, 0.0)
    } else if b < 0.55 {
        pick(y == 1.0 || y == 2.0, 0.8, 0.2)
    } else if b < 0.65 {
        pick(x + y != 0.0, 0.85, 0.3)
    } else if b < 0.75 {
        pick(x == 0.0 || x == 3.0 || y == 0.0 || y == 3.0, 1.0, 0.6)
    } else if b < 0.85 {
        pick((x == 0.0 && y == 0.0) || (x == 3.0 && y == 3.0), 0.5, 1.0)
    } else {
        1.0
    }
}

fn minimal(b: f32, (x, y): (f32, f32)) -> f32 {
    if b < 0.25 {
        0.0
    } else if b < 0.4 {
        pick(x == 2.0 && y == 2.0, 0.5, 0.0)
    } else if b < 0.55 {
        pick((x == 1.0 || x == 2.0) && y == 2.0, 0.7, 0.0)
    } else if b < 0.7 {
        pick(x == 1.0 || x == 2.0, 0.85, 0.0)
    } else if b < 0.85 {
        pick(y == 1.0 || y == 2.0, 1.0, 0.0)
    } else {
        1.0
    }
}

// Seven horizontal bands, 0 at the bottom of the cell.
fn blocks(b: f32, band: f32) -> f32 {
    if b < 0.08 {
        pick(band == 6.0, 0.8, 0.0)
    } else if b < 0.167 {
        pick(band == 6.0, 1.0, 0.0)
    } else if b < 0.25 {
        pick(band >= 5.0, 1.0, 0.0)
    } else if b < 0.33 {
        pick(band >= 4.0, 1.0, 0.0)
    } else if b < 0.45 {
        pick(band >= 3.0, 1.0, 0.0)
    } else if b < 0.58 {
        pick(band >= 2.0, 1.0, 0.0)
    } else if b < 0.72 {
        pick(band >= 1.0, 1.0, 0.0)
    } else {
        1.0
    }
}

fn size_multiplier(b: f32, dots: &DotShape) -> f32 {
    dots.min_size + (dots.max_size - dots.min_size) * b
}

fn standard_dots(b: f32, dist: f32, dots: &DotShape) -> f32 {
    let size = size_multiplier(b, dots);
    if b < 0.2 {
        pick(dist < 0.3 * size, 0.3, 0.0)
    } else if b < 0.35 {
        pick(dist < 0.5 * size, 1.0, 0.0)
    } else if b < 0.5 {
        pick(dist < 0.7 * size, 1.0, 0.0)
    } else if b < 0.65 {
        if dist < 0.85 * size {
            1.0
        } else {
            pick(dist < size, 0.5, 0.0)
        }
    } else if b < 0.8 {
        pick(dist < size, 1.0, 0.3)
    } else {
        1.0
    }
}

fn melding_dots(b: f32, dist: f32, dots: &DotShape) -> f32 {
    let size = size_multiplier(b, dots);
    let blur = dots.blur_amount;
    // (outer edge, inner edge) per band; the outer edge grows with blur.
    let (outer, inner, gain) = if b < 0.2 {
        (0.4, 0.2, 0.3)
    } else if b < 0.35 {
        (0.6, 0.4, 1.0)
    } else if b < 0.5 {
        (0.9, 0.7, 1.0)
    } else if b < 0.65 {
        (1.2, 0.9, 1.0)
    } else if b < 0.8 {
        (1.5, 1.1, 1.0)
    } else {
        (1.8, 1.3, 1.0)
    };
    smooth_step(outer * blur * size, inner * size, dist) * gain
}

fn ascii_minimal(b: f32, (x, y): (f32, f32)) -> f32 {
    if b < 0.125 {
        glyph_dot(x, y)
    } else if b < 0.25 {
        glyph_colon(x, y)
    } else if b < 0.375 {
        glyph_dash(x, y)
    } else if b < 0.5 {
        glyph_plus(x, y)
    } else if b < 0.625 {
        glyph_asterisk(x, y)
    } else if b < 0.75 {
        glyph_hash(x, y)
    } else if b < 0.875 {
        glyph_percent(x, y)
    } else {
        glyph_at(x, y)
    }
}

fn ascii_normal(b: f32, (x, y): (f32, f32)) -> f32 {
    if b < 0.0625 {
        pick(x == 2.0 && y == 4.0, 1.0, 0.0)
    } else if b < 0.125 {
        glyph_dot(x, y)
    } else if b < 0.1875 {
        pick(x == 2.0 && (y == 2.0 || y == 1.0), 1.0, 0.0)
    } else if b < 0.25 {
        glyph_dash(x, y)
    } else if b < 0.3125 {
        glyph_colon(x, y)
    } else if b < 0.375 {
        pick(x == 2.0 && (y == 1.0 || y == 3.0 || y == 4.0), 1.0, 0.0)
    } else if b < 0.4375 {
        pick(x == 2.0 && y >= 1.0, 1.0, 0.0)
    } else if b < 0.5 {
        pick(x == 2.0, 1.0, 0.0)
    } else if b < 0.5625 {
        glyph_plus(x, y)
    } else if b < 0.625 {
        pick((y == 1.0 || y == 3.0) && x >= 1.0 && x <= 3.0, 1.0, 0.0)
    } else if b < 0.6875 {
        glyph_asterisk(x, y)
    } else if b < 0.75 {
        glyph_hash(x, y)
    } else if b < 0.8125 {
        glyph_percent(x, y)
    } else if b < 0.875 {
        pick(x + y == 4.0 || x == y || (x == 0.0 && y == 2.0), 1.0, 0.0)
    } else if b < 0.9375 {
        glyph_at(x, y)
    } else {
        let stems = x == 0.0 || x == 4.0;
        let shoulders = (x == 1.0 || x == 3.0) && y >= 3.0;
        pick(stems || shoulders || (x == 2.0 && y == 4.0), 1.0, 0.0)
    }
}

fn glyph_dot(x: f32, y: f32) -> f32 {
    pick(x == 2.0 && y == 2.0, 1.0, 0.0)
}

fn glyph_colon(x: f32, y: f32) -> f32 {
    pick(x == 2.0 && (y == 1.0 || y == 3.0), 1.0, 0.0)
}

fn glyph_dash(x: f32, y: f32) -> f32 {
    pick(y == 2.0 && x >= 1.0 && x <= 3.0, 1.0, 0.0)
}

fn glyph_plus(x: f32, y: f32) -> f32 {
    pick(x == 2.0 || y == 2.0, 1.0, 0.0)
}

fn glyph_asterisk(x: f32, y: f32) -> f32 {
    pick(x == 2.0 || y == 2.0 || x == y || x + y == 4.0, 1.0, 0.0)
}

fn glyph_hash(x: f32, y: f32) -> f32 {
    pick(x == 1.0 || x == 3.0 || y == 1.0 || y == 3.0, 1.0, 0.0)
}

fn glyph_percent(x: f32, y: f32) -> f32 {
    let accents = (x == 1.0 && y == 4.0) || (x == 3.0 && y == 0.0);
    pick(x == y || accents, 1.0, 0.0)
}

fn glyph_at(x: f32, y: f32) -> f32 {
    let dist = ((x - 2.0) * (x - 2.0) + (y - 2.0) * (y - 2.0)).sqrt();
    pick((dist > 1.2 && dist < 2.2) || (x >= 2.0 && y == 2.0), 1.0, 0.0)
}

/// Hermite step that also accepts `edge0 > edge1` (falling edge). Equal edges
/// degrade to a hard threshold that is 1 below the edge.
pub fn smooth_step(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge0 == edge1 {
        return pick(x < edge0, 1.0, 0.0);
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
