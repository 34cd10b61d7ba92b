//! Literal character palettes for the CPU glyph compositor.

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CharacterSet {
    #[default]
    Basic,
    Short,
    Medium,
    Extended,
    Classic,
    Ramp,
    Blocks,
    BlocksExtended,
    Braille,
    Numeric,
    Alphanumeric,
    Binary,
    Matrix,
    Retro,
    Minimal,
    Dots,
    Lines,
}

const PALETTES: [(CharacterSet, &str, &str); 17] = [
    (CharacterSet::Basic, "basic", " .:-=+*#%@"),
    (CharacterSet::Short, "short", " .:;+=xX$&#"),
    (
        CharacterSet::Medium,
        "medium",
        " .'`^\",:;Il!i><~+_-?][}{1)(|\\/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$",
    ),
    (
        CharacterSet::Extended,
        "extended",
        " .\",:;!~+-<>i1?][}{|)(\\/_tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$",
    ),
    (CharacterSet::Classic, "classic", " .:-=+*#%@"),
    (CharacterSet::Ramp, "ramp", " ._-=+*#%@"),
    (CharacterSet::Blocks, "blocks", " ░▒▓█"),
    (CharacterSet::BlocksExtended, "blocksExtended", " ·:░▒▓█"),
    (CharacterSet::Braille, "braille", " ⡀⡄⡆⡇⣇⣧⣷⣿"),
    (CharacterSet::Numeric, "numeric", " 1234567890"),
    (
        CharacterSet::Alphanumeric,
        "alphanumeric",
        " 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    ),
    (CharacterSet::Binary, "binary", " 01"),
    (CharacterSet::Matrix, "matrix", " .0123456789"),
    (CharacterSet::Retro, "retro", " .:*oe&#%@"),
    (CharacterSet::Minimal, "minimal", " .-+=#"),
    (CharacterSet::Dots, "dots", " .·•○●"),
    (CharacterSet::Lines, "lines", " -_=≡═"),
];

impl CharacterSet {
    pub fn all() -> impl Iterator<Item = CharacterSet> {
        PALETTES.iter().map(|(set, _, _)| *set)
    }

    /// Unknown ids fall back to [`CharacterSet::Basic`].
    pub fn from_id(id: i64) -> Self {
        usize::try_from(id)
            .ok()
            .and_then(|index| PALETTES.get(index))
            .map(|(set, _, _)| *set)
            .unwrap_or_default()
    }

    pub fn id(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        PALETTES[self.id()].1
    }

    pub fn chars(self) -> &'static str {
        PALETTES[self.id()].2
    }

    /// Accepts the palette name case-insensitively, with `-`/`_` separators
    /// ignored (`blocks-extended` and `blocksExtended` both resolve).
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = fold_name(name);
        PALETTES
            .iter()
            .find(|(_, palette_name, _)| fold_name(palette_name) == wanted)
            .map(|(set, _, _)| *set)
    }

    pub fn palette(self) -> CharacterPalette {
        CharacterPalette::new(self.chars())
    }
}

fn fold_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl Serialize for CharacterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for CharacterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(i64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Ok(Self::from_id(id)),
            Raw::Name(name) => Self::from_name(&name)
                .ok_or_else(|| D::Error::custom(format!("unknown character set '{name}'"))),
        }
    }
}

/// An ordered brightness ramp of literal characters, darkest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterPalette {
    chars: Vec<char>,
}

impl CharacterPalette {
    pub fn new(ramp: &str) -> Self {
        let mut chars = ramp.chars().collect::<Vec<_>>();
        if chars.is_empty() {
            chars.push(' ');
        }
        Self { chars }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// `floor(b * (len - 1))`, clamped into the palette. Inversion is already
    /// folded into `b` by the grading stage.
    pub fn index_for(&self, brightness: f32) -> usize {
        let last = self.chars.len() - 1;
        let raw = (brightness.clamp(0.0, 1.0) * last as f32).floor();
        (raw.max(0.0) as usize).min(last)
    }

    pub fn glyph_for(&self, brightness: f32) -> char {
        self.chars[self.index_for(brightness)]
    }

    pub fn glyph_at(&self, index: usize) -> char {
        self.chars[index.min(self.chars.len() - 1)]
    }

    /// Relative ink of the glyph at `index`, 0 for the first (blank) entry.
    pub fn ink(&self, index: usize) -> f32 {
        let last = self.chars.len() - 1;
        if last == 0 {
            return 0.0;
        }
        index.min(last) as f32 / last as f32
    }

    pub fn as_str(&self) -> String {
        self.chars.iter().collect()
    }
}
