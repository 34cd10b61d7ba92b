use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use log::debug;
use tiny_skia::Pixmap;

/// 8-bit coverage for one glyph, placed relative to the top-left of its cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphBitmap {
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: usize,
    pub height: usize,
    pub bitmap: Vec<u8>,
}

/// Turns palette characters into coverage bitmaps at a pixel size.
///
/// `ink` is the glyph's relative darkness within its palette (0 blank, 1
/// densest); rasterizers without real outlines draw from it.
pub trait GlyphRasterizer {
    fn rasterize(&mut self, glyph: char, ink: f32, px: u32) -> Option<&GlyphBitmap>;
}

/// Font-free fallback: a centered square whose area tracks the glyph's ink.
#[derive(Debug, Default)]
pub struct BlockRasterizer {
    cache: HashMap<(u32, u32), GlyphBitmap>,
}

impl BlockRasterizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GlyphRasterizer for BlockRasterizer {
    fn rasterize(&mut self, glyph: char, ink: f32, px: u32) -> Option<&GlyphBitmap> {
        let ink = ink.clamp(0.0, 1.0);
        if glyph.is_whitespace() || ink <= 0.0 || px == 0 {
            return None;
        }
        let entry = self
            .cache
            .entry((ink.to_bits(), px))
            .or_insert_with(|| block_bitmap(ink, px));
        Some(&*entry)
    }
}

fn block_bitmap(ink: f32, px: u32) -> GlyphBitmap {
    let side = ((px as f32 * ink.sqrt()).round() as u32).clamp(1, px);
    let inset = ((px - side) / 2) as i32;
    let side = side as usize;
    GlyphBitmap {
        offset_x: inset,
        offset_y: inset,
        width: side,
        height: side,
        bitmap: vec![255; side * side],
    }
}

/// Rasterizes real outlines with `fontdue`; characters the font lacks fall
/// back to [`BlockRasterizer`].
pub struct FontRasterizer {
    font: Font,
    glyph_cache: HashMap<(char, u32), Option<GlyphBitmap>>,
    fallback: BlockRasterizer,
}

impl FontRasterizer {
    pub fn from_bytes(bytes: Vec<u8>, label: &str) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {label}: {error}"))?;
        Ok(Self {
            font,
            glyph_cache: HashMap::new(),
            fallback: BlockRasterizer::new(),
        })
    }

    pub fn from_path(font_path: &Path) -> Result<Self> {
        let bytes = std::fs::read(font_path)
            .with_context(|| format!("failed to read font file {}", font_path.display()))?;
        Self::from_bytes(bytes, &font_path.display().to_string())
    }

    pub fn supports(&self, glyph: char) -> bool {
        self.font.lookup_glyph_index(glyph) != 0
    }

    fn outline(&self, glyph: char, px: u32) -> Option<GlyphBitmap> {
        let size = px as f32;
        let (metrics, bitmap) = self.font.rasterize(glyph, size);
        if metrics.width == 0 || metrics.height == 0 {
            return None;
        }
        let ascent = self
            .font
            .horizontal_line_metrics(size)
            .map(|line| line.ascent)
            .unwrap_or(size * 0.8);
        Some(GlyphBitmap {
            offset_x: metrics.xmin,
            offset_y: ascent.round() as i32 - (metrics.height as i32 + metrics.ymin),
            width: metrics.width,
            height: metrics.height,
            bitmap,
        })
    }
}

impl GlyphRasterizer for FontRasterizer {
    fn rasterize(&mut self, glyph: char, ink: f32, px: u32) -> Option<&GlyphBitmap> {
        if glyph.is_whitespace() || px == 0 {
            return None;
        }
        if !self.supports(glyph) {
            debug!("font lacks U+{:04X}, drawing a block", glyph as u32);
            return self.fallback.rasterize(glyph, ink, px);
        }
        if !self.glyph_cache.contains_key(&(glyph, px)) {
            let bitmap = self.outline(glyph, px);
            self.glyph_cache.insert((glyph, px), bitmap);
        }
        self.glyph_cache.get(&(glyph, px)).and_then(Option::as_ref)
    }
}

/// Alpha-blends `glyph` in `color` onto an opaque pixmap with its cell corner
/// at `(x, y)`. Pixels outside the pixmap are skipped.
pub fn blend_glyph(pixmap: &mut Pixmap, x: i32, y: i32, glyph: &GlyphBitmap, color: [u8; 3]) {
    let frame_width = pixmap.width() as i32;
    let frame_height = pixmap.height() as i32;
    let frame = pixmap.data_mut();
    for row in 0..glyph.height {
        let py = y + glyph.offset_y + row as i32;
        if py < 0 || py >= frame_height {
            continue;
        }
        for col in 0..glyph.width {
            let px = x + glyph.offset_x + col as i32;
            if px < 0 || px >= frame_width {
                continue;
            }
            let coverage = glyph.bitmap[row * glyph.width + col];
            if coverage == 0 {
                continue;
            }
            let idx = ((py * frame_width + px) * 4) as usize;
            blend_pixel(frame, idx, [color[0], color[1], color[2], coverage]);
        }
    }
}

fn blend_pixel(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    let inv_alpha = 255_u16 - alpha;
    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    frame[idx + 3] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Color;

    fn black(width: u32, height: u32) -> Pixmap {
        let mut pixmap = Pixmap::new(width, height).expect("pixmap");
        pixmap.fill(Color::BLACK);
        pixmap
    }

    #[test]
    fn blocks_grow_with_ink() {
        let mut raster = BlockRasterizer::new();
        assert!(raster.rasterize(' ', 1.0, 10).is_none());
        assert!(raster.rasterize('.', 0.0, 10).is_none());
        let small = raster.rasterize('.', 0.25, 10).expect("block").width;
        let full = raster.rasterize('@', 1.0, 10).expect("block").clone();
        assert_eq!(small, 5);
        assert_eq!((full.width, full.height, full.offset_x), (10, 10, 0));
    }

    #[test]
    fn blocks_are_centered() {
        let mut raster = BlockRasterizer::new();
        let block = raster.rasterize('+', 0.36, 10).expect("block");
        assert_eq!(block.width, 6);
        assert_eq!((block.offset_x, block.offset_y), (2, 2));
    }

    #[test]
    fn blend_writes_color_and_clips_at_edges() {
        let mut pixmap = black(4, 4);
        let glyph = GlyphBitmap {
            offset_x: 0,
            offset_y: 0,
            width: 3,
            height: 3,
            bitmap: vec![255; 9],
        };
        blend_glyph(&mut pixmap, 2, 2, &glyph, [200, 100, 50]);
        let data = pixmap.data();
        assert_eq!(&data[(2 * 4 + 2) * 4..(2 * 4 + 2) * 4 + 4], &[200, 100, 50, 255]);
        assert_eq!(&data[0..4], &[0, 0, 0, 255]);
        assert_eq!(&data[(3 * 4 + 3) * 4..(3 * 4 + 3) * 4 + 4], &[200, 100, 50, 255]);
    }

    #[test]
    fn partial_coverage_mixes_with_the_background() {
        let mut pixmap = black(1, 1);
        let glyph = GlyphBitmap {
            offset_x: 0,
            offset_y: 0,
            width: 1,
            height: 1,
            bitmap: vec![128],
        };
        blend_glyph(&mut pixmap, 0, 0, &glyph, [255, 255, 255]);
        assert_eq!(pixmap.data()[0], 128);
    }

    #[test]
    fn garbage_font_bytes_are_rejected() {
        let result = FontRasterizer::from_bytes(b"definitely not a font".to_vec(), "junk");
        assert!(result.is_err());
    }

    #[test]
    fn missing_font_file_is_reported_with_path() {
        let Err(error) = FontRasterizer::from_path(Path::new("/no/such/font.ttf")) else {
            panic!("expected missing font error");
        };
        assert!(format!("{error:#}").contains("/no/such/font.ttf"));
    }
}
