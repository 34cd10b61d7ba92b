//! Frame sources that feed the pattern engine and glyph compositor.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use image::ImageReader;
use log::debug;

use crate::frame::{RenderFrame, RowOrder};
use crate::schema::HexColor;

/// Supplies a captured raster plus its logical size, once per request.
pub trait FrameSource {
    fn capture(&mut self, frame_index: u64) -> Result<RenderFrame>;

    /// Physical size of every frame this source produces.
    fn size(&self) -> (u32, u32);
}

/// A decoded still image, re-served on every capture.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    frame: RenderFrame,
}

impl StillImageSource {
    pub fn load(path: &Path, dpr: f32) -> Result<Self> {
        let image = ImageReader::open(path)
            .with_context(|| format!("failed to open image {}", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("failed to detect image format {}", path.display()))?
            .decode()
            .map_err(|error| anyhow!("failed to decode image {}: {error}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        debug!("loaded still image {} ({width}x{height} @ {dpr}x)", path.display());
        let frame = RenderFrame::with_pixel_ratio(width, height, dpr, image.into_raw())?;
        Ok(Self { frame })
    }

    pub fn from_frame(frame: RenderFrame) -> Self {
        Self { frame }
    }

    /// Re-stores the rows bottom-up, the way a GL framebuffer readback
    /// delivers them. Sampling results are unchanged.
    pub fn bottom_up(self) -> Result<Self> {
        if self.frame.row_order() == RowOrder::BottomUp {
            return Ok(self);
        }
        let row_bytes = self.frame.width() as usize * 4;
        let flipped = self
            .frame
            .as_raw()
            .chunks_exact(row_bytes)
            .rev()
            .flatten()
            .copied()
            .collect::<Vec<_>>();
        let frame = RenderFrame::with_logical_size(
            self.frame.width(),
            self.frame.height(),
            self.frame.logical_width(),
            self.frame.logical_height(),
            flipped,
        )?
        .with_row_order(RowOrder::BottomUp);
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &RenderFrame {
        &self.frame
    }
}

impl FrameSource for StillImageSource {
    fn capture(&mut self, _frame_index: u64) -> Result<RenderFrame> {
        Ok(self.frame.clone())
    }

    fn size(&self) -> (u32, u32) {
        (self.frame.width(), self.frame.height())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProceduralPattern {
    Solid(HexColor),
    /// Horizontal ramp that scrolls one full period every `period` frames.
    Gradient {
        from: HexColor,
        to: HexColor,
        period: u32,
    },
}

/// Synthetic scene so the loop can run without external assets.
#[derive(Debug, Clone)]
pub struct ProceduralSource {
    width: u32,
    height: u32,
    dpr: f32,
    pattern: ProceduralPattern,
}

impl ProceduralSource {
    pub fn new(width: u32, height: u32, dpr: f32, pattern: ProceduralPattern) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("procedural scene must be non-empty, got {width}x{height}");
        }
        if !(dpr > 0.0) {
            bail!("device pixel ratio must be positive, got {dpr}");
        }
        Ok(Self {
            width,
            height,
            dpr,
            pattern,
        })
    }

    fn color_at(&self, x: u32, frame_index: u64) -> [u8; 4] {
        match self.pattern {
            ProceduralPattern::Solid(color) => rgba8(color.0),
            ProceduralPattern::Gradient { from, to, period } => {
                let period = u64::from(period.max(1));
                let phase = (frame_index % period) as f32 / period as f32;
                let t = (x as f32 / self.width as f32 + phase).fract();
                // triangle wave so the scroll has no seam
                let t = 1.0 - (2.0 * t - 1.0).abs();
                let mixed = [0, 1, 2].map(|i| from.0[i] + (to.0[i] - from.0[i]) * t);
                rgba8(mixed)
            }
        }
    }
}

impl FrameSource for ProceduralSource {
    fn capture(&mut self, frame_index: u64) -> Result<RenderFrame> {
        let row = (0..self.width)
            .flat_map(|x| self.color_at(x, frame_index))
            .collect::<Vec<_>>();
        let rgba = row.repeat(self.height as usize);
        RenderFrame::with_pixel_ratio(self.width, self.height, self.dpr, rgba)
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn rgba8(rgb: [f32; 3]) -> [u8; 4] {
    let [r, g, b] = rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
    [r, g, b, 255]
}

/// Source selector accepted on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneSpec {
    Image { path: PathBuf },
    Solid { color: HexColor },
    Gradient { from: HexColor, to: HexColor },
}

impl SceneSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw.trim();
        if let Some(path) = value.strip_prefix("image:") {
            let path = path.trim();
            if path.is_empty() {
                bail!("invalid --scene '{}': missing image path", raw);
            }
            return Ok(Self::Image {
                path: PathBuf::from(path),
            });
        }

        if let Some(color) = value.strip_prefix("solid:") {
            let color = HexColor::parse(color.trim())
                .with_context(|| format!("invalid --scene '{}'", raw))?;
            return Ok(Self::Solid { color });
        }

        if let Some(colors) = value.strip_prefix("gradient:") {
            let Some((from, to)) = colors.split_once(',') else {
                bail!("invalid --scene '{}': expected 'gradient:<from>,<to>'", raw);
            };
            let from = HexColor::parse(from.trim())
                .with_context(|| format!("invalid --scene '{}'", raw))?;
            let to =
                HexColor::parse(to.trim()).with_context(|| format!("invalid --scene '{}'", raw))?;
            return Ok(Self::Gradient { from, to });
        }

        bail!(
            "invalid --scene '{}': expected 'image:<path>', 'solid:<#hex>', or 'gradient:<#hex>,<#hex>'",
            raw
        )
    }

    /// Builds the source. Procedural scenes use `size`; images keep their own.
    pub fn open(&self, size: (u32, u32), dpr: f32) -> Result<Box<dyn FrameSource>> {
        let (width, height) = size;
        let source: Box<dyn FrameSource> = match self {
            Self::Image { path } => Box::new(StillImageSource::load(path, dpr)?),
            Self::Solid { color } => Box::new(ProceduralSource::new(
                width,
                height,
                dpr,
                ProceduralPattern::Solid(*color),
            )?),
            Self::Gradient { from, to } => Box::new(ProceduralSource::new(
                width,
                height,
                dpr,
                ProceduralPattern::Gradient {
                    from: *from,
                    to: *to,
                    period: 120,
                },
            )?),
        };
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_scene_kind() {
        assert_eq!(
            SceneSpec::parse("image:shots/a.png").expect("image"),
            SceneSpec::Image {
                path: PathBuf::from("shots/a.png")
            }
        );
        assert!(matches!(
            SceneSpec::parse("solid:#ff0000").expect("solid"),
            SceneSpec::Solid { .. }
        ));
        assert!(matches!(
            SceneSpec::parse(" gradient:#000, #fff ").expect("gradient"),
            SceneSpec::Gradient { .. }
        ));
    }

    #[test]
    fn rejects_malformed_scenes() {
        assert!(SceneSpec::parse("image:").is_err());
        assert!(SceneSpec::parse("solid:red").is_err());
        assert!(SceneSpec::parse("gradient:#000").is_err());
        let error = SceneSpec::parse("video:x.mp4").expect_err("unknown prefix");
        assert!(error.to_string().contains("expected 'image:<path>'"));
    }

    #[test]
    fn solid_source_fills_the_frame() {
        let color = HexColor::parse("#336699").expect("color");
        let mut source =
            ProceduralSource::new(4, 3, 2.0, ProceduralPattern::Solid(color)).expect("source");
        let frame = source.capture(0).expect("capture");
        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert_eq!(frame.logical_width(), 2.0);
        assert_eq!(frame.pixel(3, 2), Some([0x33, 0x66, 0x99, 255]));
    }

    #[test]
    fn gradient_scrolls_between_frames() {
        let pattern = ProceduralPattern::Gradient {
            from: HexColor::parse("#000000").expect("from"),
            to: HexColor::parse("#ffffff").expect("to"),
            period: 8,
        };
        let mut source = ProceduralSource::new(16, 2, 1.0, pattern).expect("source");
        let first = source.capture(0).expect("capture");
        let later = source.capture(3).expect("capture");
        let wrapped = source.capture(8).expect("capture");
        assert_ne!(first, later);
        assert_eq!(first, wrapped);
        assert_eq!(first.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(first.pixel(8, 1), Some([255, 255, 255, 255]));
    }

    #[test]
    fn bottom_up_storage_samples_identically() {
        let rgba = (0..12_u8).flat_map(|i| [i * 10, 0, 0, 255]).collect::<Vec<_>>();
        let frame = RenderFrame::new(3, 4, rgba).expect("frame");
        let top_down = StillImageSource::from_frame(frame);
        let bottom_up = top_down.clone().bottom_up().expect("flip");
        assert_eq!(bottom_up.frame().row_order(), RowOrder::BottomUp);
        assert_ne!(bottom_up.frame().as_raw(), top_down.frame().as_raw());
        for y in 0..4 {
            for x in 0..3 {
                assert_eq!(bottom_up.frame().pixel(x, y), top_down.frame().pixel(x, y));
            }
        }
    }

    #[test]
    fn still_image_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("still.png");
        image::RgbaImage::from_pixel(6, 4, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .expect("write");
        let mut source = StillImageSource::load(&path, 2.0).expect("load");
        assert_eq!(source.size(), (6, 4));
        let frame = source.capture(7).expect("capture");
        assert_eq!(frame.logical_height(), 2.0);
        assert_eq!(frame.pixel(5, 3), Some([10, 20, 30, 255]));
    }
}
