//! CPU glyph compositor: samples one pixel per cell from a periodically
//! captured frame and draws the matching literal character.

use anyhow::{anyhow, Result};
use log::{debug, warn};
use tiny_skia::{Color, Pixmap};

use crate::density::cell_visible;
use crate::frame::{CellGrid, RenderFrame};
use crate::glyph_frame::{GlyphCell, GlyphFrame, GlyphFrameMetadata};
use crate::glyph_raster::{blend_glyph, GlyphRasterizer};
use crate::grading::{grade_pixel, rgb8_to_unit, unit_to_u8, ALPHA_SKIP_THRESHOLD};
use crate::mask::MaskTexture;
use crate::scene::FrameSource;
use crate::schema::EffectParameters;

/// Capture once every this many frames.
pub const CAPTURE_INTERVAL: u64 = 3;

/// Glyph pixel size relative to the physical cell size.
pub const FONT_SCALE: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositorState {
    #[default]
    Idle,
    Capturing,
    SamplingDrawing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Not a capture frame; the previous overlay stays on screen.
    Skipped,
    Captured,
    /// Capture or drawing failed; the previous overlay stays on screen.
    Failed,
}

/// Opaque RGBA overlay plus the character grid it was drawn from.
pub struct GlyphOverlay {
    pub pixmap: Pixmap,
    pub glyphs: GlyphFrame,
}

pub struct GlyphCompositor {
    rasterizer: Box<dyn GlyphRasterizer>,
    state: CompositorState,
    frame_counter: u64,
    captures: u64,
    overlay: Option<GlyphOverlay>,
}

impl GlyphCompositor {
    pub fn new(rasterizer: Box<dyn GlyphRasterizer>) -> Self {
        Self {
            rasterizer,
            state: CompositorState::Idle,
            frame_counter: 0,
            captures: 0,
            overlay: None,
        }
    }

    pub fn state(&self) -> CompositorState {
        self.state
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn captures(&self) -> u64 {
        self.captures
    }

    pub fn overlay(&self) -> Option<&GlyphOverlay> {
        self.overlay.as_ref()
    }

    /// Advances the frame counter and, on capture frames, redraws the overlay.
    pub fn on_frame(
        &mut self,
        source: &mut dyn FrameSource,
        params: &EffectParameters,
        mask: Option<&MaskTexture>,
    ) -> FrameOutcome {
        self.frame_counter += 1;
        if self.frame_counter % CAPTURE_INTERVAL != 0 {
            return FrameOutcome::Skipped;
        }

        self.state = CompositorState::Capturing;
        let frame = match source.capture(self.frame_counter) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(
                    "glyph capture failed on frame {}: {error:#}",
                    self.frame_counter
                );
                self.state = CompositorState::Idle;
                return FrameOutcome::Failed;
            }
        };

        self.state = CompositorState::SamplingDrawing;
        let outcome = match compose_glyph_frame(&frame, params, mask, self.rasterizer.as_mut()) {
            Ok(mut overlay) => {
                self.captures += 1;
                overlay.glyphs.metadata = Some(GlyphFrameMetadata {
                    source_frame_index: Some(self.frame_counter),
                    capture_index: self.captures,
                });
                debug!(
                    "glyph capture #{}: {} of {}x{} cells drawn",
                    self.captures,
                    overlay.glyphs.drawn_count(),
                    overlay.glyphs.cols(),
                    overlay.glyphs.rows()
                );
                self.overlay = Some(overlay);
                FrameOutcome::Captured
            }
            Err(error) => {
                warn!("glyph overlay draw failed: {error:#}");
                FrameOutcome::Failed
            }
        };
        self.state = CompositorState::Idle;
        outcome
    }
}

/// One full sampling pass over `frame`: clears to black, then for each cell
/// in row-major order applies the bounds, transparency and density checks,
/// grades the sample and draws the palette glyph at the cell's top-left.
pub fn compose_glyph_frame(
    frame: &RenderFrame,
    params: &EffectParameters,
    mask: Option<&MaskTexture>,
    rasterizer: &mut dyn GlyphRasterizer,
) -> Result<GlyphOverlay> {
    let grid = CellGrid::for_frame(frame, params);
    let mut pixmap = Pixmap::new(frame.width(), frame.height()).ok_or_else(|| {
        anyhow!(
            "failed to allocate {}x{} glyph overlay",
            frame.width(),
            frame.height()
        )
    })?;
    pixmap.fill(Color::BLACK);

    let palette = params.character_set.palette();
    let font_px = (params.cell_size * FONT_SCALE * frame.scale()).floor().max(0.0) as u32;
    let mut glyphs = GlyphFrame::blank(grid.cols as usize, grid.rows as usize);

    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let (sample_x, sample_y) = grid.sample_point(col, row);
            let Some(px) = frame.pixel(sample_x, sample_y) else {
                continue;
            };
            if px[3] < ALPHA_SKIP_THRESHOLD {
                continue;
            }
            if !cell_visible(&params.density, &grid, col, row, mask) {
                continue;
            }

            let graded = grade_pixel(rgb8_to_unit([px[0], px[1], px[2]]), params);
            let index = palette.index_for(graded.lum);
            let glyph = palette.glyph_at(index);
            let color = if params.color_mode {
                graded.rgb.map(unit_to_u8)
            } else {
                [unit_to_u8(graded.lum); 3]
            };
            glyphs.set(col as usize, row as usize, GlyphCell { glyph, color });

            let (x, y) = grid.cell_origin(col, row);
            if let Some(bitmap) = rasterizer.rasterize(glyph, palette.ink(index), font_px) {
                blend_glyph(&mut pixmap, x.floor() as i32, y.floor() as i32, bitmap, color);
            }
        }
    }

    Ok(GlyphOverlay { pixmap, glyphs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RowOrder;
    use crate::glyph_raster::BlockRasterizer;
    use crate::schema::DensityMode;
    use anyhow::bail;

    struct FlakySource {
        frame: RenderFrame,
        fail: bool,
        captured: Vec<u64>,
    }

    impl FrameSource for FlakySource {
        fn capture(&mut self, frame_index: u64) -> Result<RenderFrame> {
            self.captured.push(frame_index);
            if self.fail {
                bail!("readback lost");
            }
            Ok(self.frame.clone())
        }

        fn size(&self) -> (u32, u32) {
            (self.frame.width(), self.frame.height())
        }
    }

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RenderFrame {
        RenderFrame::new(width, height, rgba.repeat((width * height) as usize)).expect("frame")
    }

    fn params(cell: f32) -> EffectParameters {
        EffectParameters {
            cell_size: cell,
            ..EffectParameters::default()
        }
    }

    fn compose(frame: &RenderFrame, params: &EffectParameters) -> GlyphOverlay {
        compose_glyph_frame(frame, params, None, &mut BlockRasterizer::new()).expect("compose")
    }

    #[test]
    fn captures_only_every_third_frame() {
        let mut source = FlakySource {
            frame: solid(16, 16, [255, 255, 255, 255]),
            fail: false,
            captured: Vec::new(),
        };
        let mut compositor = GlyphCompositor::new(Box::new(BlockRasterizer::new()));
        let params = params(8.0);
        let outcomes = (0..7)
            .map(|_| compositor.on_frame(&mut source, &params, None))
            .collect::<Vec<_>>();
        assert_eq!(source.captured, vec![3, 6]);
        assert_eq!(outcomes[0], FrameOutcome::Skipped);
        assert_eq!(outcomes[2], FrameOutcome::Captured);
        assert_eq!(compositor.captures(), 2);
        assert_eq!(compositor.state(), CompositorState::Idle);
        let metadata = compositor
            .overlay()
            .and_then(|overlay| overlay.glyphs.metadata)
            .expect("metadata");
        assert_eq!(metadata.source_frame_index, Some(6));
    }

    #[test]
    fn failed_capture_keeps_the_previous_overlay() {
        let mut source = FlakySource {
            frame: solid(16, 16, [255, 255, 255, 255]),
            fail: false,
            captured: Vec::new(),
        };
        let mut compositor = GlyphCompositor::new(Box::new(BlockRasterizer::new()));
        let params = params(8.0);
        for _ in 0..3 {
            compositor.on_frame(&mut source, &params, None);
        }
        let before = compositor.overlay().map(|overlay| overlay.glyphs.clone());
        source.fail = true;
        let outcomes = (0..3)
            .map(|_| compositor.on_frame(&mut source, &params, None))
            .collect::<Vec<_>>();
        assert_eq!(outcomes[2], FrameOutcome::Failed);
        assert_eq!(compositor.overlay().map(|overlay| overlay.glyphs.clone()), before);
        assert_eq!(compositor.captures(), 1);
    }

    #[test]
    fn white_frame_draws_the_densest_glyph_everywhere() {
        let overlay = compose(&solid(32, 16, [255, 255, 255, 255]), &params(8.0));
        assert_eq!(overlay.glyphs.to_text(), "@@@@\n@@@@\n");
        // block fallback at ink 1.0 fills the 6px glyph square
        let data = overlay.pixmap.data();
        assert_eq!(&data[0..4], &[255, 255, 255, 255]);
        let gap = ((7 * 32) + 7) * 4;
        assert_eq!(&data[gap..gap + 4], &[0, 0, 0, 255]);
    }

    #[test]
    fn transparent_samples_draw_nothing() {
        let overlay = compose(&solid(16, 16, [255, 255, 255, 9]), &params(8.0));
        assert_eq!(overlay.glyphs.drawn_count(), 0);
        assert!(overlay
            .pixmap
            .data()
            .chunks_exact(4)
            .all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn zero_density_suppresses_every_glyph() {
        let mut params = params(8.0);
        params.density.mode = DensityMode::Uniform;
        params.density.cell_density = 0.0;
        let overlay = compose(&solid(32, 32, [200, 200, 200, 255]), &params);
        assert_eq!(overlay.glyphs.drawn_count(), 0);
    }

    #[test]
    fn gray_mode_colors_by_graded_brightness() {
        let mut params = params(8.0);
        params.color_mode = false;
        let overlay = compose(&solid(16, 8, [255, 0, 0, 255]), &params);
        let cell = overlay.glyphs.get(0, 0).expect("cell");
        let lum = unit_to_u8(0.299);
        assert_eq!(cell.color, [lum; 3]);
        // basic ramp, floor(0.299 * 9) = 2
        assert_eq!(cell.glyph, ':');
    }

    #[test]
    fn bottom_up_frames_sample_the_mirrored_row() {
        let mut rgba = [0_u8, 0, 0, 255].repeat(16 * 16);
        // top half white in top-down storage
        for px in rgba[..16 * 8 * 4].chunks_exact_mut(4) {
            px.copy_from_slice(&[255, 255, 255, 255]);
        }
        let top_down = RenderFrame::new(16, 16, rgba.clone()).expect("frame");
        let flipped = rgba
            .chunks_exact(16 * 4)
            .rev()
            .flatten()
            .copied()
            .collect::<Vec<_>>();
        let bottom_up = RenderFrame::new(16, 16, flipped)
            .expect("frame")
            .with_row_order(RowOrder::BottomUp);
        let params = params(8.0);
        let a = compose(&top_down, &params);
        let b = compose(&bottom_up, &params);
        assert_eq!(a.glyphs, b.glyphs);
        assert_eq!(a.glyphs.to_text(), "@@\n  \n");
    }

    #[test]
    fn hidpi_frames_scale_the_grid_to_physical_pixels() {
        let frame = RenderFrame::with_pixel_ratio(32, 32, 2.0, [255; 4].repeat(32 * 32))
            .expect("frame");
        let overlay = compose(&frame, &params(8.0));
        assert_eq!((overlay.glyphs.cols(), overlay.glyphs.rows()), (2, 2));
        // glyph square is floor(8 * 0.8 * 2) = 12 px, inset 0 at full ink
        let data = overlay.pixmap.data();
        let inside = ((11 * 32) + 11) * 4;
        let outside = ((13 * 32) + 13) * 4;
        assert_eq!(&data[inside..inside + 4], &[255, 255, 255, 255]);
        assert_eq!(&data[outside..outside + 4], &[0, 0, 0, 255]);
    }
}
