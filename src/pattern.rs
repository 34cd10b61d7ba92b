//! Per-pixel pattern engine on the CPU.
//!
//! Mirrors `fs_main` in `shaders/wgsl/pattern.wgsl` stage for stage; the
//! software backend of [`crate::renderer::PatternRenderer`] runs this.

use crate::density::cell_visible;
use crate::frame::{CellGrid, RenderFrame};
use crate::glyph_style::coverage;
use crate::grading::{grade_pixel, rgb8_to_unit, unit_to_u8, ALPHA_SKIP_THRESHOLD};
use crate::mask::MaskTexture;
use crate::post_fx;
use crate::schema::EffectParameters;

/// Host-driven per-frame inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInputs {
    /// Effect time in seconds, already quantized by the frame clock.
    pub time: f32,
    /// Pointer position in physical pixels, top-down.
    pub mouse: [f32; 2],
    pub frame_index: u32,
}

/// Frame-constant values shared by every pixel.
pub struct PatternContext<'a> {
    frame: &'a RenderFrame,
    mask: Option<&'a MaskTexture>,
    params: &'a EffectParameters,
    inputs: FrameInputs,
    grid: CellGrid,
    pitch: [f32; 2],
    cell: [f32; 2],
    size: [f32; 2],
}

impl<'a> PatternContext<'a> {
    pub fn new(
        frame: &'a RenderFrame,
        mask: Option<&'a MaskTexture>,
        params: &'a EffectParameters,
        inputs: FrameInputs,
    ) -> Self {
        let grid = CellGrid::for_frame(frame, params);
        Self {
            frame,
            mask,
            params,
            inputs,
            pitch: [grid.pitch * grid.scale_x, grid.pitch * grid.scale_y],
            cell: [grid.cell_size * grid.scale_x, grid.cell_size * grid.scale_y],
            size: [frame.width() as f32, frame.height() as f32],
            grid,
        }
    }

    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    /// Output color of physical pixel `(px, py)` as unclamped-alpha RGBA in
    /// `[0, 1]`.
    pub fn shade_pixel(&self, px: u32, py: u32) -> [f32; 4] {
        let post = &self.params.post;
        let time = self.inputs.time;
        let uv = [
            (px as f32 + 0.5) / self.size[0],
            (py as f32 + 0.5) / self.size[1],
        ];

        let Some(warped) = post_fx::curvature(uv, post.curvature) else {
            return [0.0; 4];
        };
        let warped = post_fx::wave(warped, post, time);

        let pos = [warped[0] * self.size[0], warped[1] * self.size[1]];
        let cell_f = [
            (pos[0] / self.pitch[0]).floor(),
            (pos[1] / self.pitch[1]).floor(),
        ];
        if cell_f[0] < 0.0
            || cell_f[1] < 0.0
            || cell_f[0] >= self.grid.cols as f32
            || cell_f[1] >= self.grid.rows as f32
        {
            return [0.0; 4];
        }
        let cell = [cell_f[0] as i32, cell_f[1] as i32];
        let local = [
            (pos[0] - cell_f[0] * self.pitch[0]) / self.cell[0],
            (pos[1] - cell_f[1] * self.pitch[1]) / self.cell[1],
        ];
        let in_gap = local[0] >= 1.0 || local[1] >= 1.0;

        let offset = post_fx::jitter(cell, post, time);
        let sample_cell = [
            cell_f[0] + offset[0] + post_fx::glitch_shift(cell[1], post, time),
            cell_f[1] + offset[1],
        ];
        let center = [
            (sample_cell[0] + 0.5) * self.pitch[0],
            (sample_cell[1] + 0.5) * self.pitch[1],
        ];
        let (mut rgb, alpha) = self.sample(center, post.aberration_strength * self.size[0]);

        let noise = post_fx::noise_offset(warped, post, time);
        if noise != 0.0 {
            rgb = rgb.map(|c| c + noise);
        }

        let graded = grade_pixel(rgb, self.params);
        let visible = alpha >= ALPHA_SKIP_THRESHOLD
            && !in_gap
            && cell_visible(
                &self.params.density,
                &self.grid,
                cell[0] as u32,
                cell[1] as u32,
                self.mask,
            );
        let ink = if visible {
            coverage(
                self.params.style,
                graded.lum,
                [local[0], 1.0 - local[1]],
                &self.params.dots,
            )
        } else {
            0.0
        };

        let base = if self.params.color_mode {
            graded.rgb.map(|c| c * ink)
        } else {
            [graded.lum * ink; 3]
        };
        let mut out = post_fx::apply_palette(base, post.color_palette);

        let glow = post_fx::mouse_glow([px as f32 + 0.5, py as f32 + 0.5], self.inputs.mouse, post);
        let shade = post_fx::scanline_factor(uv[1], post) * post_fx::vignette_factor(uv, post);
        out = out.map(|c| (c + glow) * shade);

        let mut out_alpha = f32::from(alpha) / 255.0;
        if post.make_black_transparent && post_fx::is_black(out) {
            out_alpha = 0.0;
        }
        [out[0], out[1], out[2], out_alpha]
    }

    fn sample(&self, center: [f32; 2], aberration_px: f32) -> ([f32; 3], u8) {
        let x = center[0].floor() as i64;
        let y = center[1].floor() as i64;
        let px = self.frame.pixel_clamped(x, y);
        let mut rgb = rgb8_to_unit([px[0], px[1], px[2]]);
        if aberration_px > 0.0 {
            let red = self
                .frame
                .pixel_clamped((center[0] + aberration_px).floor() as i64, y);
            let blue = self
                .frame
                .pixel_clamped((center[0] - aberration_px).floor() as i64, y);
            rgb[0] = f32::from(red[0]) / 255.0;
            rgb[2] = f32::from(blue[2]) / 255.0;
        }
        (rgb, px[3])
    }
}

/// Renders the whole frame to tight top-down RGBA8 rows.
pub fn render_pattern_software(
    frame: &RenderFrame,
    mask: Option<&MaskTexture>,
    params: &EffectParameters,
    inputs: FrameInputs,
) -> Vec<u8> {
    let context = PatternContext::new(frame, mask, params, inputs);
    let width = frame.width();
    let height = frame.height();
    let mut rgba = vec![0_u8; width as usize * height as usize * 4];
    for (index, out) in rgba.chunks_exact_mut(4).enumerate() {
        let px = (index % width as usize) as u32;
        let py = (index / width as usize) as u32;
        let color = context.shade_pixel(px, py);
        for (dst, value) in out.iter_mut().zip(color) {
            *dst = unit_to_u8(value);
        }
    }
    rgba
}
