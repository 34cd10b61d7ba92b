use anyhow::{anyhow, bail, Result};

use crate::schema::EffectParameters;

/// Storage order of rows in a captured buffer. GPU readbacks are often
/// bottom-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    #[default]
    TopDown,
    BottomUp,
}

/// One captured RGBA8 frame plus the logical size it was rendered for.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    width: u32,
    height: u32,
    logical_width: f32,
    logical_height: f32,
    row_order: RowOrder,
    rgba: Vec<u8>,
}

impl RenderFrame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        Self::with_logical_size(width, height, width as f32, height as f32, rgba)
    }

    pub fn with_logical_size(
        width: u32,
        height: u32,
        logical_width: f32,
        logical_height: f32,
        rgba: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("frame must be non-empty, got {width}x{height}");
        }
        if !(logical_width > 0.0 && logical_height > 0.0) {
            bail!("logical size must be positive, got {logical_width}x{logical_height}");
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| anyhow!("frame size overflow for {width}x{height}"))?;
        if rgba.len() != expected {
            bail!(
                "frame buffer length mismatch: expected {expected} bytes for {width}x{height}, got {}",
                rgba.len()
            );
        }
        Ok(Self {
            width,
            height,
            logical_width,
            logical_height,
            row_order: RowOrder::TopDown,
            rgba,
        })
    }

    /// Builds a frame from a physical buffer and a device pixel ratio.
    pub fn with_pixel_ratio(width: u32, height: u32, dpr: f32, rgba: Vec<u8>) -> Result<Self> {
        if !(dpr > 0.0) {
            bail!("device pixel ratio must be positive, got {dpr}");
        }
        Self::with_logical_size(width, height, width as f32 / dpr, height as f32 / dpr, rgba)
    }

    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn logical_width(&self) -> f32 {
        self.logical_width
    }

    pub fn logical_height(&self) -> f32 {
        self.logical_height
    }

    pub fn row_order(&self) -> RowOrder {
        self.row_order
    }

    /// Physical pixels per logical pixel (horizontal).
    pub fn scale(&self) -> f32 {
        self.width as f32 / self.logical_width
    }

    pub fn scale_y(&self) -> f32 {
        self.height as f32 / self.logical_height
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.rgba
    }

    /// Pixel at top-down coordinates, mirroring the row for bottom-up storage.
    /// Out-of-bounds reads return `None`.
    pub fn pixel(&self, x: i64, y: i64) -> Option<[u8; 4]> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        let row = match self.row_order {
            RowOrder::TopDown => y,
            RowOrder::BottomUp => i64::from(self.height) - 1 - y,
        };
        let index = ((row as usize) * self.width as usize + x as usize) * 4;
        self.rgba
            .get(index..index + 4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    /// Like [`RenderFrame::pixel`] but clamps coordinates into the buffer.
    pub fn pixel_clamped(&self, x: i64, y: i64) -> [u8; 4] {
        let x = x.clamp(0, i64::from(self.width) - 1);
        let y = y.clamp(0, i64::from(self.height) - 1);
        self.pixel(x, y).unwrap_or([0, 0, 0, 0])
    }
}

/// Grid geometry derived from a frame and the current parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGrid {
    pub cols: u32,
    pub rows: u32,
    /// `cell_size * (1 + spacing)` in logical pixels.
    pub pitch: f32,
    pub cell_size: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub logical_width: f32,
    pub logical_height: f32,
}

impl CellGrid {
    pub fn new(logical_width: f32, logical_height: f32, params: &EffectParameters) -> Self {
        let pitch = params.effective_cell_size().max(f32::EPSILON);
        Self {
            cols: (logical_width / pitch).floor().max(0.0) as u32,
            rows: (logical_height / pitch).floor().max(0.0) as u32,
            pitch,
            cell_size: params.cell_size,
            scale_x: 1.0,
            scale_y: 1.0,
            logical_width,
            logical_height,
        }
    }

    pub fn for_frame(frame: &RenderFrame, params: &EffectParameters) -> Self {
        Self {
            scale_x: frame.scale(),
            scale_y: frame.scale_y(),
            ..Self::new(frame.logical_width(), frame.logical_height(), params)
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.cols == 0 || self.rows == 0
    }

    /// Physical sample coordinate at the center of `(col, row)`.
    pub fn sample_point(&self, col: u32, row: u32) -> (i64, i64) {
        let x = ((col as f32 + 0.5) * self.pitch * self.scale_x).floor();
        let y = ((row as f32 + 0.5) * self.pitch * self.scale_y).floor();
        (x as i64, y as i64)
    }

    /// Physical top-left corner of `(col, row)`.
    pub fn cell_origin(&self, col: u32, row: u32) -> (f32, f32) {
        (
            col as f32 * self.pitch * self.scale_x,
            row as f32 * self.pitch * self.scale_y,
        )
    }

    pub fn viewport_aspect(&self) -> f32 {
        self.logical_width / self.logical_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, px: [u8; 4]) -> Vec<u8> {
        px.repeat((width * height) as usize)
    }

    #[test]
    fn rejects_mismatched_buffers() {
        assert!(RenderFrame::new(4, 4, vec![0; 10]).is_err());
        assert!(RenderFrame::new(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn bottom_up_frames_mirror_rows() {
        let mut rgba = solid(2, 2, [0, 0, 0, 255]);
        // stored row 0 is the visual bottom row
        rgba[0] = 200;
        let frame = RenderFrame::new(2, 2, rgba)
            .expect("frame")
            .with_row_order(RowOrder::BottomUp);
        assert_eq!(frame.pixel(0, 1), Some([200, 0, 0, 255]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn out_of_bounds_reads_are_none() {
        let frame = RenderFrame::new(2, 2, solid(2, 2, [1, 2, 3, 4])).expect("frame");
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.pixel(0, -1), None);
        assert_eq!(frame.pixel_clamped(9, -9), [1, 2, 3, 4]);
    }

    #[test]
    fn grid_uses_logical_size_and_spacing() {
        let mut params = EffectParameters::default();
        params.cell_size = 10.0;
        params.cell_spacing = 0.5;
        let frame = RenderFrame::with_pixel_ratio(200, 100, 2.0, solid(200, 100, [0; 4]))
            .expect("frame");
        let grid = CellGrid::for_frame(&frame, &params);
        assert_eq!((grid.cols, grid.rows), (6, 3));
        assert_eq!(grid.sample_point(0, 0), (15, 15));
        assert_eq!(grid.cell_origin(2, 1), (60.0, 30.0));
    }

    #[test]
    fn grid_sizing_holds_across_parameter_ranges() {
        let logical = (1280.0_f32, 720.0_f32);
        for cell in 4..=32 {
            for spacing_step in -5..=5 {
                let mut params = EffectParameters::default();
                params.cell_size = cell as f32;
                params.cell_spacing = spacing_step as f32 / 10.0;
                let grid = CellGrid::new(logical.0, logical.1, &params);
                let pitch = params.cell_size * (1.0 + params.cell_spacing);
                assert_eq!(grid.cols, (logical.0 / pitch).floor() as u32);
                assert_eq!(grid.rows, (logical.1 / pitch).floor() as u32);
            }
        }
    }
}
