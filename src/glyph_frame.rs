#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphFrameMetadata {
    pub source_frame_index: Option<u64>,
    pub capture_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphCell {
    pub glyph: char,
    pub color: [u8; 3],
}

/// The character grid drawn by one compositor capture. Cells that were
/// skipped (transparent, out of bounds or density-gated) are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphFrame {
    cols: usize,
    rows: usize,
    cells: Vec<Option<GlyphCell>>,
    pub metadata: Option<GlyphFrameMetadata>,
}

impl GlyphFrame {
    pub fn blank(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![None; cols * rows],
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: GlyphFrameMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn get(&self, col: usize, row: usize) -> Option<&GlyphCell> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.cells[row * self.cols + col].as_ref()
    }

    /// Out-of-range writes are ignored.
    pub fn set(&mut self, col: usize, row: usize, cell: GlyphCell) {
        if col < self.cols && row < self.rows {
            self.cells[row * self.cols + col] = Some(cell);
        }
    }

    pub fn drawn_count(&self) -> usize {
        self.cells.iter().flatten().count()
    }

    pub fn lines(&self) -> Vec<String> {
        if self.cols == 0 {
            return vec![String::new(); self.rows];
        }
        self.cells
            .chunks(self.cols)
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map_or(' ', |cell| cell.glyph))
                    .collect()
            })
            .collect()
    }

    pub fn to_text(&self) -> String {
        if self.rows == 0 {
            return String::new();
        }
        let mut value = self.lines().join("\n");
        value.push('\n');
        value
    }
}
