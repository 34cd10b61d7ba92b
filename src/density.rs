//! Per-cell keep/suppress decision for the density mask.

use crate::frame::CellGrid;
use crate::hash::cell_hash;
use crate::mask::MaskTexture;
use crate::schema::{DensityMaskConfig, DensityMode, GradientDirection};

/// Effective density in percent (`[0, 100]`) for cell `(col, row)`.
pub fn effective_density(
    config: &DensityMaskConfig,
    grid: &CellGrid,
    col: u32,
    row: u32,
    mask: Option<&MaskTexture>,
) -> f32 {
    let density = match config.mode {
        DensityMode::None => 100.0,
        DensityMode::Uniform => config.cell_density,
        DensityMode::GradientLinear => {
            let position = linear_position(config.gradient_direction, grid, col, row);
            let position = remap_midpoint(position, config.gradient_midpoint);
            lerp(config.density_start, config.density_end, position)
        }
        DensityMode::GradientRadial => {
            let distance = radial_distance(grid, col, row);
            lerp(config.density_start, config.density_end, distance)
        }
        DensityMode::LogoMask | DensityMode::ImageMask => match mask {
            Some(mask) => mask_density(config, grid, col, row, mask),
            None => 100.0,
        },
    };
    density.clamp(0.0, 100.0)
}

/// Keep iff the cell's hash draw falls below the density fraction.
pub fn keep_cell(density_percent: f32, col: u32, row: u32, seed: u32) -> bool {
    if density_percent >= 100.0 {
        return true;
    }
    cell_hash(col as i32, row as i32, seed) < density_percent / 100.0
}

/// Combined evaluation used by both renderers.
pub fn cell_visible(
    config: &DensityMaskConfig,
    grid: &CellGrid,
    col: u32,
    row: u32,
    mask: Option<&MaskTexture>,
) -> bool {
    let density = effective_density(config, grid, col, row, mask);
    keep_cell(density, col, row, config.random_seed)
}

fn linear_position(direction: GradientDirection, grid: &CellGrid, col: u32, row: u32) -> f32 {
    let cols = grid.cols.max(1) as f32;
    let rows = grid.rows.max(1) as f32;
    match direction {
        GradientDirection::Up => 1.0 - row as f32 / rows,
        GradientDirection::Down => row as f32 / rows,
        GradientDirection::Left => 1.0 - col as f32 / cols,
        GradientDirection::Right => col as f32 / cols,
    }
}

/// Compresses `[0, midpoint)` into `[0, 0.5)` and `[midpoint, 1]` into
/// `[0.5, 1]`.
pub fn remap_midpoint(position: f32, midpoint: f32) -> f32 {
    let remapped = if position < midpoint {
        position / midpoint * 0.5
    } else if midpoint >= 1.0 {
        1.0
    } else {
        (position - midpoint) / (1.0 - midpoint) * 0.5 + 0.5
    };
    remapped.clamp(0.0, 1.0)
}

/// Distance from the grid center, 0 at the center and 1 at the corners.
fn radial_distance(grid: &CellGrid, col: u32, row: u32) -> f32 {
    let center_x = (grid.cols as f32 / 2.0).max(0.5);
    let center_y = (grid.rows as f32 / 2.0).max(0.5);
    let dx = (col as f32 - center_x) / center_x;
    let dy = (row as f32 - center_y) / center_y;
    ((dx * dx + dy * dy).sqrt() / std::f32::consts::SQRT_2).min(1.0)
}

fn mask_density(
    config: &DensityMaskConfig,
    grid: &CellGrid,
    col: u32,
    row: u32,
    mask: &MaskTexture,
) -> f32 {
    match mask_uv(config, grid, col, row, mask.aspect()) {
        Some((u, v)) => lerp(config.density_start, config.density_end, mask.alpha_at_uv(u, v)),
        None => config.density_start,
    }
}

/// Mask UV for a cell after aspect correction, pan and zoom, or `None` when
/// the cell falls outside the mask.
pub fn mask_uv(
    config: &DensityMaskConfig,
    grid: &CellGrid,
    col: u32,
    row: u32,
    mask_aspect: f32,
) -> Option<(f32, f32)> {
    let mut centered_x = col as f32 / grid.cols.max(1) as f32 - 0.5;
    let mut centered_y = row as f32 / grid.rows.max(1) as f32 - 0.5;

    centered_x *= grid.viewport_aspect() / mask_aspect;
    centered_x -= config.mask_offset_x;
    centered_y += config.mask_offset_y;

    let u = centered_x / config.mask_scale + 0.5;
    let v = centered_y / config.mask_scale + 0.5;
    if (0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v) {
        Some((u, v))
    } else {
        None
    }
}

fn lerp(start: f32, end: f32, t: f32) -> f32 {
    start + t * (end - start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EffectParameters;

    fn grid(cols: u32, rows: u32) -> CellGrid {
        let params = EffectParameters::default();
        CellGrid::new(
            cols as f32 * params.cell_size,
            rows as f32 * params.cell_size,
            &params,
        )
    }

    fn config(mode: DensityMode) -> DensityMaskConfig {
        DensityMaskConfig {
            mode,
            ..DensityMaskConfig::default()
        }
    }

    #[test]
    fn none_mode_keeps_everything() {
        let grid = grid(8, 8);
        let config = config(DensityMode::None);
        for row in 0..8 {
            for col in 0..8 {
                assert!(cell_visible(&config, &grid, col, row, None));
            }
        }
    }

    #[test]
    fn uniform_extremes() {
        let grid = grid(20, 10);
        let mut config = config(DensityMode::Uniform);
        config.cell_density = 0.0;
        assert!((0..10).all(|row| (0..20).all(|col| !cell_visible(&config, &grid, col, row, None))));
        config.cell_density = 100.0;
        assert!((0..10).all(|row| (0..20).all(|col| cell_visible(&config, &grid, col, row, None))));
    }

    #[test]
    fn uniform_half_keeps_about_half() {
        let grid = grid(40, 40);
        let mut config = config(DensityMode::Uniform);
        config.cell_density = 50.0;
        config.random_seed = 7;
        let kept = (0..40)
            .flat_map(|row| (0..40).map(move |col| (col, row)))
            .filter(|&(col, row)| cell_visible(&config, &grid, col, row, None))
            .count();
        assert!((640..960).contains(&kept), "kept {kept}/1600");
    }

    #[test]
    fn linear_up_runs_from_full_at_top_to_empty_at_bottom() {
        let grid = grid(4, 10);
        let config = config(DensityMode::GradientLinear);
        let top = effective_density(&config, &grid, 0, 0, None);
        let bottom = effective_density(&config, &grid, 0, 9, None);
        assert!((top - 100.0).abs() < 1e-3, "top {top}");
        assert!(bottom <= 10.0 + 1e-3, "bottom {bottom}");
        let mut previous = f32::INFINITY;
        for row in 0..10 {
            let value = effective_density(&config, &grid, 0, row, None);
            assert!(value <= previous);
            previous = value;
        }
    }

    #[test]
    fn midpoint_shifts_the_transition() {
        assert!((remap_midpoint(0.25, 0.25) - 0.5).abs() < 1e-6);
        assert!((remap_midpoint(0.125, 0.25) - 0.25).abs() < 1e-6);
        assert!((remap_midpoint(1.0, 0.25) - 1.0).abs() < 1e-6);
        assert_eq!(remap_midpoint(0.3, 0.0), 0.5 + 0.3 * 0.5);
        assert_eq!(remap_midpoint(0.9, 1.0), 0.45);
        assert_eq!(remap_midpoint(1.0, 1.0), 1.0);
    }

    #[test]
    fn radial_center_and_corner() {
        let grid = grid(10, 10);
        let mut config = config(DensityMode::GradientRadial);
        config.density_start = 100.0;
        config.density_end = 0.0;
        let center = effective_density(&config, &grid, 5, 5, None);
        let corner = effective_density(&config, &grid, 0, 0, None);
        assert!((center - 100.0).abs() < 1e-3);
        assert!(corner.abs() < 1e-3, "corner {corner}");
        let edge = effective_density(&config, &grid, 0, 5, None);
        assert!(edge > corner && edge < center);
    }

    #[test]
    fn missing_mask_means_full_density() {
        let grid = grid(6, 6);
        let mut config = config(DensityMode::ImageMask);
        config.density_start = 0.0;
        assert_eq!(effective_density(&config, &grid, 3, 3, None), 100.0);
    }

    #[test]
    fn mask_alpha_drives_density_and_outside_uses_start() {
        let grid = grid(10, 10);
        let mask = MaskTexture::from_alpha(2, 2, vec![255, 0, 255, 0]).expect("mask");
        let mut config = config(DensityMode::LogoMask);
        config.density_start = 20.0;
        config.density_end = 80.0;
        // left half of the mask is opaque
        assert!((effective_density(&config, &grid, 2, 5, Some(&mask)) - 80.0).abs() < 1e-3);
        assert!((effective_density(&config, &grid, 7, 5, Some(&mask)) - 20.0).abs() < 1e-3);

        config.mask_scale = 0.5;
        assert_eq!(effective_density(&config, &grid, 0, 0, Some(&mask)), 20.0);
    }

    #[test]
    fn mask_offset_pans_the_image() {
        let grid = grid(10, 10);
        let mut config = config(DensityMode::ImageMask);
        assert!(mask_uv(&config, &grid, 0, 5, 1.0).is_some());
        config.mask_offset_x = 0.2;
        assert!(mask_uv(&config, &grid, 0, 5, 1.0).is_none());
    }

    #[test]
    fn density_is_bounded_for_every_mode() {
        let grid = grid(12, 7);
        let mask = MaskTexture::from_alpha(3, 1, vec![0, 128, 255]).expect("mask");
        let modes = [
            DensityMode::None,
            DensityMode::Uniform,
            DensityMode::GradientLinear,
            DensityMode::GradientRadial,
            DensityMode::LogoMask,
            DensityMode::ImageMask,
        ];
        for mode in modes {
            for direction in [
                GradientDirection::Up,
                GradientDirection::Down,
                GradientDirection::Left,
                GradientDirection::Right,
            ] {
                for midpoint in [0.0, 0.3, 0.5, 1.0] {
                    for (start, end) in [(0.0, 100.0), (100.0, 0.0), (35.0, 35.0)] {
                        let config = DensityMaskConfig {
                            mode,
                            gradient_direction: direction,
                            gradient_midpoint: midpoint,
                            density_start: start,
                            density_end: end,
                            cell_density: end,
                            ..DensityMaskConfig::default()
                        };
                        for row in 0..7 {
                            for col in 0..12 {
                                let value =
                                    effective_density(&config, &grid, col, row, Some(&mask));
                                assert!((0.0..=100.0).contains(&value), "{mode:?} -> {value}");
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn same_seed_reproduces_the_pattern() {
        let grid = grid(16, 16);
        let mut config = config(DensityMode::Uniform);
        config.cell_density = 40.0;
        config.random_seed = 1234;
        let first = (0..256)
            .map(|i| cell_visible(&config, &grid, i % 16, i / 16, None))
            .collect::<Vec<_>>();
        let second = (0..256)
            .map(|i| cell_visible(&config, &grid, i % 16, i / 16, None))
            .collect::<Vec<_>>();
        assert_eq!(first, second);
        config.random_seed = 1235;
        let reseeded = (0..256)
            .map(|i| cell_visible(&config, &grid, i % 16, i / 16, None))
            .collect::<Vec<_>>();
        assert_ne!(first, reseeded);
    }
}
