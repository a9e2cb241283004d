//! Synthetic grids for store and mosaic tests.
//!
//! Values follow simple patterns so a test can tell from a single value
//! which cell, day or step it came from.

/// Row-major grid where each cell holds `col * 1000 + row`.
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates one daily field whose values identify the day.
///
/// Each cell value is `day_offset * 10000 + row * 100 + col`, so rows and
/// columns up to 99 stay distinguishable.
pub fn create_day_field(day_offset: usize, width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((day_offset * 10_000 + row * 100 + col) as f32);
        }
    }
    data
}

/// Creates a mask whose left `valid_cols` columns hold `value` and the rest `nodata`.
pub fn create_half_mask(
    width: usize,
    height: usize,
    valid_cols: usize,
    value: f32,
    nodata: f32,
) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for _row in 0..height {
        for col in 0..width {
            data.push(if col < valid_cols { value } else { nodata });
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(10, 5);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[10 * 4 + 9], 9004.0);
    }

    #[test]
    fn test_day_field_identifies_day() {
        let field = create_day_field(3, 4, 2);
        assert_eq!(field[0], 30_000.0);
        assert_eq!(field[4 + 2], 30_102.0);
    }

    #[test]
    fn test_half_mask() {
        let mask = create_half_mask(4, 2, 1, 1.0, 255.0);
        assert_eq!(mask, vec![1.0, 255.0, 255.0, 255.0, 1.0, 255.0, 255.0, 255.0]);
    }
}
