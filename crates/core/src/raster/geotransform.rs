//! Affine georeferencing for raster grids

use serde::{Deserialize, Serialize};

/// Affine transformation between cell indexes (row, col) and map
/// coordinates (x, y):
///
/// ```text
/// x = origin_x + col * cell_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * cell_height
/// ```
///
/// For north-up grids the rotation terms are 0 and `cell_height` is
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Cell size in the X direction
    pub cell_width: f64,
    /// Cell size in the Y direction (usually negative)
    pub cell_height: f64,
    /// Rotation about the X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about the Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a north-up transform with no rotation
    pub fn new(origin_x: f64, origin_y: f64, cell_width: f64, cell_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            cell_width,
            cell_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Map coordinates of a cell center
    pub fn cell_to_point(&self, row: usize, col: usize) -> (f64, f64) {
        let col_f = col as f64 + 0.5;
        let row_f = row as f64 + 0.5;

        let x = self.origin_x + col_f * self.cell_width + row_f * self.row_rotation;
        let y = self.origin_y + col_f * self.col_rotation + row_f * self.cell_height;

        (x, y)
    }

    /// Fractional (row, col) for a map coordinate.
    ///
    /// Inverts the affine transform; returns NaN pair when the transform is
    /// degenerate (zero determinant). Use `floor()` for integer indexes.
    pub fn point_to_cell(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.cell_width * self.cell_height - self.row_rotation * self.col_rotation;

        if det.abs() < 1e-10 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        let col = (self.cell_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.cell_width * dy) / det;

        (row, col)
    }

    /// Cell size, assuming square cells
    pub fn cell_size(&self) -> f64 {
        self.cell_width.abs()
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` for a grid of the given
    /// shape, rotation-aware
    pub fn bounds(&self, rows: usize, cols: usize) -> (f64, f64, f64, f64) {
        let corner = |row: f64, col: f64| {
            let x = self.origin_x + col * self.cell_width + row * self.row_rotation;
            let y = self.origin_y + col * self.col_rotation + row * self.cell_height;
            (x, y)
        };

        let (x0, y0) = corner(0.0, 0.0);
        let (x1, y1) = corner(0.0, cols as f64);
        let (x2, y2) = corner(rows as f64, 0.0);
        let (x3, y3) = corner(rows as f64, cols as f64);

        let min_x = x0.min(x1).min(x2).min(x3);
        let max_x = x0.max(x1).max(x2).max(x3);
        let min_y = y0.min(y1).min(y2).min(y3);
        let max_y = y0.max(y1).max(y2).max(y3);

        (min_x, min_y, max_x, max_y)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cell_point_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.cell_to_point(10, 5);
        let (row, col) = gt.point_to_cell(x, y);

        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
    }

    #[test]
    fn test_bounds_north_up() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_degenerate_transform() {
        let gt = GeoTransform::new(0.0, 0.0, 0.0, 0.0);
        let (row, col) = gt.point_to_cell(5.0, 5.0);
        assert!(row.is_nan() && col.is_nan());
    }
}
