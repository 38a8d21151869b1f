//! Raster grid type

use crate::error::{Error, Result};
use crate::raster::{CellValue, GeoTransform};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D grid of cell values.
///
/// `Raster<T>` stores values of type `T` in row-major order together with
/// an affine [`GeoTransform`] and an optional no-data sentinel. Raster
/// items store their value streams as grids of `f64` measurements or
/// `i32` class codes; the bootstrap sampler uses the validity and
/// containment tests to restrict sampling windows to usable cells.
#[derive(Debug, Clone)]
pub struct Raster<T: CellValue> {
    data: Array2<T>,
    transform: GeoTransform,
    nodata: Option<T>,
}

impl<T: CellValue> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((rows, cols)),
            transform: GeoTransform::default(),
            nodata: None,
        }
    }

    /// Create a raster from a flat row-major vector
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self {
            data: array,
            transform: GeoTransform::default(),
            nodata: None,
        })
    }

    /// Create a raster with this raster's transform and no-data sentinel,
    /// filled with the given value
    pub fn like(&self, fill_value: T) -> Self {
        Self {
            data: Array2::from_elem(self.data.dim(), fill_value),
            transform: self.transform,
            nodata: self.nodata,
        }
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the no-data sentinel
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data sentinel
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Whether the cell is in bounds and holds a usable value
    pub fn is_valid_cell(&self, row: usize, col: usize) -> bool {
        match self.data.get((row, col)) {
            Some(&v) => !self.is_nodata(v),
            None => false,
        }
    }

    /// Row-major validity mask over all cells
    pub fn valid_mask(&self) -> Vec<bool> {
        self.data.iter().map(|&v| !self.is_nodata(v)).collect()
    }

    /// Whether a map coordinate falls inside the raster extent
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        let (row, col) = self.transform.point_to_cell(x, y);
        if row.is_nan() || col.is_nan() {
            return false;
        }
        row >= 0.0 && col >= 0.0 && row < self.rows() as f64 && col < self.cols() as f64
    }

    /// Integer cell index for a map coordinate, if inside the extent
    pub fn point_to_cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !self.contains_point(x, y) {
            return None;
        }
        let (row, col) = self.transform.point_to_cell(x, y);
        Some((row.floor() as usize, col.floor() as usize))
    }

    /// Map coordinates of a cell center
    pub fn cell_to_point(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.cell_to_point(row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_and_access() {
        let mut raster: Raster<f64> = Raster::new(10, 20);
        assert_eq!(raster.shape(), (10, 20));

        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_from_vec_dimension_check() {
        assert!(Raster::from_vec(vec![1.0; 6], 2, 3).is_ok());
        assert!(Raster::from_vec(vec![1.0; 5], 2, 3).is_err());
    }

    #[test]
    fn test_validity() {
        let mut raster: Raster<f64> = Raster::new(3, 3);
        raster.set_nodata(Some(-9999.0));
        raster.set(1, 1, -9999.0).unwrap();
        raster.set(0, 0, 7.0).unwrap();

        assert!(raster.is_valid_cell(0, 0));
        assert!(!raster.is_valid_cell(1, 1));
        assert!(!raster.is_valid_cell(3, 0));

        let mask = raster.valid_mask();
        assert_eq!(mask.len(), 9);
        assert!(!mask[4]);
    }

    #[test]
    fn test_point_containment() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        raster.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));

        assert!(raster.contains_point(5.0, 5.0));
        assert!(!raster.contains_point(-1.0, 5.0));
        assert_eq!(raster.point_to_cell(0.5, 9.5), Some((0, 0)));
    }
}
