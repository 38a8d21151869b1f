//! Raster-backed items
//!
//! Raster items hold their value streams as georeferenced grids. One
//! logical value (one grid) expands into one physical matrix row per
//! sampling window; the feature columns of a row are the values of the
//! window's neighbor cells, optionally followed by each neighbor's
//! distance from the window center.

use std::sync::Arc;

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::item::{CategoryMap, ItemValues, Role, ValueKind};
use crate::raster::{CellValue, GeoTransform, Raster, SamplingScheme};

/// Spatial capabilities shared by raster-backed items: coordinate mapping,
/// validity tests and sampling-scheme assignment.
///
/// Items hold a shared reference to the sampler-owned scheme, never a
/// copy, so every item sampled under one scheme sees the same window
/// layout.
pub trait RasterCapable {
    /// Grid shape, once at least one grid is present
    fn grid_shape(&self) -> Option<(usize, usize)>;

    /// Geotransform of the backing grids
    fn transform(&self) -> Option<GeoTransform>;

    /// Whether the cell holds a usable value in every grid of the item
    fn is_valid_cell(&self, row: usize, col: usize) -> bool;

    /// Whether a map coordinate falls inside the item's extent
    fn contains_point(&self, x: f64, y: f64) -> bool;

    /// Integer cell index for a map coordinate
    fn point_to_cell(&self, x: f64, y: f64) -> Option<(usize, usize)>;

    /// Map coordinates of a cell center
    fn cell_to_point(&self, row: usize, col: usize) -> Option<(f64, f64)>;

    /// The assigned sampling scheme, if any
    fn sampling_scheme(&self) -> Option<&Arc<SamplingScheme>>;

    /// Assign the scheme produced by the bootstrap sampler
    fn assign_sampling_scheme(&mut self, scheme: Arc<SamplingScheme>);
}

/// Extract the window feature block for one grid: one row per sampling
/// window, neighbor values first, distances appended when the scheme
/// includes them. Invalid cells become NaN.
fn window_features<T, F>(
    grid: &Raster<T>,
    scheme: &SamplingScheme,
    cell_value: F,
) -> Array2<f64>
where
    T: CellValue,
    F: Fn(&Raster<T>, usize, usize) -> f64,
{
    let n_windows = scheme.num_windows();
    let n_neighbors = scheme.neighbors_per_window();
    let n_cols = scheme.columns_per_window();

    let mut out = Array2::from_elem((n_windows, n_cols), f64::NAN);
    for (w, window) in scheme.windows().iter().enumerate() {
        for (j, &(row, col)) in window.neighbors.iter().take(n_neighbors).enumerate() {
            out[(w, j)] = cell_value(grid, row, col);
            if scheme.include_distance() {
                out[(w, n_neighbors + j)] = window.distances[j];
            }
        }
    }
    out
}

/// Scatter window-row predictions back onto a grid, averaging cells
/// covered by more than one window. Cells no window touches stay NaN.
fn scatter_mean(
    shape: (usize, usize),
    scheme: &SamplingScheme,
    values: &Array2<f64>,
) -> Array2<f64> {
    let n_neighbors = scheme.neighbors_per_window();
    let mut sums = Array2::<f64>::zeros(shape);
    let mut counts = Array2::<f64>::zeros(shape);

    for (w, window) in scheme.windows().iter().enumerate() {
        for (j, &(row, col)) in window.neighbors.iter().take(n_neighbors).enumerate() {
            let v = values[(w, j)];
            if v.is_finite() {
                sums[(row, col)] += v;
                counts[(row, col)] += 1.0;
            }
        }
    }

    let mut out = Array2::from_elem(shape, f64::NAN);
    for ((idx, &count), &sum) in counts.indexed_iter().zip(sums.iter()) {
        if count > 0.0 {
            out[idx] = sum / count;
        }
    }
    out
}

fn check_window_block(scheme: &SamplingScheme, values: &Array2<f64>) -> Result<()> {
    if values.nrows() != scheme.num_windows() || values.ncols() < scheme.neighbors_per_window() {
        return Err(Error::SizeMismatch {
            er: scheme.num_windows(),
            ec: scheme.columns_per_window(),
            ar: values.nrows(),
            ac: values.ncols(),
        });
    }
    Ok(())
}

/// A named real variable backed by raster grids.
#[derive(Debug, Clone)]
pub struct RealRasterItem {
    name: String,
    role: Role,
    training: Vec<Raster<f64>>,
    forecast: Vec<Raster<f64>>,
    forecast_uncertainty: Vec<Raster<f64>>,
    template: Option<Raster<f64>>,
    scheme: Option<Arc<SamplingScheme>>,
}

impl RealRasterItem {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            training: Vec::new(),
            forecast: Vec::new(),
            forecast_uncertainty: Vec::new(),
            template: None,
            scheme: None,
        }
    }

    /// Append one training grid; all grids of an item must share a shape
    pub fn add_training_grid(&mut self, grid: Raster<f64>) -> Result<()> {
        self.check_shape(&grid)?;
        self.remember_template(&grid);
        self.training.push(grid);
        Ok(())
    }

    /// Append one forecast-input grid
    pub fn add_forecast_grid(&mut self, grid: Raster<f64>) -> Result<()> {
        self.check_shape(&grid)?;
        self.remember_template(&grid);
        self.forecast.push(grid);
        Ok(())
    }

    /// Reference grid for output shape/transform (needed for pure
    /// regression output items that carry no grids of their own)
    pub fn set_template(&mut self, template: Raster<f64>) {
        self.template = Some(template);
    }

    /// Forecast grids, predictions included once regression has run
    pub fn forecast_grids(&self) -> &[Raster<f64>] {
        &self.forecast
    }

    pub fn forecast_uncertainty_grids(&self) -> &[Raster<f64>] {
        &self.forecast_uncertainty
    }

    fn check_shape(&self, grid: &Raster<f64>) -> Result<()> {
        if let Some((rows, cols)) = self.grid_shape() {
            if grid.shape() != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: grid.rows(),
                    ac: grid.cols(),
                });
            }
        }
        Ok(())
    }

    fn remember_template(&mut self, grid: &Raster<f64>) {
        if self.template.is_none() {
            self.template = Some(grid.like(f64::NAN));
        }
    }

    fn first_grid(&self) -> Option<&Raster<f64>> {
        self.training
            .first()
            .or_else(|| self.forecast.first())
            .or(self.template.as_ref())
    }

    fn scheme_ref(&self) -> Result<&Arc<SamplingScheme>> {
        self.scheme
            .as_ref()
            .ok_or_else(|| Error::MissingSamplingScheme {
                item: self.name.clone(),
            })
    }
}

impl ItemValues for RealRasterItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        self.role
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Real
    }

    fn column_count(&self) -> usize {
        self.scheme
            .as_ref()
            .map(|s| s.columns_per_window())
            .unwrap_or(0)
    }

    fn num_training_values(&self) -> usize {
        self.training.len()
    }

    fn num_forecast_values(&self) -> usize {
        self.forecast.len()
    }

    fn num_rows_per_value(&self) -> usize {
        self.scheme.as_ref().map(|s| s.num_windows()).unwrap_or(1)
    }

    fn training_values(&self, row: usize) -> Result<Array2<f64>> {
        let scheme = self.scheme_ref()?;
        let grid = self
            .training
            .get(row)
            .ok_or_else(|| Error::RowCountMismatch {
                item: self.name.clone(),
                expected: row + 1,
                actual: self.training.len(),
            })?;
        Ok(window_features(grid, scheme, |g, r, c| {
            match g.get(r, c) {
                Ok(v) if !g.is_nodata(v) => v,
                _ => f64::NAN,
            }
        }))
    }

    fn forecast_values(&self, row: usize) -> Result<Array2<f64>> {
        let scheme = self.scheme_ref()?;
        let grid = self
            .forecast
            .get(row)
            .ok_or_else(|| Error::RowCountMismatch {
                item: self.name.clone(),
                expected: row + 1,
                actual: self.forecast.len(),
            })?;
        Ok(window_features(grid, scheme, |g, r, c| {
            match g.get(r, c) {
                Ok(v) if !g.is_nodata(v) => v,
                _ => f64::NAN,
            }
        }))
    }

    fn set_forecast_values(
        &mut self,
        row: usize,
        values: &Array2<f64>,
        uncertainty: &Array2<f64>,
    ) -> Result<()> {
        let scheme = Arc::clone(self.scheme_ref()?);
        check_window_block(&scheme, values)?;
        check_window_block(&scheme, uncertainty)?;

        let template = self.template.clone().ok_or_else(|| {
            Error::Algorithm(format!(
                "raster item '{}' has no reference grid for outputs",
                self.name
            ))
        })?;
        let shape = template.shape();

        let mut predicted = template.like(f64::NAN);
        *predicted.data_mut() = scatter_mean(shape, &scheme, values);
        let mut spread = template.like(f64::NAN);
        *spread.data_mut() = scatter_mean(shape, &scheme, uncertainty);

        let blank = template.like(f64::NAN);
        while self.forecast.len() < row + 1 {
            self.forecast.push(blank.clone());
        }
        while self.forecast_uncertainty.len() < row + 1 {
            self.forecast_uncertainty.push(blank.clone());
        }
        self.forecast[row] = predicted;
        self.forecast_uncertainty[row] = spread;
        Ok(())
    }
}

impl RasterCapable for RealRasterItem {
    fn grid_shape(&self) -> Option<(usize, usize)> {
        self.first_grid().map(|g| g.shape())
    }

    fn transform(&self) -> Option<GeoTransform> {
        self.first_grid().map(|g| *g.transform())
    }

    fn is_valid_cell(&self, row: usize, col: usize) -> bool {
        if self.training.is_empty() && self.forecast.is_empty() {
            return false;
        }
        self.training
            .iter()
            .chain(self.forecast.iter())
            .all(|g| g.is_valid_cell(row, col))
    }

    fn contains_point(&self, x: f64, y: f64) -> bool {
        self.first_grid().is_some_and(|g| g.contains_point(x, y))
    }

    fn point_to_cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        self.first_grid().and_then(|g| g.point_to_cell(x, y))
    }

    fn cell_to_point(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        self.first_grid().map(|g| g.cell_to_point(row, col))
    }

    fn sampling_scheme(&self) -> Option<&Arc<SamplingScheme>> {
        self.scheme.as_ref()
    }

    fn assign_sampling_scheme(&mut self, scheme: Arc<SamplingScheme>) {
        self.scheme = Some(scheme);
    }
}

/// A named categorical variable backed by class-code raster grids.
#[derive(Debug, Clone)]
pub struct CategoricalRasterItem {
    name: String,
    role: Role,
    categories: CategoryMap,
    training: Vec<Raster<i32>>,
    forecast: Vec<Raster<i32>>,
    forecast_uncertainty: Vec<Raster<f64>>,
    template: Option<Raster<i32>>,
    scheme: Option<Arc<SamplingScheme>>,
}

impl CategoricalRasterItem {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            categories: CategoryMap::new(),
            training: Vec::new(),
            forecast: Vec::new(),
            forecast_uncertainty: Vec::new(),
            template: None,
            scheme: None,
        }
    }

    /// Replace the label/code mapping with explicit pairs
    pub fn set_categories<S: AsRef<str>>(&mut self, categories: &[(S, i32)]) -> Result<()> {
        self.categories.set_categories(categories)
    }

    /// Append one training grid; observed class codes are registered
    pub fn add_training_grid(&mut self, grid: Raster<i32>) -> Result<()> {
        self.check_shape(&grid)?;
        for &code in grid.data().iter() {
            if !grid.is_nodata(code) {
                self.categories.register_code(code);
            }
        }
        self.remember_template(&grid);
        self.training.push(grid);
        Ok(())
    }

    /// Append one forecast-input grid.
    ///
    /// Codes are not registered: a class unseen during training surfaces
    /// as an unresolved-category error at assembly time.
    pub fn add_forecast_grid(&mut self, grid: Raster<i32>) -> Result<()> {
        self.check_shape(&grid)?;
        self.remember_template(&grid);
        self.forecast.push(grid);
        Ok(())
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    pub fn forecast_grids(&self) -> &[Raster<i32>] {
        &self.forecast
    }

    pub fn forecast_uncertainty_grids(&self) -> &[Raster<f64>] {
        &self.forecast_uncertainty
    }

    fn check_shape(&self, grid: &Raster<i32>) -> Result<()> {
        if let Some((rows, cols)) = self.grid_shape() {
            if grid.shape() != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: grid.rows(),
                    ac: grid.cols(),
                });
            }
        }
        Ok(())
    }

    fn remember_template(&mut self, grid: &Raster<i32>) {
        if self.template.is_none() {
            let mut t = grid.like(grid.nodata().unwrap_or_else(i32::default_nodata));
            t.set_nodata(Some(grid.nodata().unwrap_or_else(i32::default_nodata)));
            self.template = Some(t);
        }
    }

    fn first_grid(&self) -> Option<&Raster<i32>> {
        self.training
            .first()
            .or_else(|| self.forecast.first())
            .or(self.template.as_ref())
    }

    fn scheme_ref(&self) -> Result<&Arc<SamplingScheme>> {
        self.scheme
            .as_ref()
            .ok_or_else(|| Error::MissingSamplingScheme {
                item: self.name.clone(),
            })
    }

    /// Dense index for a cell's code, or an unresolved-category error
    fn cell_index(&self, grid: &Raster<i32>, row: usize, col: usize, value_row: usize) -> Result<f64> {
        let code = match grid.get(row, col) {
            Ok(c) if !grid.is_nodata(c) => c,
            _ => return Ok(f64::NAN),
        };
        match self.categories.index_for_code(code) {
            Some(i) => Ok(i as f64),
            None => Err(Error::UnresolvedCategory {
                item: self.name.clone(),
                row: value_row,
                label: code.to_string(),
            }),
        }
    }
}

impl ItemValues for CategoricalRasterItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        self.role
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Categorical
    }

    fn column_count(&self) -> usize {
        self.scheme
            .as_ref()
            .map(|s| s.columns_per_window())
            .unwrap_or(0)
    }

    fn num_training_values(&self) -> usize {
        self.training.len()
    }

    fn num_forecast_values(&self) -> usize {
        self.forecast.len()
    }

    fn num_rows_per_value(&self) -> usize {
        self.scheme.as_ref().map(|s| s.num_windows()).unwrap_or(1)
    }

    fn training_values(&self, row: usize) -> Result<Array2<f64>> {
        let scheme = self.scheme_ref()?;
        let grid = self
            .training
            .get(row)
            .ok_or_else(|| Error::RowCountMismatch {
                item: self.name.clone(),
                expected: row + 1,
                actual: self.training.len(),
            })?;

        let mut out = window_features(grid, scheme, |_, _, _| f64::NAN);
        let n = scheme.neighbors_per_window();
        for (w, window) in scheme.windows().iter().enumerate() {
            for (j, &(r, c)) in window.neighbors.iter().take(n).enumerate() {
                out[(w, j)] = self.cell_index(grid, r, c, row)?;
            }
        }
        Ok(out)
    }

    fn forecast_values(&self, row: usize) -> Result<Array2<f64>> {
        let scheme = self.scheme_ref()?;
        let grid = self
            .forecast
            .get(row)
            .ok_or_else(|| Error::RowCountMismatch {
                item: self.name.clone(),
                expected: row + 1,
                actual: self.forecast.len(),
            })?;

        let mut out = window_features(grid, scheme, |_, _, _| f64::NAN);
        let n = scheme.neighbors_per_window();
        for (w, window) in scheme.windows().iter().enumerate() {
            for (j, &(r, c)) in window.neighbors.iter().take(n).enumerate() {
                out[(w, j)] = self.cell_index(grid, r, c, row)?;
            }
        }
        Ok(out)
    }

    fn set_forecast_values(
        &mut self,
        row: usize,
        values: &Array2<f64>,
        uncertainty: &Array2<f64>,
    ) -> Result<()> {
        let scheme = Arc::clone(self.scheme_ref()?);
        check_window_block(&scheme, values)?;
        check_window_block(&scheme, uncertainty)?;

        let template = self.template.clone().ok_or_else(|| {
            Error::Algorithm(format!(
                "raster item '{}' has no reference grid for outputs",
                self.name
            ))
        })?;
        let shape = template.shape();
        let nodata = template.nodata().unwrap_or_else(i32::default_nodata);

        // Average predicted indexes per cell, then snap to the nearest
        // observed class
        let mean_index = scatter_mean(shape, &scheme, values);
        let mut predicted = template.clone();
        for (idx, &mean) in mean_index.indexed_iter() {
            let code = self
                .categories
                .nearest_index(mean)
                .and_then(|i| self.categories.code_for_index(i));
            predicted.data_mut()[idx] = code.unwrap_or(nodata);
        }

        let mut spread: Raster<f64> = Raster::new(shape.0, shape.1);
        spread.set_transform(*template.transform());
        spread.set_nodata(Some(f64::NAN));
        *spread.data_mut() = scatter_mean(shape, &scheme, uncertainty);

        while self.forecast.len() < row + 1 {
            self.forecast.push(template.clone());
        }
        while self.forecast_uncertainty.len() < row + 1 {
            self.forecast_uncertainty.push(spread.like(f64::NAN));
        }
        self.forecast[row] = predicted;
        self.forecast_uncertainty[row] = spread;
        Ok(())
    }
}

impl RasterCapable for CategoricalRasterItem {
    fn grid_shape(&self) -> Option<(usize, usize)> {
        self.first_grid().map(|g| g.shape())
    }

    fn transform(&self) -> Option<GeoTransform> {
        self.first_grid().map(|g| *g.transform())
    }

    fn is_valid_cell(&self, row: usize, col: usize) -> bool {
        if self.training.is_empty() && self.forecast.is_empty() {
            return false;
        }
        self.training
            .iter()
            .chain(self.forecast.iter())
            .all(|g| g.is_valid_cell(row, col))
    }

    fn contains_point(&self, x: f64, y: f64) -> bool {
        self.first_grid().is_some_and(|g| g.contains_point(x, y))
    }

    fn point_to_cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        self.first_grid().and_then(|g| g.point_to_cell(x, y))
    }

    fn cell_to_point(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        self.first_grid().map(|g| g.cell_to_point(row, col))
    }

    fn sampling_scheme(&self) -> Option<&Arc<SamplingScheme>> {
        self.scheme.as_ref()
    }

    fn assign_sampling_scheme(&mut self, scheme: Arc<SamplingScheme>) {
        self.scheme = Some(scheme);
    }
}
