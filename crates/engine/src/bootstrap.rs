//! Raster bootstrap sampling
//!
//! Decides which spatial windows are sampled for raster-backed items.
//! Window centers are chosen over the intersection of valid cells of all
//! registered raster items; each window's neighbor set is every valid
//! cell within the window radius, ordered by increasing distance from the
//! center with row-major index breaking ties. The resulting scheme is
//! broadcast identically to every registered item so feature columns stay
//! aligned column-for-column across items sampled under one scheme.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use sparva_core::{Error, Item, ItemValues, RasterCapable, Result, SamplingScheme, SamplingWindow};

/// Default seed for the uniform-random center strategy.
///
/// Fixed so trained models are reproducible for identical configuration
/// and raster content.
pub const DEFAULT_SEED: u64 = 0x5eed;

/// How window centers are chosen over the valid-cell set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CenterStrategy {
    /// Uniform draw without replacement, seeded for reproducibility
    UniformRandom { seed: u64 },
    /// Evenly spaced cells along the row-major valid-cell list
    GridSpaced,
}

impl Default for CenterStrategy {
    fn default() -> Self {
        CenterStrategy::UniformRandom { seed: DEFAULT_SEED }
    }
}

/// Bootstrap sampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapParams {
    /// Number of sampling windows
    pub num_windows: usize,
    /// Window radius in cells; neighbors are the valid cells within this
    /// Euclidean radius of the center
    pub window_radius: usize,
    /// Append each neighbor's distance-from-center as an extra feature
    /// column
    pub include_distance: bool,
    /// Center-selection strategy
    pub strategy: CenterStrategy,
}

impl Default for BootstrapParams {
    fn default() -> Self {
        Self {
            num_windows: 16,
            window_radius: 2,
            include_distance: false,
            strategy: CenterStrategy::default(),
        }
    }
}

/// The bootstrap sampler.
///
/// Owns the canonical window/neighbor layout; raster items receive a
/// shared reference to it, never a copy.
#[derive(Debug, Clone)]
pub struct RasterBootstrap {
    params: BootstrapParams,
}

impl RasterBootstrap {
    /// Validate the configuration and create a sampler.
    pub fn new(params: BootstrapParams) -> Result<Self> {
        if params.num_windows == 0 {
            return Err(Error::InvalidParameter {
                name: "num_windows",
                value: "0".into(),
                reason: "at least one sampling window is required".into(),
            });
        }
        if params.window_radius == 0 {
            return Err(Error::InvalidParameter {
                name: "window_radius",
                value: "0".into(),
                reason: "window radius must be positive".into(),
            });
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &BootstrapParams {
        &self.params
    }

    /// Sample windows over the raster items in `items` and assign the
    /// resulting scheme to each of them.
    ///
    /// Non-raster items are ignored. All raster items must share one grid
    /// shape; centers are restricted to cells valid in every grid of
    /// every raster item. Input and output items are sampled together so
    /// one scheme is broadcast across both sides.
    pub fn sample_rasters<'a, I>(&self, items: I) -> Result<Arc<SamplingScheme>>
    where
        I: IntoIterator<Item = &'a mut Item>,
    {
        let mut items: Vec<&mut Item> = items.into_iter().collect();
        let (rows, cols) = self.shared_shape(&items)?;
        let valid = self.valid_cells(&items, rows, cols);

        if valid.len() < self.params.num_windows {
            return Err(Error::InvalidParameter {
                name: "num_windows",
                value: self.params.num_windows.to_string(),
                reason: format!("only {} valid cells are available", valid.len()),
            });
        }

        let mut centers = self.pick_centers(&valid);
        // Canonical window order: row-major over center cells
        centers.sort_by_key(|&(r, c)| r * cols + c);

        let mask = self.valid_mask(&items, rows, cols);
        let mut windows: Vec<SamplingWindow> = centers
            .into_iter()
            .map(|center| self.window_at(center, rows, cols, &mask))
            .collect();

        // Valid-cell filtering can leave ragged neighbor counts; equalize
        // to the scheme-wide minimum so feature columns stay positional
        let k_min = windows
            .iter()
            .map(|w| w.neighbors.len())
            .min()
            .unwrap_or(0);
        for window in &mut windows {
            window.neighbors.truncate(k_min);
            window.distances.truncate(k_min);
        }

        let scheme = Arc::new(SamplingScheme::new(
            windows,
            k_min,
            self.params.include_distance,
        ));

        for item in items.iter_mut() {
            if let Some(raster) = item.as_raster_mut() {
                raster.assign_sampling_scheme(Arc::clone(&scheme));
            }
        }

        Ok(scheme)
    }

    fn shared_shape(&self, items: &[&mut Item]) -> Result<(usize, usize)> {
        let mut shape: Option<(usize, usize)> = None;
        for item in items.iter() {
            let Some(raster) = item.as_raster() else {
                continue;
            };
            let item_shape = raster.grid_shape().ok_or_else(|| {
                Error::Algorithm(format!("raster item '{}' has no grids", item.name()))
            })?;
            match shape {
                None => shape = Some(item_shape),
                Some((er, ec)) if (er, ec) != item_shape => {
                    return Err(Error::SizeMismatch {
                        er,
                        ec,
                        ar: item_shape.0,
                        ac: item_shape.1,
                    });
                }
                Some(_) => {}
            }
        }
        shape.ok_or_else(|| Error::InvalidParameter {
            name: "items",
            value: "0 raster items".into(),
            reason: "bootstrap sampling needs at least one raster item".into(),
        })
    }

    /// Row-major mask of cells valid in every grid of every raster item
    fn valid_mask(&self, items: &[&mut Item], rows: usize, cols: usize) -> Vec<bool> {
        let mut mask = vec![true; rows * cols];
        for item in items.iter() {
            let Some(raster) = item.as_raster() else {
                continue;
            };
            for r in 0..rows {
                for c in 0..cols {
                    if mask[r * cols + c] && !raster.is_valid_cell(r, c) {
                        mask[r * cols + c] = false;
                    }
                }
            }
        }
        mask
    }

    fn valid_cells(&self, items: &[&mut Item], rows: usize, cols: usize) -> Vec<(usize, usize)> {
        self.valid_mask(items, rows, cols)
            .iter()
            .enumerate()
            .filter(|(_, &ok)| ok)
            .map(|(i, _)| (i / cols, i % cols))
            .collect()
    }

    fn pick_centers(&self, valid: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let n = self.params.num_windows;
        match self.params.strategy {
            CenterStrategy::UniformRandom { seed } => {
                // Partial Fisher-Yates draw without replacement
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                let mut indexes: Vec<usize> = (0..valid.len()).collect();
                for i in 0..n {
                    let j = rng.gen_range(i..indexes.len());
                    indexes.swap(i, j);
                }
                indexes.iter().take(n).map(|&i| valid[i]).collect()
            }
            CenterStrategy::GridSpaced => {
                let step = valid.len() / n;
                (0..n).map(|i| valid[i * step]).collect()
            }
        }
    }

    /// Neighbor set of one window: every valid cell within the radius,
    /// ordered by distance with row-major tie-break
    fn window_at(
        &self,
        center: (usize, usize),
        rows: usize,
        cols: usize,
        mask: &[bool],
    ) -> SamplingWindow {
        let radius = self.params.window_radius as isize;
        let max_dist = self.params.window_radius as f64;
        let (cr, cc) = (center.0 as isize, center.1 as isize);

        let mut cells: Vec<(f64, usize, (usize, usize))> = Vec::new();
        for dr in -radius..=radius {
            for dc in -radius..=radius {
                let r = cr + dr;
                let c = cc + dc;
                if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                    continue;
                }
                let dist = ((dr * dr + dc * dc) as f64).sqrt();
                if dist > max_dist {
                    continue;
                }
                let (r, c) = (r as usize, c as usize);
                if mask[r * cols + c] {
                    cells.push((dist, r * cols + c, (r, c)));
                }
            }
        }

        cells.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        SamplingWindow {
            center,
            neighbors: cells.iter().map(|&(_, _, cell)| cell).collect(),
            distances: cells.iter().map(|&(d, _, _)| d).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparva_core::{ItemValues, Raster, RealRasterItem, Role};

    fn raster_item(name: &str, rows: usize, cols: usize, nodata_cells: &[(usize, usize)]) -> Item {
        let mut grid = Raster::new(rows, cols);
        grid.set_nodata(Some(f64::NAN));
        for r in 0..rows {
            for c in 0..cols {
                grid.set(r, c, (r * cols + c) as f64).unwrap();
            }
        }
        for &(r, c) in nodata_cells {
            grid.set(r, c, f64::NAN).unwrap();
        }
        let mut item = RealRasterItem::new(Role::Input, name);
        item.add_training_grid(grid).unwrap();
        item.into()
    }

    fn sampler(num_windows: usize, radius: usize) -> RasterBootstrap {
        RasterBootstrap::new(BootstrapParams {
            num_windows,
            window_radius: radius,
            ..BootstrapParams::default()
        })
        .unwrap()
    }

    #[test]
    fn test_configuration_errors() {
        assert!(RasterBootstrap::new(BootstrapParams {
            num_windows: 0,
            ..BootstrapParams::default()
        })
        .is_err());
        assert!(RasterBootstrap::new(BootstrapParams {
            window_radius: 0,
            ..BootstrapParams::default()
        })
        .is_err());
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let build = || {
            let mut items = vec![
                raster_item("a", 12, 12, &[(3, 3)]),
                raster_item("b", 12, 12, &[]),
            ];
            let scheme = sampler(6, 2).sample_rasters(&mut items).unwrap();
            (items, scheme)
        };

        let (_, first) = build();
        let (_, second) = build();
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_neighbor_ordering_distance_then_row_major() {
        // Invalidate row 0 and column 0 so the first valid cell (and the
        // grid-spaced center) is (1, 1)
        let border: Vec<(usize, usize)> = (0..9)
            .map(|c| (0, c))
            .chain((1..9).map(|r| (r, 0)))
            .collect();
        let mut items = vec![raster_item("a", 9, 9, &border)];
        let bootstrap = RasterBootstrap::new(BootstrapParams {
            num_windows: 1,
            window_radius: 1,
            include_distance: false,
            strategy: CenterStrategy::GridSpaced,
        })
        .unwrap();
        let scheme = bootstrap.sample_rasters(&mut items).unwrap();

        let window = &scheme.windows()[0];
        assert_eq!(window.center, (1, 1));

        // Center first, then the distance-1 cells in row-major order;
        // (0, 1) and (1, 0) are invalid and excluded
        assert_eq!(window.neighbors, vec![(1, 1), (1, 2), (2, 1)]);
        assert_eq!(window.distances, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_scheme_broadcast_to_all_items() {
        let mut items = vec![
            raster_item("a", 10, 10, &[]),
            raster_item("b", 10, 10, &[]),
        ];
        let scheme = sampler(4, 1).sample_rasters(&mut items).unwrap();

        for item in &items {
            let assigned = item.as_raster().unwrap().sampling_scheme().unwrap();
            assert!(Arc::ptr_eq(assigned, &scheme));
        }
        assert_eq!(items[0].num_rows_per_value(), 4);
        assert_eq!(items[0].column_count(), scheme.neighbors_per_window());
    }

    #[test]
    fn test_nodata_cells_excluded() {
        // Invalidate a block in one item; the intersection excludes it
        // for every item
        let holes: Vec<(usize, usize)> = (0..4).flat_map(|r| (0..4).map(move |c| (r, c))).collect();
        let mut items = vec![
            raster_item("a", 8, 8, &holes),
            raster_item("b", 8, 8, &[]),
        ];
        let scheme = sampler(8, 1).sample_rasters(&mut items).unwrap();

        for window in scheme.windows() {
            for &(r, c) in &window.neighbors {
                assert!(!(r < 4 && c < 4), "cell ({r}, {c}) is inside the hole");
            }
        }
    }

    #[test]
    fn test_include_distance_doubles_columns() {
        let mut items = vec![raster_item("a", 10, 10, &[])];
        let bootstrap = RasterBootstrap::new(BootstrapParams {
            num_windows: 2,
            window_radius: 1,
            include_distance: true,
            strategy: CenterStrategy::GridSpaced,
        })
        .unwrap();
        let scheme = bootstrap.sample_rasters(&mut items).unwrap();
        assert_eq!(
            scheme.columns_per_window(),
            scheme.neighbors_per_window() * 2
        );
    }

    #[test]
    fn test_too_few_valid_cells() {
        let mut items = vec![raster_item("a", 2, 2, &[])];
        assert!(sampler(16, 1).sample_rasters(&mut items).is_err());
    }
}
