//! Item matrix assembly
//!
//! Flattens an ordered collection of heterogeneous items into one
//! row-aligned numeric matrix. Each logical sample occupies
//! `max_rows_per_value` physical rows: window-expanded raster items
//! contribute one row per sampling window, and single-row items have
//! their row replicated across the expansion factor so every item
//! contributes a value to every physical row. Columns follow item
//! insertion order; within an item, its own `column_count()`.

use ndarray::Array2;

use sparva_core::{Error, Item, ItemValues, RasterCapable, Result};

use crate::maybe_rayon::*;

/// Which value stream to assemble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSet {
    Training,
    Forecast,
}

/// A per-row domain problem recorded during non-strict assembly
#[derive(Debug, Clone)]
pub struct RowIssue {
    pub item: String,
    pub row: usize,
    pub message: String,
}

/// Result of one matrix assembly.
#[derive(Debug)]
pub struct Assembly {
    /// Row-aligned feature matrix (inputs, in item order)
    pub features: Array2<f64>,
    /// Row-aligned target matrix (outputs); zero columns for forecast
    /// assemblies
    pub targets: Array2<f64>,
    /// Physical rows per logical sample
    pub max_rows_per_value: usize,
    /// Rows substituted with NaN in non-strict mode
    pub issues: Vec<RowIssue>,
}

/// Assemble training features and targets from input and output items.
///
/// All items must agree on the logical sample count; in strict mode any
/// domain error aborts the assembly, otherwise the affected rows become
/// NaN and are reported in [`Assembly::issues`].
pub fn assemble_training(inputs: &[Item], outputs: &[Item], strict: bool) -> Result<Assembly> {
    if inputs.is_empty() || outputs.is_empty() {
        return Err(Error::InvalidParameter {
            name: "items",
            value: format!("{} inputs, {} outputs", inputs.len(), outputs.len()),
            reason: "training needs at least one input and one output item".into(),
        });
    }

    check_schemes(inputs.iter().chain(outputs.iter()))?;
    let n_logical = logical_count(inputs.iter().chain(outputs.iter()), SampleSet::Training)?;
    let factor = expansion_factor(inputs.iter().chain(outputs.iter()))?;

    let (features, mut issues) = build(inputs, SampleSet::Training, n_logical, factor, strict)?;
    let (targets, target_issues) = build(outputs, SampleSet::Training, n_logical, factor, strict)?;
    issues.extend(target_issues);

    Ok(Assembly {
        features,
        targets,
        max_rows_per_value: factor,
        issues,
    })
}

/// Assemble forecast features from input items.
pub fn assemble_forecast(inputs: &[Item], strict: bool) -> Result<Assembly> {
    if inputs.is_empty() {
        return Err(Error::InvalidParameter {
            name: "items",
            value: "0 inputs".into(),
            reason: "forecast needs at least one input item".into(),
        });
    }

    check_schemes(inputs.iter())?;
    let n_logical = logical_count(inputs.iter(), SampleSet::Forecast)?;
    let factor = expansion_factor(inputs.iter())?;

    let (features, issues) = build(inputs, SampleSet::Forecast, n_logical, factor, strict)?;

    Ok(Assembly {
        features,
        targets: Array2::zeros((n_logical * factor, 0)),
        max_rows_per_value: factor,
        issues,
    })
}

/// Logical sample count shared by all items, or a row-count mismatch
fn logical_count<'a, I>(items: I, set: SampleSet) -> Result<usize>
where
    I: Iterator<Item = &'a Item>,
{
    let mut expected: Option<usize> = None;
    for item in items {
        let count = match set {
            SampleSet::Training => item.num_training_values(),
            SampleSet::Forecast => item.num_forecast_values(),
        };
        match expected {
            None => expected = Some(count),
            Some(e) if e != count => {
                return Err(Error::RowCountMismatch {
                    item: item.name().to_string(),
                    expected: e,
                    actual: count,
                });
            }
            Some(_) => {}
        }
    }
    let n = expected.unwrap_or(0);
    if n == 0 {
        return Err(Error::InvalidParameter {
            name: "items",
            value: "0 values".into(),
            reason: "items carry no values for this sample set".into(),
        });
    }
    Ok(n)
}

/// Physical rows per logical sample. Every item must contribute either a
/// single row (replicated) or exactly the shared expansion factor.
fn expansion_factor<'a, I>(items: I) -> Result<usize>
where
    I: Iterator<Item = &'a Item> + Clone,
{
    let factor = items
        .clone()
        .map(|item| item.num_rows_per_value())
        .max()
        .unwrap_or(1);

    for item in items {
        let k = item.num_rows_per_value();
        if k != 1 && k != factor {
            return Err(Error::RowCountMismatch {
                item: item.name().to_string(),
                expected: factor,
                actual: k,
            });
        }
    }
    Ok(factor)
}

/// Raster items must carry a sampling scheme before assembly
fn check_schemes<'a, I>(items: I) -> Result<()>
where
    I: Iterator<Item = &'a Item>,
{
    for item in items {
        if let Some(raster) = item.as_raster() {
            if raster.sampling_scheme().is_none() {
                return Err(Error::MissingSamplingScheme {
                    item: item.name().to_string(),
                });
            }
        }
    }
    Ok(())
}

fn build(
    items: &[Item],
    set: SampleSet,
    n_logical: usize,
    factor: usize,
    strict: bool,
) -> Result<(Array2<f64>, Vec<RowIssue>)> {
    let width: usize = items.iter().map(|i| i.column_count()).sum();

    let samples: Vec<(Vec<f64>, Vec<RowIssue>)> = (0..n_logical)
        .into_par_iter()
        .map(|i| build_sample(items, set, i, factor, width, strict))
        .collect::<Result<Vec<_>>>()?;

    let mut flat = Vec::with_capacity(n_logical * factor * width);
    let mut issues = Vec::new();
    for (rows, sample_issues) in samples {
        flat.extend(rows);
        issues.extend(sample_issues);
    }

    let matrix = Array2::from_shape_vec((n_logical * factor, width), flat)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok((matrix, issues))
}

/// Build the `factor` physical rows of one logical sample, row-major
fn build_sample(
    items: &[Item],
    set: SampleSet,
    sample: usize,
    factor: usize,
    width: usize,
    strict: bool,
) -> Result<(Vec<f64>, Vec<RowIssue>)> {
    let mut rows = vec![0.0; factor * width];
    let mut issues = Vec::new();
    let mut col = 0;

    for item in items {
        let n_cols = item.column_count();
        let block = match fetch(item, set, sample) {
            Ok(block) => {
                // No-data cells surviving inside a sampled window are a
                // per-row domain problem, not a shape error
                if block.iter().any(|v| !v.is_finite()) {
                    let err = Error::NoDataInWindow {
                        item: item.name().to_string(),
                        row: sample,
                    };
                    if strict {
                        return Err(err);
                    }
                    issues.push(RowIssue {
                        item: item.name().to_string(),
                        row: sample,
                        message: err.to_string(),
                    });
                }
                block
            }
            Err(e @ Error::UnresolvedCategory { .. }) if !strict => {
                issues.push(RowIssue {
                    item: item.name().to_string(),
                    row: sample,
                    message: e.to_string(),
                });
                Array2::from_elem((item.num_rows_per_value(), n_cols), f64::NAN)
            }
            Err(e) => return Err(e),
        };

        if block.ncols() != n_cols {
            return Err(Error::WidthMismatch {
                left: n_cols,
                right: block.ncols(),
            });
        }

        for r in 0..factor {
            // Single-row items replicate across the expansion factor
            let src = if block.nrows() == factor { r } else { 0 };
            for c in 0..n_cols {
                rows[r * width + col + c] = block[(src, c)];
            }
        }
        col += n_cols;
    }

    Ok((rows, issues))
}

fn fetch(item: &Item, set: SampleSet, row: usize) -> Result<Array2<f64>> {
    match set {
        SampleSet::Training => item.training_values(row),
        SampleSet::Forecast => item.forecast_values(row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sparva_core::{
        CategoricalItem, Raster, RasterCapable, RealItem, RealRasterItem, Role, SamplingScheme,
        SamplingWindow,
    };

    fn real_input(name: &str, training: Vec<f64>) -> Item {
        let mut item = RealItem::new(Role::Input, name);
        item.set_training_values(training);
        item.into()
    }

    fn real_output(name: &str, training: Vec<f64>) -> Item {
        let mut item = RealItem::new(Role::Output, name);
        item.set_training_values(training);
        item.into()
    }

    fn windowed_raster_input(name: &str, n_values: usize) -> Item {
        let mut item = RealRasterItem::new(Role::Input, name);
        for v in 0..n_values {
            let mut grid = Raster::new(4, 4);
            for r in 0..4 {
                for c in 0..4 {
                    grid.set(r, c, (v * 100 + r * 4 + c) as f64).unwrap();
                }
            }
            item.add_training_grid(grid).unwrap();
        }
        let windows = vec![
            SamplingWindow {
                center: (0, 0),
                neighbors: vec![(0, 0)],
                distances: vec![0.0],
            },
            SamplingWindow {
                center: (1, 1),
                neighbors: vec![(1, 1)],
                distances: vec![0.0],
            },
            SamplingWindow {
                center: (2, 2),
                neighbors: vec![(2, 2)],
                distances: vec![0.0],
            },
        ];
        item.assign_sampling_scheme(Arc::new(SamplingScheme::new(windows, 1, false)));
        item.into()
    }

    #[test]
    fn test_plain_assembly_column_order() {
        let inputs = vec![
            real_input("a", vec![1.0, 2.0]),
            real_input("b", vec![10.0, 20.0]),
        ];
        let outputs = vec![real_output("y", vec![5.0, 6.0])];

        let assembly = assemble_training(&inputs, &outputs, true).unwrap();
        assert_eq!(assembly.features.shape(), &[2, 2]);
        assert_eq!(assembly.targets.shape(), &[2, 1]);
        assert_eq!(assembly.max_rows_per_value, 1);

        // Columns follow item insertion order
        assert_eq!(assembly.features[(0, 0)], 1.0);
        assert_eq!(assembly.features[(0, 1)], 10.0);
        assert_eq!(assembly.features[(1, 0)], 2.0);
        assert_eq!(assembly.targets[(1, 0)], 6.0);
    }

    #[test]
    fn test_single_row_items_replicate_across_expansion() {
        // Rows-per-value {1, 3} with 2 logical samples: 6 physical rows,
        // scalar values replicated across each sample's 3 window rows
        let inputs = vec![
            real_input("scalar", vec![7.0, 8.0]),
            windowed_raster_input("dem", 2),
        ];
        let outputs = vec![real_output("y", vec![1.0, 2.0])];

        let assembly = assemble_training(&inputs, &outputs, true).unwrap();
        assert_eq!(assembly.max_rows_per_value, 3);
        assert_eq!(assembly.features.shape(), &[6, 2]);
        assert_eq!(assembly.targets.shape(), &[6, 1]);

        for r in 0..3 {
            assert_eq!(assembly.features[(r, 0)], 7.0);
            assert_eq!(assembly.targets[(r, 0)], 1.0);
        }
        for r in 3..6 {
            assert_eq!(assembly.features[(r, 0)], 8.0);
            assert_eq!(assembly.targets[(r, 0)], 2.0);
        }
        // Window cells: (0,0), (1,1), (2,2) of each grid
        assert_eq!(assembly.features[(0, 1)], 0.0);
        assert_eq!(assembly.features[(1, 1)], 5.0);
        assert_eq!(assembly.features[(2, 1)], 10.0);
        assert_eq!(assembly.features[(3, 1)], 100.0);
    }

    #[test]
    fn test_logical_count_mismatch_aborts() {
        let inputs = vec![
            real_input("a", vec![0.0; 10]),
            real_input("b", vec![0.0; 11]),
        ];
        let outputs = vec![real_output("y", vec![0.0; 10])];

        match assemble_training(&inputs, &outputs, true) {
            Err(Error::RowCountMismatch {
                item,
                expected,
                actual,
            }) => {
                assert_eq!(item, "b");
                assert_eq!(expected, 10);
                assert_eq!(actual, 11);
            }
            other => panic!("expected RowCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_raster_without_scheme_aborts() {
        let mut raster = RealRasterItem::new(Role::Input, "dem");
        let mut grid = Raster::new(2, 2);
        grid.set(0, 0, 1.0).unwrap();
        raster.add_training_grid(grid).unwrap();

        let inputs = vec![Item::from(raster)];
        let outputs = vec![real_output("y", vec![1.0])];

        assert!(matches!(
            assemble_training(&inputs, &outputs, true),
            Err(Error::MissingSamplingScheme { .. })
        ));
    }

    #[test]
    fn test_nodata_window_strict_vs_lenient() {
        // A window over a no-data cell: strict assembly aborts, lenient
        // assembly keeps the NaN row and reports it
        let mut grid = Raster::new(4, 4);
        grid.set_nodata(Some(f64::NAN));
        for r in 0..4 {
            for c in 0..4 {
                grid.set(r, c, (r + c) as f64).unwrap();
            }
        }
        grid.set(1, 1, f64::NAN).unwrap();

        let mut raster = RealRasterItem::new(Role::Input, "dem");
        raster.add_training_grid(grid).unwrap();
        let windows = vec![SamplingWindow {
            center: (1, 1),
            neighbors: vec![(1, 1)],
            distances: vec![0.0],
        }];
        raster.assign_sampling_scheme(Arc::new(SamplingScheme::new(windows, 1, false)));

        let inputs = vec![Item::from(raster)];
        let outputs = vec![real_output("y", vec![1.0])];

        assert!(matches!(
            assemble_training(&inputs, &outputs, true),
            Err(Error::NoDataInWindow { .. })
        ));

        let assembly = assemble_training(&inputs, &outputs, false).unwrap();
        assert!(assembly.features[(0, 0)].is_nan());
        assert_eq!(assembly.issues.len(), 1);
        assert_eq!(assembly.issues[0].item, "dem");
    }

    #[test]
    fn test_unseen_category_strict_vs_lenient() {
        let mut cat = CategoricalItem::new(Role::Input, "landuse");
        cat.set_training_labels(&["forest", "water"]);
        cat.set_forecast_labels(&["forest", "swamp"]);
        let inputs = vec![Item::from(cat)];

        // Strict mode aborts the batch
        assert!(matches!(
            assemble_forecast(&inputs, true),
            Err(Error::UnresolvedCategory { .. })
        ));

        // Lenient mode substitutes NaN and records the issue
        let assembly = assemble_forecast(&inputs, false).unwrap();
        assert_eq!(assembly.features.shape(), &[2, 1]);
        assert_eq!(assembly.features[(0, 0)], 0.0);
        assert!(assembly.features[(1, 0)].is_nan());
        assert_eq!(assembly.issues.len(), 1);
        assert_eq!(assembly.issues[0].row, 1);
    }
}
