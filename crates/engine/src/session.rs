//! Session orchestration
//!
//! A session owns the item collections, the kernel, the optional
//! bootstrap sampler, the training configuration and the trained model,
//! and wires the pipeline together: bootstrap sampling, matrix assembly,
//! training, regression and result write-back, according to the
//! configured run mode.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sparva_core::{Error, Item, ItemValues, Result, Role};

use crate::assemble::{assemble_forecast, assemble_training};
use crate::bootstrap::RasterBootstrap;
use crate::kernel::Kernel;
use crate::predict::predict;
use crate::train::{train, SparseModel, StopHandle, TrainParams};

/// What a session run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Fit the model only
    Training,
    /// Apply a previously trained model only
    Regression,
    /// Fit, then forecast
    TrainingAndRegression,
}

/// One regression session over a set of items.
#[derive(Debug)]
pub struct Session {
    inputs: Vec<Item>,
    outputs: Vec<Item>,
    kernel: Kernel,
    bootstrap: Option<RasterBootstrap>,
    params: TrainParams,
    mode: RunMode,
    strict: bool,
    model: Option<SparseModel>,
    stop: StopHandle,
}

impl Session {
    pub fn new(kernel: Kernel, params: TrainParams, mode: RunMode) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            kernel,
            bootstrap: None,
            params,
            mode,
            strict: true,
            model: None,
            stop: StopHandle::new(),
        }
    }

    /// Add an input item. The item's role must be `Input` and its name
    /// unique among inputs.
    pub fn add_input_item(&mut self, item: Item) -> Result<()> {
        Self::add_item(&mut self.inputs, item, Role::Input)
    }

    /// Add an output item. The item's role must be `Output` and its name
    /// unique among outputs.
    pub fn add_output_item(&mut self, item: Item) -> Result<()> {
        Self::add_item(&mut self.outputs, item, Role::Output)
    }

    fn add_item(items: &mut Vec<Item>, item: Item, role: Role) -> Result<()> {
        if item.role() != role {
            return Err(Error::InvalidParameter {
                name: "item",
                value: item.name().to_string(),
                reason: format!("expected a {role:?} item, got {:?}", item.role()),
            });
        }
        if items.iter().any(|existing| existing.name() == item.name()) {
            return Err(Error::InvalidParameter {
                name: "item",
                value: item.name().to_string(),
                reason: "an item with this name already exists".into(),
            });
        }
        items.push(item);
        Ok(())
    }

    /// Remove an input item by name
    pub fn remove_input_item(&mut self, name: &str) -> bool {
        let before = self.inputs.len();
        self.inputs.retain(|item| item.name() != name);
        self.inputs.len() != before
    }

    /// Remove an output item by name
    pub fn remove_output_item(&mut self, name: &str) -> bool {
        let before = self.outputs.len();
        self.outputs.retain(|item| item.name() != name);
        self.outputs.len() != before
    }

    pub fn inputs(&self) -> &[Item] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Item] {
        &self.outputs
    }

    /// Output item by name, for reading results after a run
    pub fn output_item(&self, name: &str) -> Option<&Item> {
        self.outputs.iter().find(|item| item.name() == name)
    }

    /// Configure bootstrap sampling for raster items
    pub fn set_bootstrap(&mut self, bootstrap: RasterBootstrap) {
        self.bootstrap = Some(bootstrap);
    }

    /// In strict mode any per-row domain error aborts the run; otherwise
    /// affected rows are skipped with NaN and reported in the log
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Install a previously trained model (for `Regression` mode)
    pub fn set_model(&mut self, model: SparseModel) {
        self.model = Some(model);
    }

    /// The trained model, frozen after a run
    pub fn model(&self) -> Option<&SparseModel> {
        self.model.as_ref()
    }

    /// Handle for requesting a cooperative stop from another thread.
    /// Honored at iteration boundaries as budget exhaustion.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run the session according to its mode.
    pub fn run(&mut self) -> Result<()> {
        if let Some(bootstrap) = &self.bootstrap {
            let scheme =
                bootstrap.sample_rasters(self.inputs.iter_mut().chain(self.outputs.iter_mut()))?;
            debug!(
                windows = scheme.num_windows(),
                neighbors = scheme.neighbors_per_window(),
                "bootstrap scheme sampled"
            );
        }

        match self.mode {
            RunMode::Training => self.train_model(),
            RunMode::Regression => {
                if self.model.is_none() {
                    return Err(Error::InvalidParameter {
                        name: "mode",
                        value: "Regression".into(),
                        reason: "regression mode requires a previously trained model".into(),
                    });
                }
                self.regress()
            }
            RunMode::TrainingAndRegression => {
                self.train_model()?;
                self.regress()
            }
        }
    }

    fn train_model(&mut self) -> Result<()> {
        let assembly = assemble_training(&self.inputs, &self.outputs, self.strict)?;
        for issue in &assembly.issues {
            warn!(item = %issue.item, row = issue.row, "{}", issue.message);
        }

        // Logical samples with domain problems are left out of training
        // rather than entering the kernel matrix as NaN
        let (features, targets) = if assembly.issues.is_empty() {
            (assembly.features, assembly.targets)
        } else {
            let factor = assembly.max_rows_per_value;
            let bad: std::collections::HashSet<usize> =
                assembly.issues.iter().map(|issue| issue.row).collect();
            let keep: Vec<usize> = (0..assembly.features.nrows())
                .filter(|r| !bad.contains(&(r / factor)))
                .collect();
            warn!(
                dropped = bad.len(),
                "excluding affected samples from training"
            );
            (
                assembly.features.select(Axis(0), &keep),
                assembly.targets.select(Axis(0), &keep),
            )
        };

        let model = train(
            features.view(),
            targets.view(),
            &self.kernel,
            &self.params,
            Some(&self.stop),
        )?;
        debug!(
            relevant = model.relevant.len(),
            iterations = model.iterations,
            converged = model.converged,
            "model trained"
        );
        self.model = Some(model);
        Ok(())
    }

    fn regress(&mut self) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::Algorithm("no trained model available".into()))?;

        let assembly = assemble_forecast(&self.inputs, self.strict)?;
        for issue in &assembly.issues {
            warn!(item = %issue.item, row = issue.row, "{}", issue.message);
        }

        let output_width: usize = self.outputs.iter().map(|item| item.column_count()).sum();
        if output_width != model.mu.ncols() {
            return Err(Error::WidthMismatch {
                left: output_width,
                right: model.mu.ncols(),
            });
        }

        let factor = assembly.max_rows_per_value;
        for item in &self.outputs {
            let k = item.num_rows_per_value();
            if k != 1 && k != factor {
                return Err(Error::RowCountMismatch {
                    item: item.name().to_string(),
                    expected: factor,
                    actual: k,
                });
            }
        }

        let prediction = predict(model, &self.kernel, assembly.features.view())?;
        let n_logical = prediction.mean.nrows() / factor;

        // Fold window-expanded physical rows back into logical values and
        // push them into each output item
        for sample in 0..n_logical {
            let row_range = sample * factor..(sample + 1) * factor;
            let mut col = 0;
            for item in &mut self.outputs {
                let n_cols = item.column_count();
                let values = prediction
                    .mean
                    .slice(ndarray::s![row_range.clone(), col..col + n_cols]);
                let variance = prediction
                    .variance
                    .slice(ndarray::s![row_range.clone(), col..col + n_cols]);

                let (values, variance) = if item.num_rows_per_value() == factor {
                    (values.to_owned(), variance.to_owned())
                } else {
                    (fold_mean(values.to_owned()), fold_mean(variance.to_owned()))
                };

                match item.set_forecast_values(sample, &values, &variance) {
                    Err(e) if !self.strict => {
                        warn!(item = %item.name(), sample, "{e}");
                    }
                    other => other?,
                }
                col += n_cols;
            }
        }

        debug!(samples = n_logical, "forecast written back");
        Ok(())
    }
}

/// Collapse the physical rows of one logical sample to their mean
fn fold_mean(block: Array2<f64>) -> Array2<f64> {
    let cols = block.ncols();
    block
        .mean_axis(Axis(0))
        .unwrap_or_else(|| ndarray::Array1::zeros(cols))
        .insert_axis(Axis(0))
}
