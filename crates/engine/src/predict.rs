//! Regression over a frozen sparse model
//!
//! Forecast rows are projected through the kernel against the retained
//! relevant-vector rows; the posterior mean gives the prediction and the
//! posterior covariance gives the predictive variance:
//!
//! ```text
//! y*   = K(x*, basis) mu
//! s*^2 = noise_variance + k* Sigma k*^T
//! ```
//!
//! The model is read-only here: repeated calls on the same model and
//! input produce identical results.

use ndarray::{Array2, ArrayView2};

use sparva_core::{Error, Result};

use crate::kernel::Kernel;
use crate::train::SparseModel;

/// Predicted values and predictive uncertainty for a batch of rows.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Predicted targets (rows x outputs)
    pub mean: Array2<f64>,
    /// Predictive variance, one value per row replicated across outputs
    pub variance: Array2<f64>,
}

/// Evaluate the frozen model on forecast-row features.
pub fn predict(
    model: &SparseModel,
    kernel: &Kernel,
    features: ArrayView2<f64>,
) -> Result<Prediction> {
    if model.relevant.is_empty() {
        return Err(Error::Algorithm("model has no relevant vectors".into()));
    }
    if features.ncols() != model.basis.ncols() {
        return Err(Error::WidthMismatch {
            left: features.ncols(),
            right: model.basis.ncols(),
        });
    }

    let k = kernel.evaluate(features, model.basis.view())?;
    let mean = k.dot(&model.mu);

    let ks = k.dot(&model.sigma);
    let n = k.nrows();
    let v = model.mu.ncols();
    let mut variance = Array2::zeros((n, v));
    for i in 0..n {
        let quad = ks.row(i).dot(&k.row(i)).max(0.0);
        let var = model.noise_variance + quad;
        for c in 0..v {
            variance[(i, c)] = var;
        }
    }

    Ok(Prediction { mean, variance })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    use crate::kernel::KernelFamily;

    fn toy_model() -> (SparseModel, Kernel) {
        let kernel = Kernel::new(KernelFamily::Gaussian, 1.5).unwrap();
        let model = SparseModel {
            relevant: vec![0, 1],
            basis: array![[0.0, 0.0], [2.0, 1.0]],
            alpha: vec![0.5, 0.8],
            sigma: array![[0.2, 0.05], [0.05, 0.3]],
            mu: array![[1.0, -2.0], [0.5, 0.25]],
            noise_variance: 0.1,
            iterations: 10,
            converged: true,
            max_alpha_change: 0.001,
            min_alpha_change: 0.0,
        };
        (model, kernel)
    }

    #[test]
    fn test_prediction_matches_kernel_projection() {
        let (model, kernel) = toy_model();
        let features = array![[0.5, 0.5], [1.0, 2.0]];

        let prediction = predict(&model, &kernel, features.view()).unwrap();
        let k = kernel
            .evaluate(features.view(), model.basis.view())
            .unwrap();

        assert_eq!(prediction.mean.shape(), &[2, 2]);
        for i in 0..2 {
            for c in 0..2 {
                let expected = k[(i, 0)] * model.mu[(0, c)] + k[(i, 1)] * model.mu[(1, c)];
                assert_relative_eq!(prediction.mean[(i, c)], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_variance_includes_noise_floor() {
        let (model, kernel) = toy_model();
        let features = array![[0.5, 0.5], [10.0, -10.0]];

        let prediction = predict(&model, &kernel, features.view()).unwrap();
        for &v in prediction.variance.iter() {
            assert!(v >= model.noise_variance);
        }
        // Far from every basis the kernel row vanishes and the variance
        // approaches the noise floor
        assert_relative_eq!(
            prediction.variance[(1, 0)],
            model.noise_variance,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_regression_is_idempotent() {
        let (model, kernel) = toy_model();
        let features = array![[0.3, -0.2], [1.5, 0.7], [4.0, 4.0]];

        let first = predict(&model, &kernel, features.view()).unwrap();
        let second = predict(&model, &kernel, features.view()).unwrap();

        assert_eq!(first.mean, second.mean);
        assert_eq!(first.variance, second.variance);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let (model, kernel) = toy_model();
        let features = array![[0.3, -0.2, 1.0]];
        assert!(predict(&model, &kernel, features.view()).is_err());
    }
}
