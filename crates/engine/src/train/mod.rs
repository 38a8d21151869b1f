//! Sparse Bayesian training engine
//!
//! Fast marginal-likelihood maximization over a kernel design matrix.
//! Each training row is a candidate basis function with a scalar
//! precision alpha; a basis is active while its precision is finite and
//! pruned at alpha = +inf. Every iteration scans all candidates for their
//! sparsity/quality factors, scores the add / re-estimate / delete action
//! each candidate proposes by its marginal-likelihood gain, applies the
//! single best action, and updates the posterior with a rank-one formula.
//!
//! Reference:
//! Tipping, M.E. (2001). Sparse Bayesian learning and the relevance
//! vector machine. JMLR 1.
//! Tipping, M.E. & Faul, A. (2003). Fast marginal likelihood
//! maximisation for sparse Bayesian models. AISTATS.

mod posterior;

pub use posterior::Posterior;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sparva_core::{Error, Result};

use crate::kernel::Kernel;
use crate::maybe_rayon::*;

/// Which initial basis set the trainer starts from.
///
/// Both variants share the same per-iteration step; they differ only in
/// the initial active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    /// Start with every candidate tentatively active
    Full,
    /// Start from a single seed basis and grow
    Fast,
}

/// Training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainParams {
    /// Iteration budget
    pub max_iterations: usize,
    /// Convergence threshold on the largest relative precision change
    pub tolerance: f64,
    /// Initial basis set
    pub variant: Variant,
    /// Worker threads for the candidate scan
    pub workers: usize,
    /// Emit per-iteration diagnostics at info level
    pub verbose: bool,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 0.01,
            variant: Variant::Fast,
            workers: 4,
            verbose: false,
        }
    }
}

/// Cooperative stop request, honored at iteration boundaries.
///
/// A stop is treated as if the iteration budget were exhausted at that
/// count: training ends with `converged = false`.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The frozen sparse model produced by training.
#[derive(Debug, Clone)]
pub struct SparseModel {
    /// Indexes of the retained relevant training rows, in selection order
    pub relevant: Vec<usize>,
    /// Feature rows of the retained bases (M x d)
    pub basis: Array2<f64>,
    /// Precision per retained basis
    pub alpha: Vec<f64>,
    /// Posterior weight covariance (M x M)
    pub sigma: Array2<f64>,
    /// Posterior weight mean, one column per output (M x V)
    pub mu: Array2<f64>,
    /// Noise variance used during training
    pub noise_variance: f64,
    /// Iterations performed
    pub iterations: usize,
    /// Whether the tolerance threshold was met within the budget
    pub converged: bool,
    /// Largest relative precision change in the final iteration
    pub max_alpha_change: f64,
    /// Smallest relative precision change in the final iteration
    pub min_alpha_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Add,
    Reestimate,
    Delete,
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    index: usize,
    action: Action,
    delta_l: f64,
    alpha_new: f64,
    rel_change: f64,
}

/// Train a sparse model on assembled features and targets.
///
/// `features` is N x d (one row per physical training row), `targets` is
/// N x V. The kernel design matrix is evaluated row-wise against the full
/// training set, so every training row is a candidate basis.
pub fn train(
    features: ArrayView2<f64>,
    targets: ArrayView2<f64>,
    kernel: &Kernel,
    params: &TrainParams,
    stop: Option<&StopHandle>,
) -> Result<SparseModel> {
    validate_params(params)?;
    let n = features.nrows();
    let v = targets.ncols();
    if n == 0 || v == 0 {
        return Err(Error::InvalidParameter {
            name: "training_data",
            value: format!("{n} rows, {v} outputs"),
            reason: "training needs at least one row and one output column".into(),
        });
    }
    if targets.nrows() != n {
        return Err(Error::RowCountMismatch {
            item: "targets".into(),
            expected: n,
            actual: targets.nrows(),
        });
    }

    let phi = kernel.evaluate(features, features)?;
    let noise_variance = initial_noise_variance(targets);
    let beta = 1.0 / noise_variance;

    // Fixed per-candidate quantities
    let phi_sq: Array1<f64> = phi.map_axis(Axis(0), |col| col.dot(&col));
    let phi_t = phi.t().dot(&targets); // N x V

    let mut alpha = vec![f64::INFINITY; n];
    let mut active: Vec<usize> = Vec::new();

    match params.variant {
        Variant::Fast => {
            let seed = seed_basis(&phi_sq, &phi_t, beta);
            alpha[seed.0] = seed.1;
            active.push(seed.0);
        }
        Variant::Full => {
            for m in 0..n {
                alpha[m] = initial_alpha(phi_sq[m], phi_t.row(m).dot(&phi_t.row(m)) / v as f64, beta);
                active.push(m);
            }
        }
    }

    let mut posterior = recompute_posterior(&phi, targets, &active, &alpha, beta)?;

    #[cfg(feature = "parallel")]
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.workers)
        .build()
        .map_err(|e| Error::Other(e.to_string()))?;

    let mut iterations = 0;
    let mut converged = false;
    let mut max_change = f64::INFINITY;
    let mut min_change = f64::INFINITY;

    while iterations < params.max_iterations {
        if stop.map(|s| s.is_requested()).unwrap_or(false) {
            debug!(iterations, "stop requested at iteration boundary");
            break;
        }
        iterations += 1;

        // Candidate statistics against the current posterior
        let phi_a = phi.select(Axis(1), &active);
        let g = phi.t().dot(&phi_a); // N x M, row m = phi_m^T Phi_A
        let p = g.dot(&posterior.sigma); // N x M
        let s_cap: Vec<f64> = (0..n)
            .map(|m| beta * phi_sq[m] - beta * beta * p.row(m).dot(&g.row(m)))
            .collect();
        let q_cap = (&phi_t - &g.dot(&posterior.mu)) * beta; // N x V

        let mut active_pos = vec![None; n];
        for (pos, &m) in active.iter().enumerate() {
            active_pos[m] = Some(pos);
        }

        let active_count = active.len();
        let scan = || {
            (0..n)
                .into_par_iter()
                .filter_map(|m| {
                    evaluate_candidate(
                        m,
                        s_cap[m],
                        q_cap.row(m),
                        alpha[m],
                        active_pos[m].is_some(),
                        active_count,
                    )
                })
                .collect::<Vec<CandidateEval>>()
        };
        #[cfg(feature = "parallel")]
        let evals = pool.install(scan);
        #[cfg(not(feature = "parallel"))]
        let evals = scan();

        let best = evals
            .into_iter()
            .filter(|e| e.delta_l.is_finite())
            .max_by(|a, b| {
                a.delta_l
                    .partial_cmp(&b.delta_l)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        let Some(best) = best else {
            // No candidate proposes any action: the basis set is stable
            max_change = 0.0;
            min_change = 0.0;
            converged = true;
            break;
        };

        if best.delta_l <= 0.0 {
            max_change = 0.0;
            min_change = 0.0;
            converged = true;
            break;
        }

        // Apply exactly the one selected action
        match best.action {
            Action::Add => {
                let projection = posterior.sigma.dot(&g.row(best.index)) * beta;
                posterior.add_basis(
                    best.alpha_new,
                    s_cap[best.index],
                    q_cap.row(best.index),
                    projection.view(),
                );
                alpha[best.index] = best.alpha_new;
                active.push(best.index);
            }
            Action::Reestimate => {
                let pos = active_pos[best.index].expect("re-estimate targets an active basis");
                posterior.reestimate(pos, best.alpha_new - alpha[best.index]);
                alpha[best.index] = best.alpha_new;
            }
            Action::Delete => {
                let pos = active_pos[best.index].expect("delete targets an active basis");
                posterior.delete_basis(pos);
                active.remove(pos);
                alpha[best.index] = f64::INFINITY;
            }
        }

        // One action per iteration: the applied change is the largest
        // relative precision change; unchanged active bases contribute 0
        max_change = best.rel_change;
        min_change = if active.len() <= 1 { best.rel_change } else { 0.0 };

        if params.verbose {
            info!(
                iteration = iterations,
                action = ?best.action,
                candidate = best.index,
                delta_l = best.delta_l,
                active = active.len(),
                max_change,
                "training step"
            );
        } else {
            debug!(
                iteration = iterations,
                action = ?best.action,
                candidate = best.index,
                delta_l = best.delta_l,
                active = active.len(),
            );
        }

        if max_change < params.tolerance {
            converged = true;
            break;
        }
    }

    let basis = features.select(Axis(0), &active);
    let alpha_active: Vec<f64> = active.iter().map(|&m| alpha[m]).collect();

    debug!(
        iterations,
        converged,
        relevant = active.len(),
        "training finished"
    );

    Ok(SparseModel {
        relevant: active,
        basis,
        alpha: alpha_active,
        sigma: posterior.sigma,
        mu: posterior.mu,
        noise_variance,
        iterations,
        converged,
        max_alpha_change: max_change,
        min_alpha_change: min_change,
    })
}

fn validate_params(params: &TrainParams) -> Result<()> {
    if params.max_iterations == 0 {
        return Err(Error::InvalidParameter {
            name: "max_iterations",
            value: "0".into(),
            reason: "iteration budget must be positive".into(),
        });
    }
    if !(params.tolerance > 0.0) {
        return Err(Error::InvalidParameter {
            name: "tolerance",
            value: params.tolerance.to_string(),
            reason: "tolerance must be positive".into(),
        });
    }
    if params.workers == 0 {
        return Err(Error::InvalidParameter {
            name: "workers",
            value: "0".into(),
            reason: "at least one worker is required".into(),
        });
    }
    Ok(())
}

/// Noise variance heuristic: a tenth of the mean per-output target
/// variance, floored against constant targets
fn initial_noise_variance(targets: ArrayView2<f64>) -> f64 {
    let v = targets.ncols();
    let n = targets.nrows() as f64;
    let mut total = 0.0;
    for col in targets.axis_iter(Axis(1)) {
        let mean = col.sum() / n;
        total += col.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
    }
    (0.1 * total / v as f64).max(1e-6)
}

/// Seed basis for the fast variant: the candidate with the largest
/// normalized target projection
fn seed_basis(phi_sq: &Array1<f64>, phi_t: &Array2<f64>, beta: f64) -> (usize, f64) {
    let v = phi_t.ncols() as f64;
    let mut best = (0, f64::NEG_INFINITY);
    for m in 0..phi_sq.len() {
        if phi_sq[m] <= 0.0 {
            continue;
        }
        let proj = phi_t.row(m).dot(&phi_t.row(m)) / phi_sq[m];
        if proj > best.1 {
            best = (m, proj);
        }
    }
    let m = best.0;
    let q_sq_mean = phi_t.row(m).dot(&phi_t.row(m)) / v;
    (m, initial_alpha(phi_sq[m], q_sq_mean, beta))
}

/// Initial precision from the empty-posterior factors: alpha = s^2 /
/// (q^2 - s), clamped when the candidate carries no signal
fn initial_alpha(phi_sq: f64, q_sq_mean_raw: f64, beta: f64) -> f64 {
    let s = beta * phi_sq;
    let q_sq = beta * beta * q_sq_mean_raw;
    let theta = (q_sq - s).max(1e-8);
    s * s / theta
}

/// Score the action candidate `m` proposes against the current posterior
fn evaluate_candidate(
    index: usize,
    s_cap: f64,
    q_cap: ndarray::ArrayView1<f64>,
    alpha: f64,
    is_active: bool,
    active_count: usize,
) -> Option<CandidateEval> {
    let v = q_cap.len() as f64;
    let q_cap_sq_mean = q_cap.dot(&q_cap) / v;

    // Exclusion-adjusted factors for active bases
    let (s, q_sq_mean) = if is_active {
        let denom = alpha - s_cap;
        if denom <= 1e-12 {
            return None;
        }
        let ratio = alpha / denom;
        (ratio * s_cap, ratio * ratio * q_cap_sq_mean)
    } else {
        (s_cap, q_cap_sq_mean)
    };

    if s <= 0.0 || s_cap <= 0.0 {
        return None;
    }

    let theta = q_sq_mean - s;

    if theta > 0.0 && !is_active {
        // Add
        if q_cap_sq_mean <= 0.0 {
            return None;
        }
        let alpha_new = s * s / theta;
        let delta_l =
            0.5 * v * ((q_cap_sq_mean - s_cap) / s_cap + (s_cap / q_cap_sq_mean).ln());
        Some(CandidateEval {
            index,
            action: Action::Add,
            delta_l,
            alpha_new,
            rel_change: 1.0,
        })
    } else if theta > 0.0 && is_active {
        // Re-estimate
        let alpha_new = s * s / theta;
        let delta = 1.0 / alpha_new - 1.0 / alpha;
        if delta.abs() < 1e-300 {
            return None;
        }
        let growth = 1.0 + s_cap * delta;
        if growth <= 0.0 {
            return None;
        }
        let delta_l = 0.5 * v * (q_cap_sq_mean / (s_cap + 1.0 / delta) - growth.ln());
        Some(CandidateEval {
            index,
            action: Action::Reestimate,
            delta_l,
            alpha_new,
            rel_change: (alpha_new - alpha).abs() / alpha,
        })
    } else if theta <= 0.0 && is_active {
        // Delete, unless it would empty the basis set
        if active_count <= 1 {
            return None;
        }
        let remainder = 1.0 - s_cap / alpha;
        if remainder <= 0.0 {
            return None;
        }
        let delta_l = 0.5 * v * (q_cap_sq_mean / (s_cap - alpha) - remainder.ln());
        Some(CandidateEval {
            index,
            action: Action::Delete,
            delta_l,
            alpha_new: f64::INFINITY,
            rel_change: 1.0,
        })
    } else {
        None
    }
}

/// From-scratch posterior over the active columns of the design matrix
fn recompute_posterior(
    phi: &Array2<f64>,
    targets: ArrayView2<f64>,
    active: &[usize],
    alpha: &[f64],
    beta: f64,
) -> Result<Posterior> {
    let phi_a = phi.select(Axis(1), active);
    let alpha_active: Vec<f64> = active.iter().map(|&m| alpha[m]).collect();
    Posterior::recompute(phi_a.view(), targets, &alpha_active, beta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, KernelFamily};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    /// Well-separated feature rows on a coarse grid, so kernel columns
    /// are close to orthogonal and recovery is unambiguous
    fn synthetic_features(n: usize) -> Array2<f64> {
        let mut features = Array2::zeros((n, 2));
        for i in 0..n {
            features[(i, 0)] = 2.0 * (i % 6) as f64;
            features[(i, 1)] = 2.0 * (i / 6) as f64;
        }
        features
    }

    /// Targets generated by a kernel expansion over three known rows
    fn synthetic_problem(n: usize) -> (Array2<f64>, Array2<f64>, Kernel, Vec<usize>) {
        let features = synthetic_features(n);
        let kernel = Kernel::new(KernelFamily::Gaussian, 0.8).unwrap();
        let generating = vec![3, 11, 17];
        let weights = [2.0, -1.5, 1.0];

        let phi = kernel.evaluate(features.view(), features.view()).unwrap();
        let mut targets = Array2::zeros((n, 1));
        for i in 0..n {
            let mut sum = 0.0;
            for (w, &g) in weights.iter().zip(generating.iter()) {
                sum += w * phi[(i, g)];
            }
            targets[(i, 0)] = sum;
        }
        (features, targets, kernel, generating)
    }

    #[test]
    fn test_sparse_recovery_converges() {
        let (features, targets, kernel, generating) = synthetic_problem(24);
        let params = TrainParams::default();

        let model = train(
            features.view(),
            targets.view(),
            &kernel,
            &params,
            None,
        )
        .unwrap();

        assert!(model.converged, "training should converge within budget");
        assert!(model.iterations <= params.max_iterations);
        assert!(
            !model.relevant.is_empty() && model.relevant.len() <= 10,
            "model should stay sparse, kept {}",
            model.relevant.len()
        );

        // The generating rows should be recovered (possibly with a few
        // extra bases)
        for g in &generating {
            assert!(
                model.relevant.contains(g),
                "generating row {g} missing from {:?}",
                model.relevant
            );
        }
    }

    #[test]
    fn test_full_variant_prunes_to_sparse_model() {
        let (features, targets, kernel, _) = synthetic_problem(20);
        let params = TrainParams {
            variant: Variant::Full,
            ..TrainParams::default()
        };

        let model = train(features.view(), targets.view(), &kernel, &params, None).unwrap();
        assert!(model.converged);
        assert!(
            model.relevant.len() < 20,
            "full variant should prune candidates, kept {}",
            model.relevant.len()
        );
    }

    #[test]
    fn test_budget_exhaustion_is_not_an_error() {
        let (features, targets, kernel, _) = synthetic_problem(24);
        let params = TrainParams {
            max_iterations: 2,
            ..TrainParams::default()
        };

        let model = train(features.view(), targets.view(), &kernel, &params, None).unwrap();
        assert!(!model.converged);
        assert_eq!(model.iterations, 2);
    }

    #[test]
    fn test_stop_request_honored_at_boundary() {
        let (features, targets, kernel, _) = synthetic_problem(24);
        let stop = StopHandle::new();
        stop.request_stop();

        let model = train(
            features.view(),
            targets.view(),
            &kernel,
            &TrainParams::default(),
            Some(&stop),
        )
        .unwrap();
        assert!(!model.converged);
        assert_eq!(model.iterations, 0);
    }

    #[test]
    fn test_incremental_posterior_matches_recompute() {
        let (features, targets, kernel, _) = synthetic_problem(16);

        // Run a handful of iterations, then verify the incrementally
        // maintained posterior against a from-scratch recomputation over
        // the final active set
        let params = TrainParams {
            max_iterations: 6,
            ..TrainParams::default()
        };
        let model = train(features.view(), targets.view(), &kernel, &params, None).unwrap();

        let phi = kernel.evaluate(features.view(), features.view()).unwrap();
        let phi_a = phi.select(Axis(1), &model.relevant);
        let reference = Posterior::recompute(
            phi_a.view(),
            targets.view(),
            &model.alpha,
            1.0 / model.noise_variance,
        )
        .unwrap();

        for (a, b) in model.sigma.iter().zip(reference.sigma.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8, max_relative = 1e-6);
        }
        for (a, b) in model.mu.iter().zip(reference.mu.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (features, targets, kernel, _) = synthetic_problem(8);
        for params in [
            TrainParams {
                max_iterations: 0,
                ..TrainParams::default()
            },
            TrainParams {
                tolerance: 0.0,
                ..TrainParams::default()
            },
            TrainParams {
                workers: 0,
                ..TrainParams::default()
            },
        ] {
            assert!(train(features.view(), targets.view(), &kernel, &params, None).is_err());
        }
    }
}
