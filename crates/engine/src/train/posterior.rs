//! Posterior weight distribution over the active basis set
//!
//! Holds the weight covariance and the per-output weight means, and
//! applies the rank-one updates for the three basis actions so no
//! iteration pays for a full re-inversion. `recompute` rebuilds the same
//! quantities from scratch and anchors the incremental updates in tests.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use sparva_core::Result;

use crate::linalg;

/// Posterior covariance and mean of the model weights.
#[derive(Debug, Clone)]
pub struct Posterior {
    /// Weight covariance over the active basis (M x M)
    pub sigma: Array2<f64>,
    /// Weight mean, one column per output (M x V)
    pub mu: Array2<f64>,
}

impl Posterior {
    /// Posterior over an empty basis set
    pub fn empty(n_outputs: usize) -> Self {
        Self {
            sigma: Array2::zeros((0, 0)),
            mu: Array2::zeros((0, n_outputs)),
        }
    }

    /// Number of active bases
    pub fn num_bases(&self) -> usize {
        self.sigma.nrows()
    }

    /// Rebuild the posterior from scratch:
    ///
    /// ```text
    /// Sigma = (diag(alpha) + beta Phi_A^T Phi_A)^-1
    /// mu    = beta Sigma Phi_A^T T
    /// ```
    pub fn recompute(
        phi_active: ArrayView2<f64>,
        targets: ArrayView2<f64>,
        alpha: &[f64],
        beta: f64,
    ) -> Result<Self> {
        let mut precision = phi_active.t().dot(&phi_active) * beta;
        for (i, &a) in alpha.iter().enumerate() {
            precision[(i, i)] += a;
        }
        let sigma = linalg::invert_spd(precision.view())?;
        let mu = sigma.dot(&phi_active.t().dot(&targets)) * beta;
        Ok(Self { sigma, mu })
    }

    /// Grow the basis by one candidate.
    ///
    /// `s_factor` and `q_factor` are the candidate's common-scale
    /// sparsity/quality factors; `projection` is `beta Sigma Phi_A^T
    /// phi_i` over the current active set.
    pub fn add_basis(
        &mut self,
        alpha: f64,
        s_factor: f64,
        q_factor: ArrayView1<f64>,
        projection: ArrayView1<f64>,
    ) {
        let m = self.num_bases();
        let v = self.mu.ncols();
        let sigma_ii = 1.0 / (alpha + s_factor);
        let mu_i: Array1<f64> = q_factor.mapv(|q| sigma_ii * q);

        let mut sigma = Array2::zeros((m + 1, m + 1));
        for i in 0..m {
            for j in 0..m {
                sigma[(i, j)] = self.sigma[(i, j)] + sigma_ii * projection[i] * projection[j];
            }
            sigma[(i, m)] = -sigma_ii * projection[i];
            sigma[(m, i)] = -sigma_ii * projection[i];
        }
        sigma[(m, m)] = sigma_ii;

        let mut mu = Array2::zeros((m + 1, v));
        for i in 0..m {
            for c in 0..v {
                mu[(i, c)] = self.mu[(i, c)] - mu_i[c] * projection[i];
            }
        }
        for c in 0..v {
            mu[(m, c)] = mu_i[c];
        }

        self.sigma = sigma;
        self.mu = mu;
    }

    /// Remove the active basis at position `pos`.
    pub fn delete_basis(&mut self, pos: usize) {
        let m = self.num_bases();
        let v = self.mu.ncols();
        let sigma_jj = self.sigma[(pos, pos)];
        let col = self.sigma.column(pos).to_owned();
        let mu_j = self.mu.row(pos).to_owned();

        let keep: Vec<usize> = (0..m).filter(|&i| i != pos).collect();

        let mut sigma = Array2::zeros((m - 1, m - 1));
        for (ni, &i) in keep.iter().enumerate() {
            for (nj, &j) in keep.iter().enumerate() {
                sigma[(ni, nj)] = self.sigma[(i, j)] - col[i] * col[j] / sigma_jj;
            }
        }

        let mut mu = Array2::zeros((m - 1, v));
        for (ni, &i) in keep.iter().enumerate() {
            for c in 0..v {
                mu[(ni, c)] = self.mu[(i, c)] - col[i] * mu_j[c] / sigma_jj;
            }
        }

        self.sigma = sigma;
        self.mu = mu;
    }

    /// Change the precision of the active basis at `pos` by
    /// `delta_alpha = alpha_new - alpha_old`.
    pub fn reestimate(&mut self, pos: usize, delta_alpha: f64) {
        let sigma_jj = self.sigma[(pos, pos)];
        let kappa = delta_alpha / (1.0 + delta_alpha * sigma_jj);
        let col = self.sigma.column(pos).to_owned();
        let mu_j = self.mu.row(pos).to_owned();

        let m = self.num_bases();
        let v = self.mu.ncols();
        for i in 0..m {
            for j in 0..m {
                self.sigma[(i, j)] -= kappa * col[i] * col[j];
            }
        }
        for i in 0..m {
            for c in 0..v {
                self.mu[(i, c)] -= kappa * col[i] * mu_j[c];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Axis};

    fn phi() -> Array2<f64> {
        array![
            [1.0, 0.2, 0.1, 0.4],
            [0.2, 1.0, 0.3, 0.1],
            [0.1, 0.3, 1.0, 0.2],
            [0.4, 0.1, 0.2, 1.0],
        ]
    }

    fn targets() -> Array2<f64> {
        array![[1.0, -0.5], [2.0, 0.5], [0.5, 1.5], [1.5, -1.0]]
    }

    fn assert_posterior_eq(a: &Posterior, b: &Posterior, tol: f64) {
        assert_eq!(a.sigma.shape(), b.sigma.shape());
        assert_eq!(a.mu.shape(), b.mu.shape());
        for (x, y) in a.sigma.iter().zip(b.sigma.iter()) {
            assert_relative_eq!(*x, *y, epsilon = tol, max_relative = tol);
        }
        for (x, y) in a.mu.iter().zip(b.mu.iter()) {
            assert_relative_eq!(*x, *y, epsilon = tol, max_relative = tol);
        }
    }

    /// Common-scale factors of candidate `idx` against the active set
    fn factors(
        phi: &Array2<f64>,
        targets: &Array2<f64>,
        active: &[usize],
        posterior: &Posterior,
        beta: f64,
        idx: usize,
    ) -> (f64, Array1<f64>, Array1<f64>) {
        let phi_i = phi.column(idx);
        let phi_a = phi.select(Axis(1), active);

        let g: Array1<f64> = phi_a.t().dot(&phi_i); // Phi_A^T phi_i
        let projection = posterior.sigma.dot(&g) * beta;

        let s = beta * phi_i.dot(&phi_i) - beta * g.dot(&projection);
        let q = targets.t().dot(&phi_i) * beta - posterior.mu.t().dot(&g) * beta;
        (s, q, projection)
    }

    #[test]
    fn test_add_basis_matches_recompute() {
        let phi = phi();
        let targets = targets();
        let beta = 4.0;
        let active = vec![0, 2];
        let alpha = vec![1.5, 0.8];

        let mut incremental = Posterior::recompute(
            phi.select(Axis(1), &active).view(),
            targets.view(),
            &alpha,
            beta,
        )
        .unwrap();

        let (s, q, projection) = factors(&phi, &targets, &active, &incremental, beta, 3);
        let alpha_new = 2.0;
        incremental.add_basis(alpha_new, s, q.view(), projection.view());

        let grown = Posterior::recompute(
            phi.select(Axis(1), &[0, 2, 3]).view(),
            targets.view(),
            &[1.5, 0.8, 2.0],
            beta,
        )
        .unwrap();

        assert_posterior_eq(&incremental, &grown, 1e-9);
    }

    #[test]
    fn test_delete_basis_matches_recompute() {
        let phi = phi();
        let targets = targets();
        let beta = 4.0;

        let mut incremental = Posterior::recompute(
            phi.select(Axis(1), &[0, 1, 3]).view(),
            targets.view(),
            &[1.5, 0.8, 2.0],
            beta,
        )
        .unwrap();
        incremental.delete_basis(1);

        let shrunk = Posterior::recompute(
            phi.select(Axis(1), &[0, 3]).view(),
            targets.view(),
            &[1.5, 2.0],
            beta,
        )
        .unwrap();

        assert_posterior_eq(&incremental, &shrunk, 1e-9);
    }

    #[test]
    fn test_reestimate_matches_recompute() {
        let phi = phi();
        let targets = targets();
        let beta = 4.0;

        let mut incremental = Posterior::recompute(
            phi.select(Axis(1), &[0, 1]).view(),
            targets.view(),
            &[1.5, 0.8],
            beta,
        )
        .unwrap();
        incremental.reestimate(1, 2.5 - 0.8);

        let adjusted = Posterior::recompute(
            phi.select(Axis(1), &[0, 1]).view(),
            targets.view(),
            &[1.5, 2.5],
            beta,
        )
        .unwrap();

        assert_posterior_eq(&incremental, &adjusted, 1e-9);
    }
}
