//! Dense linear algebra helpers
//!
//! Cholesky-based solves for the symmetric positive-definite systems the
//! trainer builds. Small hand-rolled routines keep the crate free of a
//! LAPACK binding; posterior matrices stay modest because the model is
//! sparse.

use ndarray::{Array2, ArrayView2};

use sparva_core::{Error, Result};

/// Lower Cholesky factor of a symmetric positive-definite matrix.
pub fn cholesky(a: ArrayView2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(Error::SizeMismatch {
            er: n,
            ec: n,
            ar: a.nrows(),
            ac: a.ncols(),
        });
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return Err(Error::Algorithm(
                        "matrix is not positive definite".into(),
                    ));
                }
                l[(i, j)] = sum.sqrt();
            } else {
                l[(i, j)] = sum / l[(j, j)];
            }
        }
    }
    Ok(l)
}

/// Solve `A X = B` for symmetric positive-definite `A`.
pub fn solve_spd(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Result<Array2<f64>> {
    let l = cholesky(a)?;
    let n = l.nrows();
    if b.nrows() != n {
        return Err(Error::SizeMismatch {
            er: n,
            ec: b.ncols(),
            ar: b.nrows(),
            ac: b.ncols(),
        });
    }

    let mut x = b.to_owned();
    for col in 0..x.ncols() {
        // Forward substitution: L y = b
        for i in 0..n {
            let mut sum = x[(i, col)];
            for k in 0..i {
                sum -= l[(i, k)] * x[(k, col)];
            }
            x[(i, col)] = sum / l[(i, i)];
        }
        // Back substitution: L^T x = y
        for i in (0..n).rev() {
            let mut sum = x[(i, col)];
            for k in (i + 1)..n {
                sum -= l[(k, i)] * x[(k, col)];
            }
            x[(i, col)] = sum / l[(i, i)];
        }
    }
    Ok(x)
}

/// Inverse of a symmetric positive-definite matrix.
pub fn invert_spd(a: ArrayView2<f64>) -> Result<Array2<f64>> {
    let eye = Array2::<f64>::eye(a.nrows());
    solve_spd(a, eye.view())
}
