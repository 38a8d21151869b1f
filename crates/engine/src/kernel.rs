//! Kernel evaluation over feature matrices
//!
//! A kernel maps two feature matrices (n1 x d and n2 x d) to an n1 x n2
//! similarity matrix. Distance-based families share one pairwise
//! squared-distance pass computed with the expansion
//!
//! ```text
//! ||x - y||^2 = ||x||^2 + ||y||^2 - 2 x.y
//! ```
//!
//! which costs O(n1*n2*d) without materializing a difference tensor; the
//! result is clamped at 0 against floating-point cancellation.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use sparva_core::{Error, Result};

use crate::maybe_rayon::*;

/// Supported kernel families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelFamily {
    /// exp(-||x-y||^2 / (2 l^2))
    Gaussian,
    /// exp(-||x-y|| / l)
    Laplace,
    /// (x.y / l + bias)^p
    Polynomial,
    /// (x.y / l)^p
    HomogeneousPolynomial,
    /// Per-dimension piecewise polynomial in min(x, y), summed
    Spline,
    /// 1 / (1 + ||x-y||^2 / l^2)
    Cauchy,
    /// ||x-y||^3
    Cubic,
    /// -||x-y||
    Distance,
    /// ||x-y||^2 log||x-y||, 0 at coincident points
    ThinPlateSpline,
    /// 1 if ||x-y|| <= l else 0
    Bubble,
}

/// A kernel family with its hyperparameters.
///
/// Pure function object: carries no per-model state. Hyperparameters are
/// validated at configuration time; `evaluate` only reports shape errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kernel {
    family: KernelFamily,
    length_scale: f64,
    polynomial_power: f64,
    use_bias: bool,
}

impl Kernel {
    /// Create a kernel with the given family and length scale.
    ///
    /// A non-positive length scale is a configuration error.
    pub fn new(family: KernelFamily, length_scale: f64) -> Result<Self> {
        if !(length_scale > 0.0) {
            return Err(Error::InvalidParameter {
                name: "length_scale",
                value: length_scale.to_string(),
                reason: "length scale must be positive".into(),
            });
        }
        Ok(Self {
            family,
            length_scale,
            polynomial_power: 2.0,
            use_bias: false,
        })
    }

    /// Set the polynomial power (polynomial families only).
    pub fn with_polynomial_power(mut self, power: f64) -> Result<Self> {
        if !(power > 0.0) {
            return Err(Error::InvalidParameter {
                name: "polynomial_power",
                value: power.to_string(),
                reason: "polynomial power must be positive".into(),
            });
        }
        self.polynomial_power = power;
        Ok(self)
    }

    /// Enable the constant bias term.
    ///
    /// Ignored by the Distance and Bubble families; for the polynomial
    /// family the bias enters inside the power.
    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn family(&self) -> KernelFamily {
        self.family
    }

    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    pub fn polynomial_power(&self) -> f64 {
        self.polynomial_power
    }

    pub fn use_bias(&self) -> bool {
        self.use_bias
    }

    /// Evaluate the kernel for all row pairs of `x1` and `x2`.
    ///
    /// Both matrices must share the same feature width; the result is
    /// n1 x n2 and symmetric when `x1 == x2`.
    pub fn evaluate(&self, x1: ArrayView2<f64>, x2: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x1.ncols() != x2.ncols() {
            return Err(Error::WidthMismatch {
                left: x1.ncols(),
                right: x2.ncols(),
            });
        }

        let l = self.length_scale;
        let mut k = match self.family {
            KernelFamily::Gaussian => {
                let mut d2 = distance_squared(x1, x2)?;
                d2.mapv_inplace(|v| (-v / (2.0 * l * l)).exp());
                d2
            }
            KernelFamily::Laplace => {
                let mut d2 = distance_squared(x1, x2)?;
                d2.mapv_inplace(|v| (-v.sqrt() / l).exp());
                d2
            }
            KernelFamily::Polynomial => {
                let bias = if self.use_bias { 1.0 } else { 0.0 };
                let p = self.polynomial_power;
                let mut cross = x1.dot(&x2.t());
                cross.mapv_inplace(|v| (v / l + bias).powf(p));
                cross
            }
            KernelFamily::HomogeneousPolynomial => {
                let p = self.polynomial_power;
                let mut cross = x1.dot(&x2.t());
                cross.mapv_inplace(|v| (v / l).powf(p));
                cross
            }
            KernelFamily::Spline => spline_kernel(x1, x2),
            KernelFamily::Cauchy => {
                let mut d2 = distance_squared(x1, x2)?;
                d2.mapv_inplace(|v| 1.0 / (1.0 + v / (l * l)));
                d2
            }
            KernelFamily::Cubic => {
                let mut d2 = distance_squared(x1, x2)?;
                d2.mapv_inplace(|v| v.powf(1.5));
                d2
            }
            KernelFamily::Distance => {
                let mut d2 = distance_squared(x1, x2)?;
                d2.mapv_inplace(|v| -v.sqrt());
                d2
            }
            KernelFamily::ThinPlateSpline => {
                let mut d2 = distance_squared(x1, x2)?;
                // r^2 log r = 0.5 r^2 log r^2, with the singular point
                // mapped to 0
                d2.mapv_inplace(|v| if v < 1e-30 { 0.0 } else { 0.5 * v * v.ln() });
                d2
            }
            KernelFamily::Bubble => {
                let l2 = l * l;
                let mut d2 = distance_squared(x1, x2)?;
                d2.mapv_inplace(|v| if v <= l2 { 1.0 } else { 0.0 });
                d2
            }
        };

        if self.use_bias
            && !matches!(
                self.family,
                KernelFamily::Polynomial | KernelFamily::Distance | KernelFamily::Bubble
            )
        {
            k += 1.0;
        }

        Ok(k)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self {
            family: KernelFamily::Gaussian,
            length_scale: 1000.0,
            polynomial_power: 2.0,
            use_bias: false,
        }
    }
}

/// Pairwise squared Euclidean distance between the rows of `x1` and `x2`.
///
/// Uses the `||x||^2 + ||y||^2 - 2 x.y` expansion and clamps small
/// negative values from cancellation at 0.
pub fn distance_squared(x1: ArrayView2<f64>, x2: ArrayView2<f64>) -> Result<Array2<f64>> {
    if x1.ncols() != x2.ncols() {
        return Err(Error::WidthMismatch {
            left: x1.ncols(),
            right: x2.ncols(),
        });
    }

    let s1: Array1<f64> = x1.map_axis(Axis(1), |row| row.dot(&row));
    let s2: Array1<f64> = x2.map_axis(Axis(1), |row| row.dot(&row));

    let mut d2 = x1.dot(&x2.t());
    d2 *= -2.0;
    d2 += &s1.insert_axis(Axis(1));
    d2 += &s2.insert_axis(Axis(0));
    d2.mapv_inplace(|v| v.max(0.0));

    Ok(d2)
}

/// Spline kernel: per-dimension piecewise polynomial in min(x, y), summed
/// over dimensions.
fn spline_kernel(x1: ArrayView2<f64>, x2: ArrayView2<f64>) -> Array2<f64> {
    let n1 = x1.nrows();
    let n2 = x2.nrows();
    let d = x1.ncols();

    let data: Vec<f64> = (0..n1)
        .into_par_iter()
        .flat_map(|i| {
            let mut row = vec![0.0; n2];
            for (j, out) in row.iter_mut().enumerate() {
                let mut sum = 0.0;
                for dim in 0..d {
                    let a = x1[(i, dim)];
                    let b = x2[(j, dim)];
                    let prod = a * b;
                    let m = a.min(b);
                    sum += 1.0 + prod + prod * m - (a + b) / 2.0 * m * m + m * m * m / 3.0;
                }
                *out = sum;
            }
            row
        })
        .collect();

    Array2::from_shape_vec((n1, n2), data).expect("row count matches collected data")
}
