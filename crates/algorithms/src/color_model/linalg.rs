//! Small dense linear algebra for band covariance matrices
//!
//! Band counts are small (3 for RGB, a dozen for multispectral), so these
//! kernels are plain loops over `ndarray` storage. The heavy work is the
//! per-pixel quadratic form, which reuses one precomputed inverse.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use colordist_core::{Error, Result};

/// Column-wise mean of a `(bands, observations)` matrix
pub(crate) fn mean(values: ArrayView2<'_, f64>) -> Array1<f64> {
    values
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(values.nrows()))
}

/// Unbiased sample covariance (divisor N - 1) of a `(bands, observations)` matrix.
pub(crate) fn covariance(values: ArrayView2<'_, f64>, mean: &Array1<f64>) -> Array2<f64> {
    let (n_bands, n_obs) = values.dim();
    let mut cov = Array2::zeros((n_bands, n_bands));

    for column in values.columns() {
        for i in 0..n_bands {
            let di = column[i] - mean[i];
            for j in i..n_bands {
                cov[(i, j)] += di * (column[j] - mean[j]);
            }
        }
    }

    let divisor = n_obs.saturating_sub(1).max(1) as f64;
    for i in 0..n_bands {
        for j in i..n_bands {
            cov[(i, j)] /= divisor;
            cov[(j, i)] = cov[(i, j)];
        }
    }
    cov
}

/// Lower-triangular Cholesky factor `L` with `L Lᵀ = m`.
///
/// A pivot that is not clearly positive relative to the largest diagonal
/// entry means the matrix is singular or too ill-conditioned to invert.
pub(crate) fn cholesky(m: &Array2<f64>) -> Result<Array2<f64>> {
    let n = m.nrows();
    if n == 0 || m.ncols() != n {
        return Err(Error::InvalidParameter {
            name: "covariance",
            value: format!("{:?}", m.dim()),
            reason: "expected a non-empty square matrix".into(),
        });
    }

    let scale = m.diag().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = scale * n as f64 * f64::EPSILON;

    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut pivot = m[(j, j)];
        for k in 0..j {
            pivot -= l[(j, k)] * l[(j, k)];
        }
        if !pivot.is_finite() || pivot <= tolerance {
            return Err(Error::SingularCovariance(format!(
                "pivot {} at band {} (largest variance {})",
                pivot, j, scale
            )));
        }
        let d = pivot.sqrt();
        l[(j, j)] = d;

        for i in (j + 1)..n {
            let mut s = m[(i, j)];
            for k in 0..j {
                s -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = s / d;
        }
    }
    Ok(l)
}

/// Inverse and log-determinant of a symmetric positive definite matrix.
#[derive(Debug, Clone)]
pub(crate) struct SpdInverse {
    pub inverse: Array2<f64>,
    pub log_det: f64,
}

/// Invert a covariance matrix through its Cholesky factor.
pub(crate) fn invert_spd(m: &Array2<f64>) -> Result<SpdInverse> {
    let l = cholesky(m)?;
    let n = l.nrows();

    // L⁻¹ by forward substitution, column by column
    let mut l_inv = Array2::<f64>::zeros((n, n));
    for col in 0..n {
        for i in col..n {
            let mut s = if i == col { 1.0 } else { 0.0 };
            for k in col..i {
                s -= l[(i, k)] * l_inv[(k, col)];
            }
            l_inv[(i, col)] = s / l[(i, i)];
        }
    }

    // Σ⁻¹ = L⁻ᵀ L⁻¹
    let inverse = l_inv.t().dot(&l_inv);
    let log_det = 2.0 * l.diag().iter().map(|d| d.ln()).sum::<f64>();

    Ok(SpdInverse { inverse, log_det })
}

/// `dᵀ · inv · d`, computed as the dot product of `d` with `d · inv`.
#[inline]
pub(crate) fn quadratic_form(inv: &Array2<f64>, d: &[f64]) -> f64 {
    let n = d.len();
    let mut total = 0.0;
    for j in 0..n {
        let mut projected = 0.0;
        for (i, di) in d.iter().enumerate() {
            projected += di * inv[(i, j)];
        }
        total += d[j] * projected;
    }
    total
}

/// Add `ridge` to every diagonal entry
pub(crate) fn add_ridge(m: &mut Array2<f64>, ridge: f64) {
    if ridge != 0.0 {
        m.diag_mut().mapv_inplace(|v| v + ridge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_covariance_matches_hand_computation() {
        // two bands, four observations
        let values = array![[1.0, 2.0, 3.0, 4.0], [2.0, 4.0, 6.0, 9.0]];
        let m = mean(values.view());
        assert_relative_eq!(m[0], 2.5);
        assert_relative_eq!(m[1], 5.25);

        let cov = covariance(values.view(), &m);
        // var(x) = 5/3, cov(x, y) = 11.5/3, var(y) = 26.75/3
        assert_relative_eq!(cov[(0, 0)], 5.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(cov[(0, 1)], 11.5 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(cov[(1, 0)], cov[(0, 1)]);
        assert_relative_eq!(cov[(1, 1)], 26.75 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invert_spd() {
        let m = array![[4.0, 2.0, 0.6], [2.0, 5.0, 1.0], [0.6, 1.0, 3.0]];
        let SpdInverse { inverse, log_det } = invert_spd(&m).unwrap();

        let identity = m.dot(&inverse);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(identity[(i, j)], expected, epsilon = 1e-12);
            }
        }

        // det = 4(15-1) - 2(6-0.6) + 0.6(2-3) = 56 - 10.8 - 0.6
        assert_relative_eq!(log_det, 44.6_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_rejected() {
        // perfectly correlated bands
        let m = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(invert_spd(&m), Err(Error::SingularCovariance(_))));

        let zero = Array2::<f64>::zeros((3, 3));
        assert!(matches!(cholesky(&zero), Err(Error::SingularCovariance(_))));
    }

    #[test]
    fn test_ridge_makes_zero_matrix_invertible() {
        let mut m = Array2::<f64>::zeros((2, 2));
        add_ridge(&mut m, 0.5);
        let inv = invert_spd(&m).unwrap().inverse;
        assert_relative_eq!(inv[(0, 0)], 2.0);
        assert_relative_eq!(inv[(0, 1)], 0.0);
    }

    #[test]
    fn test_quadratic_form() {
        let inv = array![[2.0, 0.5], [0.5, 1.0]];
        // [1, 2] · inv · [1, 2]ᵀ = 2 + 0.5*2*2 + 4 = 8
        assert_relative_eq!(quadratic_form(&inv, &[1.0, 2.0]), 8.0);
        assert_relative_eq!(quadratic_form(&inv, &[0.0, 0.0]), 0.0);
    }
}
