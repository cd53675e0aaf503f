//! Linear algebra operations for the regression-heavy pipeline stages.
//!
//! Single-equation regressions (ADF, Engle-Granger, ARCH-LM, Breusch-Pagan,
//! Granger) use predictor-major `Vec<Vec<f64>>` designs solved with a
//! Householder QR. Multi-equation systems (VAR lag selection, the VECM
//! reduced-rank regression) use `nalgebra` dense matrices.

use crate::errors::{EcmAnalysisError, EcmResult};
use nalgebra::DMatrix;

/// Validates that input contains no NaN or Inf values
fn ensure_finite_matrix(a: &[Vec<f64>], operation: &str) -> EcmResult<()> {
    for (i, row) in a.iter().enumerate() {
        for (j, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(EcmAnalysisError::NumericalError {
                    reason: format!("Non-finite value ({}) at position [{},{}]", val, i, j),
                    operation: Some(operation.to_string()),
                });
            }
        }
    }
    Ok(())
}

/// Validates that a vector contains no NaN or Inf values
fn ensure_finite_vector(v: &[f64], operation: &str) -> EcmResult<()> {
    if let Some((i, &val)) = v.iter().enumerate().find(|(_, x)| !x.is_finite()) {
        return Err(EcmAnalysisError::NumericalError {
            reason: format!("Non-finite value ({}) at position [{}]", val, i),
            operation: Some(operation.to_string()),
        });
    }
    Ok(())
}

/// Validates that a matrix is rectangular (not ragged) and non-empty
fn ensure_rectangular_matrix(a: &[Vec<f64>]) -> EcmResult<(usize, usize)> {
    let n = a.first().map(|row| row.len()).unwrap_or(0);
    if a.is_empty() || n == 0 {
        return Err(EcmAnalysisError::NumericalError {
            reason: "Empty matrix provided".to_string(),
            operation: Some("matrix_validation".to_string()),
        });
    }

    if !a.iter().all(|row| row.len() == n) {
        return Err(EcmAnalysisError::NumericalError {
            reason: "Ragged matrix (inconsistent row lengths)".to_string(),
            operation: Some("matrix_validation".to_string()),
        });
    }

    Ok((a.len(), n))
}

/// Economy QR solve: least-squares solution of `Ax = b` without forming Q.
///
/// `a` is row-major (m rows × n columns) with m ≥ n. Columns that are
/// numerically dependent on earlier ones get a zero coefficient.
pub fn economy_qr_solve(a: &[Vec<f64>], b: &[f64]) -> EcmResult<Vec<f64>> {
    let (m, n) = ensure_rectangular_matrix(a)?;
    ensure_finite_matrix(a, "economy_qr_solve")?;
    ensure_finite_vector(b, "economy_qr_solve")?;

    if m != b.len() {
        return Err(EcmAnalysisError::NumericalError {
            reason: "Matrix-vector dimension mismatch in QR solve".to_string(),
            operation: Some("economy_qr_solve".to_string()),
        });
    }

    if n > m {
        return Err(EcmAnalysisError::NumericalError {
            reason: "Underdetermined system (more columns than rows)".to_string(),
            operation: Some("economy_qr_solve".to_string()),
        });
    }

    let mut r = a.to_vec();
    let mut y = b.to_vec();

    let matrix_norm = r
        .iter()
        .flat_map(|row| row.iter())
        .map(|v| v * v)
        .sum::<f64>()
        .sqrt();
    // tol = max(m,n) * eps * ||A||_F with a safety factor
    let rank_tol = 100.0 * f64::EPSILON * (m.max(n) as f64) * matrix_norm.max(1.0);

    let steps = n.min(m.saturating_sub(1));
    for k in 0..steps {
        let mut v: Vec<f64> = (k..m).map(|i| r[i][k]).collect();
        let norm_v = v.iter().map(|vi| vi * vi).sum::<f64>().sqrt();

        if norm_v < rank_tol {
            for row in r.iter_mut().skip(k) {
                row[k] = 0.0;
            }
            continue;
        }

        let sign = if v[0] >= 0.0 { 1.0 } else { -1.0 };
        v[0] += sign * norm_v;

        let norm_v2 = v.iter().map(|vi| vi * vi).sum::<f64>().sqrt();
        if norm_v2 < rank_tol {
            continue;
        }
        for vi in &mut v {
            *vi /= norm_v2;
        }

        for j in k..n {
            let dot: f64 = (k..m).map(|i| v[i - k] * r[i][j]).sum();
            for i in k..m {
                r[i][j] -= 2.0 * v[i - k] * dot;
            }
        }

        let dot_y: f64 = (k..m).map(|i| v[i - k] * y[i]).sum();
        for i in k..m {
            y[i] -= 2.0 * v[i - k] * dot_y;
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n.min(m)).rev() {
        if r[i][i].abs() < rank_tol {
            x[i] = 0.0;
            continue;
        }

        let mut sum = y[i];
        for j in i + 1..n {
            sum -= r[i][j] * x[j];
        }
        x[i] = sum / r[i][i];
    }

    Ok(x)
}

/// Multiple regression using QR decomposition.
///
/// # Arguments
/// * `x` - Predictors as k vectors, each of length n: `x[predictor][observation]`
/// * `y` - Response vector of length n
pub fn multiple_regression(x: &[Vec<f64>], y: &[f64]) -> EcmResult<Vec<f64>> {
    let k = x.len();
    let n = y.len();

    if n < k {
        return Err(EcmAnalysisError::InsufficientData {
            required: k,
            actual: n,
        });
    }

    ensure_finite_vector(y, "multiple_regression")?;
    for (i, col) in x.iter().enumerate() {
        if col.len() != n {
            return Err(EcmAnalysisError::NumericalError {
                reason: format!("Predictor column {} has inconsistent length", i),
                operation: Some("multiple_regression".to_string()),
            });
        }
        ensure_finite_vector(col, "multiple_regression")?;
    }

    let x_mat: Vec<Vec<f64>> = (0..n).map(|i| x.iter().map(|col| col[i]).collect()).collect();
    economy_qr_solve(&x_mat, y)
}

/// Compute residuals from a predictor-major design and coefficients.
pub fn compute_residuals(x: &[Vec<f64>], y: &[f64], coeffs: &[f64]) -> Vec<f64> {
    debug_assert_eq!(coeffs.len(), x.len(), "coefficients length must match number of predictors");

    (0..y.len())
        .map(|t| {
            let fitted: f64 = coeffs.iter().zip(x).map(|(c, col)| c * col[t]).sum();
            y[t] - fitted
        })
        .collect()
}

/// Ordinary least squares fit with coefficient standard errors.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Coefficients in predictor order
    pub coefficients: Vec<f64>,
    /// Standard errors in predictor order
    pub std_errors: Vec<f64>,
    /// y - Xb
    pub residuals: Vec<f64>,
    /// Residual sum of squares
    pub rss: f64,
    /// Total sum of squares around the mean of y
    pub tss: f64,
    /// Number of observations
    pub nobs: usize,
    /// Residual degrees of freedom (n - k)
    pub df_resid: usize,
}

impl OlsFit {
    /// Centered coefficient of determination.
    pub fn r_squared(&self) -> f64 {
        if self.tss <= 0.0 {
            0.0
        } else {
            1.0 - self.rss / self.tss
        }
    }

    /// t statistic of coefficient `idx`.
    pub fn t_stat(&self, idx: usize) -> f64 {
        self.coefficients[idx] / self.std_errors[idx]
    }

    /// Unbiased residual variance.
    pub fn sigma2(&self) -> f64 {
        self.rss / self.df_resid as f64
    }
}

/// OLS with standard errors from `(X'X)^{-1} = R^{-1} R^{-T}`.
///
/// Fails with a numerical error when the design is rank deficient, since the
/// standard errors would be meaningless.
pub fn ols_fit(x: &[Vec<f64>], y: &[f64]) -> EcmResult<OlsFit> {
    let k = x.len();
    let n = y.len();
    if n <= k {
        return Err(EcmAnalysisError::InsufficientData {
            required: k + 1,
            actual: n,
        });
    }

    let coefficients = multiple_regression(x, y)?;
    let residuals = compute_residuals(x, y, &coefficients);
    let rss: f64 = residuals.iter().map(|r| r * r).sum();
    let y_mean = y.iter().sum::<f64>() / n as f64;
    let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    let df_resid = n - k;

    let design = columns_to_matrix(x);
    let r = design.qr().r();
    const SINGULAR_TOL: f64 = 1e-12;
    let scale = r.diagonal().amax().max(1.0);
    if r.diagonal().iter().any(|d| d.abs() < SINGULAR_TOL * scale) {
        return Err(EcmAnalysisError::NumericalError {
            reason: "design matrix is rank deficient".to_string(),
            operation: Some("ols_fit".to_string()),
        });
    }
    let r_inv = r
        .solve_upper_triangular(&DMatrix::identity(k, k))
        .ok_or_else(|| EcmAnalysisError::NumericalError {
            reason: "triangular solve failed".to_string(),
            operation: Some("ols_fit".to_string()),
        })?;

    let sigma2 = rss / df_resid as f64;
    let std_errors = (0..k)
        .map(|i| (sigma2 * r_inv.row(i).iter().map(|v| v * v).sum::<f64>()).sqrt())
        .collect();

    Ok(OlsFit {
        coefficients,
        std_errors,
        residuals,
        rss,
        tss,
        nobs: n,
        df_resid,
    })
}

/// Build an n × k matrix from k predictor columns of length n.
pub fn columns_to_matrix(columns: &[Vec<f64>]) -> DMatrix<f64> {
    let n = columns.first().map(|c| c.len()).unwrap_or(0);
    DMatrix::from_fn(n, columns.len(), |i, j| columns[j][i])
}

/// Multi-equation least squares `Y = X B`, returning B (k × m).
///
/// Solved through the Cholesky factor of `X'X`.
pub fn matrix_least_squares(x: &DMatrix<f64>, y: &DMatrix<f64>) -> EcmResult<DMatrix<f64>> {
    if x.nrows() != y.nrows() {
        return Err(EcmAnalysisError::NumericalError {
            reason: format!("row mismatch: X has {}, Y has {}", x.nrows(), y.nrows()),
            operation: Some("matrix_least_squares".to_string()),
        });
    }
    if x.nrows() < x.ncols() {
        return Err(EcmAnalysisError::InsufficientData {
            required: x.ncols(),
            actual: x.nrows(),
        });
    }
    if x.ncols() == 0 {
        return Ok(DMatrix::zeros(0, y.ncols()));
    }
    let xtx = x.transpose() * x;
    let xty = x.transpose() * y;
    let chol = xtx.cholesky().ok_or_else(|| EcmAnalysisError::NumericalError {
        reason: "X'X is not positive definite".to_string(),
        operation: Some("matrix_least_squares".to_string()),
    })?;
    Ok(chol.solve(&xty))
}

/// Residuals of `Y` after projecting on `X`; returns `Y` when X has no columns.
pub fn matrix_residuals(x: &DMatrix<f64>, y: &DMatrix<f64>) -> EcmResult<DMatrix<f64>> {
    if x.ncols() == 0 {
        return Ok(y.clone());
    }
    let b = matrix_least_squares(x, y)?;
    Ok(y - x * b)
}

/// Row-major copy of a matrix, for serialization.
pub fn matrix_to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|row| row.iter().copied().collect()).collect()
}

/// Newey-West automatic bandwidth selection, `floor(4 (n/100)^{2/9})`.
pub fn newey_west_bandwidth(residuals: &[f64]) -> usize {
    let n = residuals.len();
    if n <= 2 {
        return 1;
    }

    let raw = (4.0 * (n as f64 / 100.0).powf(2.0 / 9.0)).floor() as usize;
    let upper = (n / 4).max(1).min(n.saturating_sub(1));
    raw.clamp(1, upper)
}

/// Newey-West long-run variance with Bartlett weights.
///
/// `(Σe² + 2 Σ_k w_k Σ_t e_t e_{t-k}) / n` with `w_k = 1 - k/(L+1)` on the
/// demeaned series. `max_lag = 0` gives the plain variance; the lag is capped
/// at n-1. The result is floored at a tiny positive value so ratio statistics
/// stay finite for near-constant series.
pub fn newey_west_lrv(residuals: &[f64], max_lag: usize) -> EcmResult<f64> {
    let n = residuals.len();
    if n < 2 {
        return Err(EcmAnalysisError::InsufficientData {
            required: 2,
            actual: n,
        });
    }

    let mean = residuals.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = residuals.iter().map(|&r| r - mean).collect();

    let gamma0 = centered.iter().map(|&x| x * x).sum::<f64>();
    let mut total = gamma0;

    let bandwidth = max_lag.min(n - 1);
    for k in 1..=bandwidth {
        let weight = 1.0 - (k as f64) / ((bandwidth + 1) as f64);
        let autocov: f64 = (k..n).map(|i| centered[i] * centered[i - k]).sum();
        total += 2.0 * weight * autocov;
    }

    let variance = gamma0 / n as f64;
    let floor = (variance * 1e-12).max(f64::EPSILON);
    Ok((total / n as f64).max(floor))
}
