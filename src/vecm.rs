//! Rank-1 vector error correction model.
//!
//! The model for the endogenous vector `y_t = [price, conflict]` is
//!
//! ```text
//! Δy_t = α (βᵀ y_{t-1} + c) + Γ_1 Δy_{t-1} + ... + Γ_p Δy_{t-p} + u_t
//! ```
//!
//! with the constant `c` restricted to the cointegration relation. β is
//! estimated by Johansen's reduced-rank regression and normalised on price;
//! given β, α and Γ are the least-squares coefficients of the differenced
//! system on the error-correction term and the lagged differences.

use crate::config::EcmConfig;
use crate::errors::{validate_all_finite, EcmAnalysisError, EcmResult};
use crate::linear_algebra::{matrix_least_squares, matrix_residuals};
use crate::math_utils::{float_total_cmp, standard_normal_cdf};
use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Cointegration rank of every fitted model.
pub const COINT_RANK: usize = 1;

/// Endogenous variable names in column order.
pub const ENDOG_NAMES: [&str; 2] = ["usdprice", "conflict_intensity"];

/// Lag orders (in differences) preferred by each information criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagOrderSelection {
    /// Akaike
    pub aic: usize,
    /// Schwarz
    pub bic: usize,
    /// Hannan-Quinn
    pub hqic: usize,
    /// Final prediction error
    pub fpe: usize,
    /// Search ceiling actually used after shrinking for sample size
    pub max_lags: usize,
}

/// Information criteria recomputed from the log-likelihood.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    /// -2 llf + 2k
    #[serde(rename = "AIC")]
    pub aic: Option<f64>,
    /// -2 llf + ln(n) k
    #[serde(rename = "BIC")]
    pub bic: Option<f64>,
    /// -2 llf + 2 ln(ln(n)) k
    #[serde(rename = "HQIC")]
    pub hqic: Option<f64>,
    /// Gaussian log-likelihood
    #[serde(rename = "Log_Likelihood")]
    pub log_likelihood: Option<f64>,
}

fn numerical(reason: impl Into<String>, operation: &str) -> EcmAnalysisError {
    EcmAnalysisError::NumericalError {
        reason: reason.into(),
        operation: Some(operation.to_string()),
    }
}

/// ln|M| of a symmetric positive definite matrix.
fn log_det(m: &DMatrix<f64>, operation: &str) -> EcmResult<f64> {
    let chol = Cholesky::new(m.clone())
        .ok_or_else(|| numerical("residual covariance is not positive definite", operation))?;
    Ok(2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>())
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .min_by(|a, b| float_total_cmp(a.1, b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Stack equal-length columns into a T × K matrix.
pub fn endog_matrix(columns: &[&[f64]]) -> EcmResult<DMatrix<f64>> {
    let n = columns.first().map(|c| c.len()).unwrap_or(0);
    if columns.iter().any(|c| c.len() != n) {
        return Err(EcmAnalysisError::DataQuality {
            context: "endogenous matrix".to_string(),
            reason: "columns have different lengths".to_string(),
        });
    }
    Ok(DMatrix::from_fn(n, columns.len(), |i, j| columns[j][i]))
}

/// Lag order selection for a VECM with the constant inside the relation.
///
/// A VAR in levels with an intercept is fitted for every levels order
/// `1..=max_lags + 1` on the common sample left after the largest order,
/// which corresponds to `0..=max_lags` lags in differences. The ceiling
/// shrinks until `K (max_lags + 1) + 2` observations remain after losing the
/// presample.
pub fn select_order(endog: &DMatrix<f64>, max_lags: usize) -> EcmResult<LagOrderSelection> {
    let (n, k) = endog.shape();
    if k == 0 || n < k + 3 {
        return Err(EcmAnalysisError::InsufficientData {
            required: k + 3,
            actual: n,
        });
    }

    let mut max_lags = max_lags;
    while max_lags > 0 && n < max_lags + 1 + k * (max_lags + 1) + 2 {
        max_lags -= 1;
    }

    let t = n - max_lags - 1;
    let tf = t as f64;
    let y = endog.rows(max_lags + 1, t).clone_owned();

    let mut aic = Vec::with_capacity(max_lags + 1);
    let mut bic = Vec::with_capacity(max_lags + 1);
    let mut hqic = Vec::with_capacity(max_lags + 1);
    let mut fpe = Vec::with_capacity(max_lags + 1);

    for p in 1..=max_lags + 1 {
        let x = DMatrix::from_fn(t, 1 + k * p, |r, c| {
            if c == 0 {
                1.0
            } else {
                let lag = (c - 1) / k + 1;
                endog[(max_lags + 1 + r - lag, (c - 1) % k)]
            }
        });
        let resid = matrix_residuals(&x, &y)?;
        let sigma = resid.transpose() * &resid / tf;
        let ld = log_det(&sigma, "select_order")?;

        let free_params = (p * k * k + k) as f64;
        let df_model = (p * k + 1) as f64;
        aic.push(ld + 2.0 / tf * free_params);
        bic.push(ld + tf.ln() / tf * free_params);
        hqic.push(ld + 2.0 * tf.ln().ln() / tf * free_params);
        fpe.push(((tf + df_model) / (tf - df_model)).powi(k as i32) * ld.exp());
    }

    Ok(LagOrderSelection {
        aic: argmin(&aic),
        bic: argmin(&bic),
        hqic: argmin(&hqic),
        fpe: argmin(&fpe),
        max_lags,
    })
}

/// Usable lag order: `max(1, min(selected, ecm_lags))`.
pub fn clamp_lag_order(selected: usize, ecm_lags: usize) -> usize {
    selected.min(ecm_lags).max(1)
}

/// Fitted rank-1 VECM.
#[derive(Debug, Clone)]
pub struct EcmModel {
    /// Endogenous variable names
    pub names: Vec<String>,
    /// Lags in differences used by the fit
    pub k_ar_diff: usize,
    /// Lag order the AIC preferred before clamping
    pub aic_selected_lags: usize,
    /// True when the AIC choice was moved into `[1, ecm_lags]`, either
    /// capped at `ecm_lags` or raised from 0 to 1
    pub lag_clamped: bool,
    /// Always [`COINT_RANK`]
    pub coint_rank: usize,
    /// Loading coefficients, K × 1
    pub alpha: DMatrix<f64>,
    /// Cointegrating vector normalised on price, K × 1
    pub beta: DMatrix<f64>,
    /// Constant inside the cointegration relation, 1 × 1
    pub const_coint: DMatrix<f64>,
    /// Short-run coefficients `[Γ_1 ... Γ_p]`, K × K·p
    pub gamma: DMatrix<f64>,
    /// ML residual covariance, K × K
    pub sigma_u: DMatrix<f64>,
    /// Gaussian log-likelihood
    pub llf: f64,
    /// Residuals, T × K
    pub resid: DMatrix<f64>,
    /// Fitted levels, T × K
    pub fitted_values: DMatrix<f64>,
    /// Effective sample size T
    pub nobs: usize,
    /// Largest eigenvalue of the reduced-rank problem
    pub eigenvalue: f64,
    stderr: DMatrix<f64>,
    endog: DMatrix<f64>,
}

/// Fit a rank-1 VECM with `k_ar_diff` lagged differences.
pub fn fit_vecm(endog: &DMatrix<f64>, names: &[&str], k_ar_diff: usize) -> EcmResult<EcmModel> {
    let (n, k) = endog.shape();
    let p = k_ar_diff;
    let n_params = 1 + k * p;
    let required = p + n_params + k + 3;
    if n < required {
        return Err(EcmAnalysisError::InsufficientData { required, actual: n });
    }
    if names.len() != k {
        return Err(EcmAnalysisError::InvalidParameter {
            parameter: "names".to_string(),
            value: names.len() as f64,
            constraint: format!("one name per column ({})", k),
        });
    }

    let t = n - 1 - p;
    let tf = t as f64;
    let dy = DMatrix::from_fn(n - 1, k, |i, j| endog[(i + 1, j)] - endog[(i, j)]);
    let dy_dep = dy.rows(p, t).clone_owned();
    let z = DMatrix::from_fn(t, k + 1, |r, c| if c < k { endog[(p + r, c)] } else { 1.0 });
    let lagged = DMatrix::from_fn(t, k * p, |r, c| dy[(p + r - (c / k + 1), c % k)]);

    // Concentrate out the short-run dynamics
    let r0 = matrix_residuals(&lagged, &dy_dep)?;
    let r1 = matrix_residuals(&lagged, &z)?;
    let s00 = r0.transpose() * &r0 / tf;
    let s01 = r0.transpose() * &r1 / tf;
    let s11 = r1.transpose() * &r1 / tf;

    let s00_inv = s00
        .try_inverse()
        .ok_or_else(|| numerical("S00 is singular", "fit_vecm"))?;
    let chol = Cholesky::new(s11).ok_or_else(|| numerical("S11 is not positive definite", "fit_vecm"))?;
    let l_inv = chol
        .l()
        .try_inverse()
        .ok_or_else(|| numerical("Cholesky factor of S11 is singular", "fit_vecm"))?;

    let m = &l_inv * s01.transpose() * &s00_inv * &s01 * l_inv.transpose();
    let m = (&m + m.transpose()) * 0.5;
    let eigen = SymmetricEigen::new(m);
    let (idx, &eigenvalue) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .max_by(|a, b| float_total_cmp(a.1, b.1))
        .ok_or_else(|| numerical("empty eigenvalue set", "fit_vecm"))?;

    let beta_full: DVector<f64> = l_inv.transpose() * eigen.eigenvectors.column(idx);
    let pivot = beta_full[0];
    if !pivot.is_finite() || pivot.abs() < 1e-12 {
        return Err(numerical(
            "cointegrating vector cannot be normalised on the first variable",
            "fit_vecm",
        ));
    }
    let beta_full = beta_full / pivot;

    let ec = &z * &beta_full;
    let w = DMatrix::from_fn(t, n_params, |r, c| if c == 0 { ec[r] } else { lagged[(r, c - 1)] });
    let coefs = matrix_least_squares(&w, &dy_dep)?;
    let resid = &dy_dep - &w * &coefs;
    let sigma_u = resid.transpose() * &resid / tf;
    let ld = log_det(&sigma_u, "fit_vecm")?;
    let llf = -(tf * k as f64 / 2.0) * (1.0 + (2.0 * std::f64::consts::PI).ln()) - tf / 2.0 * ld;

    let wtw_inv = (w.transpose() * &w)
        .try_inverse()
        .ok_or_else(|| numerical("regressor cross-product is singular", "fit_vecm"))?;
    let stderr = DMatrix::from_fn(n_params, k, |j, i| (sigma_u[(i, i)] * wtw_inv[(j, j)]).max(0.0).sqrt());

    let fitted_values = DMatrix::from_fn(t, k, |r, c| endog[(p + 1 + r, c)] - resid[(r, c)]);

    Ok(EcmModel {
        names: names.iter().map(|s| s.to_string()).collect(),
        k_ar_diff: p,
        aic_selected_lags: p,
        lag_clamped: false,
        coint_rank: COINT_RANK,
        alpha: coefs.rows(0, 1).transpose(),
        beta: DMatrix::from_fn(k, 1, |i, _| beta_full[i]),
        const_coint: DMatrix::from_element(1, 1, beta_full[k]),
        gamma: coefs.rows(1, k * p).transpose(),
        sigma_u,
        llf,
        resid,
        fitted_values,
        nobs: t,
        eigenvalue,
        stderr,
        endog: endog.clone(),
    })
}

/// Select the lag order by AIC, clamp it and fit the VECM.
///
/// `price` and `conflict` must already be aligned on dates.
pub fn estimate_ecm(price: &[f64], conflict: &[f64], config: &EcmConfig) -> EcmResult<EcmModel> {
    validate_all_finite(price, "usdprice")?;
    validate_all_finite(conflict, "conflict_intensity")?;
    let endog = endog_matrix(&[price, conflict])?;

    let selection = select_order(&endog, config.max_lags).map_err(|e| e.into_estimation("lag selection"))?;
    let optimal = clamp_lag_order(selection.aic, config.ecm_lags);
    let lag_clamped = optimal != selection.aic;
    if lag_clamped {
        log::warn!(
            "AIC selected {} lags (searched up to {}); adjusted into [1, {}] as {}",
            selection.aic,
            selection.max_lags,
            config.ecm_lags,
            optimal
        );
    }

    let mut model = fit_vecm(&endog, &ENDOG_NAMES, optimal).map_err(|e| e.into_estimation("VECM fit"))?;
    model.aic_selected_lags = selection.aic;
    model.lag_clamped = lag_clamped;
    Ok(model)
}

impl EcmModel {
    /// Number of equations.
    pub fn neqs(&self) -> usize {
        self.names.len()
    }

    /// Information criteria with `n = K (T - p)` and `k = K (p + 1) + r`.
    pub fn fit_metrics(&self) -> FitMetrics {
        let neqs = self.neqs() as f64;
        let n_obs = neqs * self.nobs.saturating_sub(self.k_ar_diff) as f64;
        let k_params = neqs * (self.k_ar_diff + 1) as f64 + self.coint_rank as f64;
        let finite = |v: f64| Some(v).filter(|v| v.is_finite());
        FitMetrics {
            aic: finite(-2.0 * self.llf + 2.0 * k_params),
            bic: finite(-2.0 * self.llf + n_obs.ln() * k_params),
            hqic: finite(-2.0 * self.llf + 2.0 * n_obs.ln().ln() * k_params),
            log_likelihood: finite(self.llf),
        }
    }

    /// Coefficients of the equivalent VAR in levels, `A_1 ... A_{p+1}`.
    pub fn var_coefficients(&self) -> Vec<DMatrix<f64>> {
        let k = self.neqs();
        let p = self.k_ar_diff;
        let pi = &self.alpha * self.beta.transpose();
        let gamma_block = |i: usize| self.gamma.columns(i * k, k).clone_owned();

        (0..=p)
            .map(|i| {
                let mut a = DMatrix::<f64>::zeros(k, k);
                if i == 0 {
                    a += DMatrix::<f64>::identity(k, k) + &pi;
                }
                if i < p {
                    a += gamma_block(i);
                }
                if i > 0 {
                    a -= gamma_block(i - 1);
                }
                a
            })
            .collect()
    }

    /// Intercept of the levels VAR, `α c`.
    pub fn var_intercept(&self) -> DVector<f64> {
        let c = self.const_coint[(0, 0)];
        DVector::from_iterator(self.neqs(), self.alpha.column(0).iter().map(|a| a * c))
    }

    /// Moving-average matrices `Φ_0 = I ... Φ_horizon`.
    pub fn ma_rep(&self, horizon: usize) -> Vec<DMatrix<f64>> {
        let k = self.neqs();
        let a = self.var_coefficients();
        let mut phi = vec![DMatrix::identity(k, k)];
        for i in 1..=horizon {
            let mut m = DMatrix::zeros(k, k);
            for j in 1..=i.min(a.len()) {
                m += &phi[i - j] * &a[j - 1];
            }
            phi.push(m);
        }
        phi
    }

    /// Levels path driven by `shocks` (T × K), starting from the sample's
    /// presample values.
    pub fn simulate(&self, shocks: &DMatrix<f64>) -> DMatrix<f64> {
        let k = self.neqs();
        let k_ar = self.k_ar_diff + 1;
        let a = self.var_coefficients();
        let nu = self.var_intercept();
        let n = k_ar + shocks.nrows();

        let mut y = DMatrix::<f64>::zeros(n, k);
        for t in 0..k_ar.min(self.endog.nrows()) {
            y.set_row(t, &self.endog.row(t));
        }
        for t in k_ar..n {
            let mut next = nu.clone();
            for (j, a_j) in a.iter().enumerate() {
                let prev = y.row(t - j - 1).transpose();
                next += a_j * prev;
            }
            next += shocks.row(t - k_ar).transpose();
            y.set_row(t, &next.transpose());
        }
        y
    }

    /// Fit the same model layout to another levels sample.
    pub fn refit(&self, endog: &DMatrix<f64>) -> EcmResult<EcmModel> {
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        fit_vecm(endog, &names, self.k_ar_diff)
    }

    /// Plain-text summary of the estimated coefficients.
    pub fn summary_text(&self) -> String {
        let k = self.neqs();
        let rule = "=".repeat(78);
        let thin = "-".repeat(78);
        let mut out = String::new();

        let row = |out: &mut String, label: &str, coef: f64, se: f64| {
            let z = coef / se;
            let p = 2.0 * (1.0 - standard_normal_cdf(z.abs()));
            let _ = writeln!(out, "{:<20}{:>14.4}{:>14.4}{:>14.3}{:>14.3}", label, coef, se, z, p);
        };
        let header = |out: &mut String, title: String| {
            let _ = writeln!(out, "{}", title);
            let _ = writeln!(out, "{}", rule);
            let _ = writeln!(out, "{:<20}{:>14}{:>14}{:>14}{:>14}", "", "coef", "std err", "z", "P>|z|");
            let _ = writeln!(out, "{}", thin);
        };

        for (eq, name) in self.names.iter().enumerate() {
            if self.k_ar_diff > 0 {
                header(&mut out, format!("Lagged endogenous parameters for equation {}", name));
                for lag in 0..self.k_ar_diff {
                    for (var, var_name) in self.names.iter().enumerate() {
                        let col = lag * k + var;
                        row(
                            &mut out,
                            &format!("L{}.{}", lag + 1, var_name),
                            self.gamma[(eq, col)],
                            self.stderr[(1 + col, eq)],
                        );
                    }
                }
                let _ = writeln!(out, "{}", rule);
            }
            header(&mut out, format!("Loading coefficients (alpha) for equation {}", name));
            row(&mut out, "ec1", self.alpha[(eq, 0)], self.stderr[(0, eq)]);
            let _ = writeln!(out, "{}", rule);
        }

        let _ = writeln!(out, "Cointegration relations for loading-coefficients-column 1");
        let _ = writeln!(out, "{}", rule);
        for i in 0..k {
            let _ = writeln!(out, "{:<20}{:>14.4}", format!("beta.{}", i + 1), self.beta[(i, 0)]);
        }
        let _ = writeln!(out, "{:<20}{:>14.4}", "const", self.const_coint[(0, 0)]);
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(
            out,
            "No. observations: {}  Lags (diff): {}  Log-likelihood: {:.4}",
            self.nobs, self.k_ar_diff, self.llf
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_rng::SecureRng;
    use assert_approx_eq::assert_approx_eq;

    /// price = 5 + 2 conflict + AR(1) error, conflict a random walk.
    fn cointegrated_pair(n: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
        let mut rng = SecureRng::with_seed(seed);
        let mut x = 10.0;
        let mut u = 0.0;
        let mut price = Vec::with_capacity(n);
        let mut conflict = Vec::with_capacity(n);
        for _ in 0..n {
            x += rng.standard_normal();
            u = 0.5 * u + rng.standard_normal();
            conflict.push(x);
            price.push(5.0 + 2.0 * x + u);
        }
        (price, conflict)
    }

    /// Cointegrated pair whose conflict differences carry a strong lag-3 term.
    fn third_order_pair(n: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
        let mut rng = SecureRng::with_seed(seed);
        let mut x = 10.0;
        let mut dx = vec![0.0; 3];
        let mut price = Vec::with_capacity(n);
        let mut conflict = Vec::with_capacity(n);
        for t in 0..n + 3 {
            let step = 0.7 * dx[t] + rng.standard_normal();
            dx.push(step);
            x += step;
            if t >= 3 {
                conflict.push(x);
                price.push(5.0 + 2.0 * x + 0.5 * rng.standard_normal());
            }
        }
        (price, conflict)
    }

    #[test]
    fn test_aic_choice_above_cap_is_clamped() {
        let config = EcmConfig { ecm_lags: 1, max_lags: 6 };
        let (price, conflict) = third_order_pair(400, 17);
        let model = estimate_ecm(&price, &conflict, &config).unwrap();

        assert_eq!(model.k_ar_diff, 1);
        assert!(model.lag_clamped);
        assert!(model.aic_selected_lags > 1, "AIC chose {}", model.aic_selected_lags);

        let unit = crate::panel::AnalysisUnit::new("Wheat", "Unified");
        let record = crate::results::EcmResultsRecord::from_model(&unit, &model, Default::default());
        assert_eq!(record.optimal_lags, 1);
        assert_eq!(record.aic_selected_lags, model.aic_selected_lags);
        assert!(record.lag_clamped);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["optimal_lags"], 1);
        assert_eq!(json["lag_clamped"], true);
        assert_eq!(json["aic_selected_lags"].as_u64(), Some(model.aic_selected_lags as u64));
        let back: crate::results::EcmResultsRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.aic_selected_lags, model.aic_selected_lags);
        assert!(back.lag_clamped);
    }

    #[test]
    fn test_recovers_cointegrating_vector() {
        for seed in 0..5 {
            let (price, conflict) = cointegrated_pair(250, seed);
            let model = estimate_ecm(&price, &conflict, &EcmConfig::default()).unwrap();
            assert_approx_eq!(model.beta[(0, 0)], 1.0, 1e-12);
            assert!((model.beta[(1, 0)] + 2.0).abs() < 0.2, "beta = {}", model.beta[(1, 0)]);
            assert!((model.const_coint[(0, 0)] + 5.0).abs() < 2.0);
            // Price corrects deviations from equilibrium
            assert!(model.alpha[(0, 0)] < 0.0);
            assert!((1..=2).contains(&model.k_ar_diff));
        }
    }

    #[test]
    fn test_shapes_and_fitted_values() {
        let (price, conflict) = cointegrated_pair(120, 9);
        let endog = endog_matrix(&[&price, &conflict]).unwrap();
        let model = fit_vecm(&endog, &ENDOG_NAMES, 2).unwrap();
        assert_eq!(model.nobs, 120 - 1 - 2);
        assert_eq!(model.gamma.shape(), (2, 4));
        assert_eq!(model.alpha.shape(), (2, 1));
        assert_eq!(model.resid.shape(), (117, 2));
        for r in 0..model.nobs {
            let level = price[3 + r];
            assert_approx_eq!(model.fitted_values[(r, 0)] + model.resid[(r, 0)], level, 1e-9);
        }
        // ML covariance is the residual cross-product over T
        let s = model.resid.transpose() * &model.resid / model.nobs as f64;
        assert_approx_eq!(s[(0, 1)], model.sigma_u[(0, 1)], 1e-12);
    }

    #[test]
    fn test_fit_metrics_formula() {
        let (price, conflict) = cointegrated_pair(100, 4);
        let endog = endog_matrix(&[&price, &conflict]).unwrap();
        let model = fit_vecm(&endog, &ENDOG_NAMES, 1).unwrap();
        let metrics = model.fit_metrics();
        let n_obs = 2.0 * (model.nobs - 1) as f64;
        let k = 2.0 * 2.0 + 1.0;
        assert_approx_eq!(metrics.aic.unwrap(), -2.0 * model.llf + 2.0 * k, 1e-9);
        assert_approx_eq!(metrics.bic.unwrap(), -2.0 * model.llf + n_obs.ln() * k, 1e-9);
        assert_approx_eq!(metrics.hqic.unwrap(), -2.0 * model.llf + 2.0 * n_obs.ln().ln() * k, 1e-9);
        assert_eq!(metrics.log_likelihood, Some(model.llf));
    }

    #[test]
    fn test_ma_rep_starts_at_identity() {
        let (price, conflict) = cointegrated_pair(150, 2);
        let endog = endog_matrix(&[&price, &conflict]).unwrap();
        let model = fit_vecm(&endog, &ENDOG_NAMES, 1).unwrap();
        let ma = model.ma_rep(10);
        assert_eq!(ma.len(), 11);
        assert_eq!(ma[0], DMatrix::identity(2, 2));
        let a = model.var_coefficients();
        assert_eq!(a.len(), 2);
        assert!((&ma[1] - &a[0]).amax() < 1e-12);
        // Levels VAR coefficients sum to I + αβᵀ
        let pi = &model.alpha * model.beta.transpose();
        let sum = &a[0] + &a[1];
        assert!((sum - DMatrix::identity(2, 2) - pi).amax() < 1e-10);
    }

    #[test]
    fn test_simulate_with_residuals_reproduces_sample() {
        let (price, conflict) = cointegrated_pair(80, 21);
        let endog = endog_matrix(&[&price, &conflict]).unwrap();
        let model = fit_vecm(&endog, &ENDOG_NAMES, 2).unwrap();
        let path = model.simulate(&model.resid);
        assert_eq!(path.nrows(), 80);
        assert!((path - endog).amax() < 1e-8);
    }

    #[test]
    fn test_select_order_shrinks_ceiling() {
        let (price, conflict) = cointegrated_pair(40, 5);
        let endog = endog_matrix(&[&price, &conflict]).unwrap();
        let selection = select_order(&endog, 12).unwrap();
        assert!(selection.max_lags < 12);
        assert!(selection.aic <= selection.max_lags);
        assert!(selection.bic <= selection.max_lags);
    }

    #[test]
    fn test_clamp_lag_order() {
        assert_eq!(clamp_lag_order(0, 2), 1);
        assert_eq!(clamp_lag_order(1, 2), 1);
        assert_eq!(clamp_lag_order(7, 2), 2);
    }

    #[test]
    fn test_short_sample_is_insufficient_data() {
        let err = estimate_ecm(&[1.0, 2.0, 3.0], &[1.0, 2.5, 2.0], &EcmConfig::default()).unwrap_err();
        assert!(matches!(err, EcmAnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_summary_mentions_every_block() {
        let (price, conflict) = cointegrated_pair(100, 8);
        let model = estimate_ecm(&price, &conflict, &EcmConfig::default()).unwrap();
        let text = model.summary_text();
        assert!(text.contains("L1.usdprice"));
        assert!(text.contains("Loading coefficients (alpha) for equation conflict_intensity"));
        assert!(text.contains("beta.2"));
        assert!(text.contains("const"));
    }
}
