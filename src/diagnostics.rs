//! # Residual Diagnostics and Dynamic Analysis
//!
//! Post-estimation checks for a fitted [`EcmModel`]:
//!
//! - autocorrelation (Ljung-Box, Durbin-Watson, ACF/PACF)
//! - heteroskedasticity (Engle's ARCH-LM, Breusch-Pagan)
//! - normality (Jarque-Bera)
//! - Granger causality of conflict intensity for price
//! - impulse responses with residual-bootstrap bands
//! - forecast error variance decomposition
//!
//! Every test runs on its own. A failing test leaves its fields `None` (or
//! its list empty) and logs a warning; the remaining tests still run.

use crate::config::DiagnosticsConfig;
use crate::errors::{validate_data_length, EcmAnalysisError, EcmResult};
use crate::linear_algebra::{matrix_to_rows, ols_fit};
use crate::math_utils::{
    calculate_autocorrelations, calculate_kurtosis, calculate_partial_autocorrelations,
    calculate_skewness, chi_squared_sf, f_sf, float_total_cmp, percentile,
};
use crate::secure_rng::SecureRng;
use crate::vecm::EcmModel;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Headline residual diagnostics of the price equation.
///
/// Fields are `None` when the corresponding test failed so that consumers
/// see an explicit `null` rather than a missing key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    /// Ljung-Box p-value at the ECM lag order
    pub breusch_godfrey_pvalue: Option<f64>,
    /// ARCH-LM p-value
    pub arch_test_pvalue: Option<f64>,
    /// Jarque-Bera statistic
    pub jarque_bera_stat: Option<f64>,
    /// Jarque-Bera p-value
    pub jarque_bera_pvalue: Option<f64>,
    /// Breusch-Pagan LM statistic
    pub breusch_pagan_lm_stat: Option<f64>,
    /// Breusch-Pagan p-value
    pub breusch_pagan_pvalue: Option<f64>,
    /// Durbin-Watson statistic
    pub durbin_watson_stat: Option<f64>,
    /// Residual skewness
    pub skewness: Option<f64>,
    /// Residual kurtosis (3 for a normal distribution)
    pub kurtosis: Option<f64>,
    /// Autocorrelations from lag 0
    pub acf: Vec<f64>,
    /// Partial autocorrelations from lag 0
    pub pacf: Vec<f64>,
}

/// Granger causality statistics at one lag order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrangerLagResult {
    /// F test on the restricted/unrestricted SSR
    pub ssr_ftest_pvalue: f64,
    /// F statistic
    pub ssr_ftest_stat: f64,
    /// χ² version of the SSR test
    pub ssr_chi2test_pvalue: f64,
    /// χ² statistic
    pub ssr_chi2test_stat: f64,
    /// Likelihood-ratio test p-value
    pub lrtest_pvalue: f64,
    /// Likelihood-ratio statistic
    pub lrtest_stat: f64,
    /// F test that all lagged cause coefficients are zero
    pub params_ftest_pvalue: f64,
    /// F statistic
    pub params_ftest_stat: f64,
}

/// Granger results per lag order.
pub type GrangerByLag = BTreeMap<usize, GrangerLagResult>;

/// Impulse responses `irf[h][i][j]`: response of variable i at step h to a
/// unit shock in variable j.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpulseResponse {
    /// Point responses, (horizon + 1) × K × K
    pub irf: Vec<Vec<Vec<f64>>>,
    /// Lower bootstrap band (empty without bootstrap)
    pub lower: Vec<Vec<Vec<f64>>>,
    /// Upper bootstrap band (empty without bootstrap)
    pub upper: Vec<Vec<Vec<f64>>>,
}

/// Everything the diagnostic stage produces for one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticOutcome {
    /// Residual tests
    pub report: DiagnosticsReport,
    /// Granger results keyed by causing variable
    pub granger_causality: BTreeMap<String, GrangerByLag>,
    /// Impulse responses
    pub impulse_response: ImpulseResponse,
    /// Variance shares per horizon step
    pub fevd: Vec<Vec<f64>>,
}

fn attempt<T>(test_name: &str, result: EcmResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            let failure = EcmAnalysisError::DiagnosticFailure {
                test_name: test_name.to_string(),
                reason: e.to_string(),
            };
            log::warn!("{}", failure);
            None
        }
    }
}

/// Ljung-Box Q statistic and χ²(lags) p-value.
pub fn ljung_box(data: &[f64], lags: usize) -> EcmResult<(f64, f64)> {
    if lags == 0 {
        return Err(EcmAnalysisError::InvalidParameter {
            parameter: "lags".to_string(),
            value: 0.0,
            constraint: "must be > 0".to_string(),
        });
    }
    let n = data.len();
    validate_data_length(data, lags + 1, "ljung_box")?;

    let mean = data.iter().sum::<f64>() / n as f64;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
    if variance < 1e-12 {
        return Ok((0.0, 1.0));
    }

    // Q = n(n+2) Σ r_k²/(n-k) with r_k = Σ(x_t-μ)(x_{t-k}-μ) / Σ(x_t-μ)²
    let mut q = 0.0;
    for k in 1..=lags {
        let r_k = (k..n).map(|i| (data[i] - mean) * (data[i - k] - mean)).sum::<f64>() / variance;
        q += r_k * r_k * (n * (n + 2)) as f64 / (n - k) as f64;
    }
    Ok((q, chi_squared_sf(q, lags as f64)?))
}

/// Engle's ARCH-LM test: regress e²_t on a constant and `lags` of e².
///
/// Returns `(LM, p-value)` with `LM = (n - lags) R²` against χ²(lags).
pub fn arch_lm(resid: &[f64], lags: usize) -> EcmResult<(f64, f64)> {
    let lags = lags.max(1);
    let n = resid.len();
    validate_data_length(resid, 2 * lags + 3, "arch_lm")?;

    let sq: Vec<f64> = resid.iter().map(|e| e * e).collect();
    let rows = n - lags;
    let mut x = vec![vec![1.0; rows]];
    for j in 1..=lags {
        x.push((lags..n).map(|t| sq[t - j]).collect());
    }
    let fit = ols_fit(&x, &sq[lags..])?;
    let lm = rows as f64 * fit.r_squared();
    Ok((lm, chi_squared_sf(lm, lags as f64)?))
}

/// Breusch-Pagan (Koenker) test of e² on `[1, regressors...]`.
///
/// Returns `(LM, p-value)` with `LM = n R²` against χ²(number of regressors).
pub fn breusch_pagan(resid: &[f64], regressors: &[Vec<f64>]) -> EcmResult<(f64, f64)> {
    let n = resid.len();
    if regressors.is_empty() || regressors.iter().any(|r| r.len() != n) {
        return Err(EcmAnalysisError::DataQuality {
            context: "breusch_pagan".to_string(),
            reason: "regressors must be non-empty and match the residual length".to_string(),
        });
    }
    let sq: Vec<f64> = resid.iter().map(|e| e * e).collect();
    let mut x = vec![vec![1.0; n]];
    x.extend(regressors.iter().cloned());
    let fit = ols_fit(&x, &sq)?;
    let lm = n as f64 * fit.r_squared();
    Ok((lm, chi_squared_sf(lm, regressors.len() as f64)?))
}

/// Jarque-Bera normality test: `(statistic, p-value, skewness, kurtosis)`.
pub fn jarque_bera(resid: &[f64]) -> EcmResult<(f64, f64, f64, f64)> {
    let n = resid.len();
    validate_data_length(resid, 3, "jarque_bera")?;
    let skew = calculate_skewness(resid);
    let kurt = calculate_kurtosis(resid);
    let stat = n as f64 / 6.0 * (skew * skew + (kurt - 3.0).powi(2) / 4.0);
    Ok((stat, chi_squared_sf(stat, 2.0)?, skew, kurt))
}

/// Durbin-Watson statistic `Σ(e_t - e_{t-1})² / Σe²`.
pub fn durbin_watson(resid: &[f64]) -> EcmResult<f64> {
    validate_data_length(resid, 2, "durbin_watson")?;
    let ss: f64 = resid.iter().map(|e| e * e).sum();
    if ss <= 0.0 {
        return Err(EcmAnalysisError::NumericalError {
            reason: "residuals are identically zero".to_string(),
            operation: Some("durbin_watson".to_string()),
        });
    }
    let diff: f64 = resid.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    Ok(diff / ss)
}

/// Granger causality tests of `cause` for `effect` at lags `1..=max_lag`.
///
/// Both regressions at a given lag use the same `n - lag` observations and
/// include a constant.
pub fn granger_causality(effect: &[f64], cause: &[f64], max_lag: usize) -> EcmResult<GrangerByLag> {
    let n = effect.len();
    if cause.len() != n {
        return Err(EcmAnalysisError::DataQuality {
            context: "granger_causality".to_string(),
            reason: "series lengths differ".to_string(),
        });
    }
    if max_lag == 0 {
        return Err(EcmAnalysisError::InvalidParameter {
            parameter: "max_lag".to_string(),
            value: 0.0,
            constraint: "must be > 0".to_string(),
        });
    }
    validate_data_length(effect, 3 * max_lag + 2, "granger_causality")?;

    let mut results = BTreeMap::new();
    for lag in 1..=max_lag {
        let nobs = n - lag;
        let y = &effect[lag..];
        let mut restricted = vec![vec![1.0; nobs]];
        for j in 1..=lag {
            restricted.push((lag..n).map(|t| effect[t - j]).collect());
        }
        let mut unrestricted = restricted.clone();
        for j in 1..=lag {
            unrestricted.push((lag..n).map(|t| cause[t - j]).collect());
        }

        let down = ols_fit(&restricted, y)?;
        let joint = ols_fit(&unrestricted, y)?;
        if joint.rss <= 0.0 {
            return Err(EcmAnalysisError::NumericalError {
                reason: "unrestricted regression fits exactly".to_string(),
                operation: Some("granger_causality".to_string()),
            });
        }

        let lag_f = lag as f64;
        let df_resid = joint.df_resid as f64;
        let f_stat = (down.rss - joint.rss) / joint.rss / lag_f * df_resid;
        let f_p = f_sf(f_stat, lag_f, df_resid)?;
        let chi2_stat = nobs as f64 * (down.rss - joint.rss) / joint.rss;
        let lr_stat = nobs as f64 * (down.rss / joint.rss).ln();

        results.insert(
            lag,
            GrangerLagResult {
                ssr_ftest_pvalue: f_p,
                ssr_ftest_stat: f_stat,
                ssr_chi2test_pvalue: chi_squared_sf(chi2_stat, lag_f)?,
                ssr_chi2test_stat: chi2_stat,
                lrtest_pvalue: chi_squared_sf(lr_stat, lag_f)?,
                lrtest_stat: lr_stat,
                // Under OLS the Wald F on the cause lags equals the SSR F
                params_ftest_pvalue: f_p,
                params_ftest_stat: f_stat,
            },
        );
    }
    Ok(results)
}

/// Lag ceiling for Granger tests: `min(configured, max(n / 5, 1))`.
pub fn granger_max_lag(configured: usize, n: usize) -> usize {
    configured.min((n / 5).max(1))
}

/// Variance decomposition from moving-average matrices.
///
/// For each step `i < horizon`, `V_i = Σ_{j≤i} Φ_j Ω Φ_jᵀ` with
/// `Ω = Σ_u Σ_uᵀ`; the step's shares are `diag(V_i) / Σ diag(V_i)`.
pub fn fevd_from_ma(ma: &[DMatrix<f64>], sigma_u: &DMatrix<f64>, horizon: usize) -> EcmResult<Vec<Vec<f64>>> {
    if ma.len() < horizon {
        return Err(EcmAnalysisError::InsufficientData {
            required: horizon,
            actual: ma.len(),
        });
    }
    let k = sigma_u.nrows();
    if ma.iter().any(|m| m.shape() != (k, k)) {
        return Err(EcmAnalysisError::DataQuality {
            context: "fevd".to_string(),
            reason: "moving-average matrices do not match the covariance shape".to_string(),
        });
    }

    let omega = sigma_u * sigma_u.transpose();
    let mut variance = DMatrix::<f64>::zeros(k, k);
    let mut shares = Vec::with_capacity(horizon);
    for phi in ma.iter().take(horizon) {
        variance += phi * &omega * phi.transpose();
        let diag = variance.diagonal();
        let total = diag.sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(EcmAnalysisError::NumericalError {
                reason: "forecast error variance is not positive".to_string(),
                operation: Some("fevd_from_ma".to_string()),
            });
        }
        shares.push(diag.iter().map(|d| d / total).collect());
    }
    Ok(shares)
}

fn ma_to_nested(ma: &[DMatrix<f64>]) -> Vec<Vec<Vec<f64>>> {
    ma.iter().map(matrix_to_rows).collect()
}

/// Impulse responses with percentile bands from a residual bootstrap.
///
/// Replicate `r` draws residual rows with replacement using a generator
/// seeded with `seed + r`, rebuilds a levels sample from the fitted
/// dynamics, refits the same model and records its responses.
/// Replicates whose refit fails are dropped.
pub fn impulse_responses(
    model: &EcmModel,
    horizon: usize,
    reps: usize,
    significance: f64,
    seed: u64,
) -> EcmResult<ImpulseResponse> {
    let point = model.ma_rep(horizon);
    if point.iter().any(|m| m.iter().any(|v| !v.is_finite())) {
        return Err(EcmAnalysisError::NumericalError {
            reason: "non-finite impulse responses".to_string(),
            operation: Some("impulse_responses".to_string()),
        });
    }
    let irf = ma_to_nested(&point);
    if reps == 0 {
        return Ok(ImpulseResponse {
            irf,
            ..Default::default()
        });
    }

    let (t, k) = model.resid.shape();
    let means: Vec<f64> = (0..k).map(|j| model.resid.column(j).mean()).collect();
    let centered = DMatrix::from_fn(t, k, |i, j| model.resid[(i, j)] - means[j]);

    let mut draws: Vec<Vec<DMatrix<f64>>> = Vec::with_capacity(reps);
    for rep in 0..reps {
        let mut rng = SecureRng::for_replicate(seed, rep);
        let rows: Vec<usize> = (0..t).map(|_| rng.usize(0..t)).collect();
        let shocks = DMatrix::from_fn(t, k, |i, j| centered[(rows[i], j)]);
        let sample = model.simulate(&shocks);
        if let Ok(refit) = model.refit(&sample) {
            draws.push(refit.ma_rep(horizon));
        }
    }

    if draws.is_empty() {
        log::warn!("Every IRF bootstrap replicate failed; reporting point responses only");
        return Ok(ImpulseResponse {
            irf,
            ..Default::default()
        });
    }
    if draws.len() < reps {
        log::debug!("{} of {} IRF bootstrap replicates failed", reps - draws.len(), reps);
    }

    let band = |q: f64| -> Vec<Vec<Vec<f64>>> {
        (0..=horizon)
            .map(|h| {
                (0..k)
                    .map(|i| {
                        (0..k)
                            .map(|j| {
                                let mut values: Vec<f64> = draws.iter().map(|d| d[h][(i, j)]).collect();
                                values.sort_by(float_total_cmp);
                                percentile(&values, q)
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect()
    };

    Ok(ImpulseResponse {
        irf,
        lower: band(significance / 2.0),
        upper: band(1.0 - significance / 2.0),
    })
}

/// Residual tests on the price equation.
///
/// `regressor` is the conflict-intensity level series aligned with the
/// estimation sample; its tail matching the residual length is the
/// Breusch-Pagan regressor.
pub fn residual_report(
    resid: &[f64],
    regressor: &[f64],
    ecm_lags: usize,
    config: &DiagnosticsConfig,
) -> DiagnosticsReport {
    let n = resid.len();
    let mut report = DiagnosticsReport::default();

    report.breusch_godfrey_pvalue = attempt("ljung_box", ljung_box(resid, ecm_lags.max(1))).map(|(_, p)| p);

    let arch_lags = config.arch_lags.min(n.saturating_sub(3) / 2).max(1);
    report.arch_test_pvalue = attempt("arch_lm", arch_lm(resid, arch_lags)).map(|(_, p)| p);

    if let Some((stat, p, skew, kurt)) = attempt("jarque_bera", jarque_bera(resid)) {
        report.jarque_bera_stat = Some(stat);
        report.jarque_bera_pvalue = Some(p);
        report.skewness = Some(skew);
        report.kurtosis = Some(kurt);
    }

    report.durbin_watson_stat = attempt("durbin_watson", durbin_watson(resid));

    let bp = if regressor.len() >= n {
        breusch_pagan(resid, &[regressor[regressor.len() - n..].to_vec()])
    } else {
        Err(EcmAnalysisError::InsufficientData {
            required: n,
            actual: regressor.len(),
        })
    };
    if let Some((lm, p)) = attempt("breusch_pagan", bp) {
        report.breusch_pagan_lm_stat = Some(lm);
        report.breusch_pagan_pvalue = Some(p);
    }

    if n >= 2 {
        let nlags = config.acf_lags.min(n - 1);
        report.acf = calculate_autocorrelations(resid, nlags);
        report.pacf = calculate_partial_autocorrelations(resid, nlags);
    } else {
        log::warn!(
            "{}",
            EcmAnalysisError::DiagnosticFailure {
                test_name: "acf".to_string(),
                reason: format!("{} residuals", n),
            }
        );
    }

    report
}

/// Run the full diagnostic stage on a fitted model.
///
/// `price` and `conflict` are the date-aligned level series the model was
/// estimated on.
pub fn run_diagnostics(
    model: &EcmModel,
    price: &[f64],
    conflict: &[f64],
    ecm_lags: usize,
    config: &DiagnosticsConfig,
) -> DiagnosticOutcome {
    let resid_price: Vec<f64> = model.resid.column(0).iter().copied().collect();
    let report = residual_report(&resid_price, conflict, ecm_lags, config);

    let max_lag = granger_max_lag(config.granger_max_lags, price.len());
    let mut granger = BTreeMap::new();
    let by_lag = attempt("granger_causality", granger_causality(price, conflict, max_lag)).unwrap_or_default();
    granger.insert("conflict_intensity".to_string(), by_lag);

    let impulse_response = attempt(
        "impulse_response",
        impulse_responses(
            model,
            config.irf_horizon,
            config.irf_bootstrap_reps,
            config.irf_significance,
            config.seed,
        ),
    )
    .unwrap_or_default();

    let fevd = attempt(
        "fevd",
        fevd_from_ma(&model.ma_rep(config.irf_horizon), &model.sigma_u, config.irf_horizon),
    )
    .unwrap_or_default();

    DiagnosticOutcome {
        report,
        granger_causality: granger,
        impulse_response,
        fevd,
    }
}
