//! Unit-root and stationarity testing.
//!
//! [`classify_series`] walks a fixed list of candidate transformations
//! (original, first difference, log, log difference) and picks the first one
//! that both the Augmented Dickey-Fuller test (null: unit root) and the KPSS
//! test (null: level stationarity) agree is stationary.
//!
//! ADF p-values use MacKinnon's (1994) approximate asymptotic distribution;
//! critical values use the MacKinnon (2010) finite-sample response surface.

use crate::config::StationarityConfig;
use crate::errors::{validate_all_finite, EcmAnalysisError, EcmResult};
use crate::linear_algebra::{newey_west_bandwidth, newey_west_lrv, ols_fit};
use crate::math_utils::standard_normal_cdf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Smallest series the unit-root tests accept.
pub const MIN_UNIT_ROOT_OBSERVATIONS: usize = 10;

/// Candidate transformation of a series, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transformation {
    /// Levels as observed
    Original,
    /// First difference, first observation dropped
    Diff,
    /// Natural logarithm
    Log,
    /// First difference of the natural logarithm
    LogDiff,
}

impl Transformation {
    /// Name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transformation::Original => "original",
            Transformation::Diff => "diff",
            Transformation::Log => "log",
            Transformation::LogDiff => "log_diff",
        }
    }

    /// Apply the transformation. Log variants assume strictly positive input.
    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        match self {
            Transformation::Original => values.to_vec(),
            Transformation::Diff => difference(values),
            Transformation::Log => values.iter().map(|v| v.ln()).collect(),
            Transformation::LogDiff => {
                difference(&values.iter().map(|v| v.ln()).collect::<Vec<_>>())
            }
        }
    }

    /// Number of leading observations the transformation drops.
    pub fn dropped_observations(&self) -> usize {
        match self {
            Transformation::Diff | Transformation::LogDiff => 1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First differences `x[t] - x[t-1]`.
pub fn difference(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Critical values at the 1%, 5% and 10% levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    /// 1% level
    #[serde(rename = "1%")]
    pub one_percent: f64,
    /// 5% level
    #[serde(rename = "5%")]
    pub five_percent: f64,
    /// 10% level
    #[serde(rename = "10%")]
    pub ten_percent: f64,
}

/// Deterministic terms in the ADF regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdfRegression {
    /// No deterministic terms (used on cointegrating residuals)
    NoConstant,
    /// Constant only
    Constant,
}

/// ADF test configuration.
#[derive(Debug, Clone)]
pub struct AdfConfig {
    /// Deterministic terms
    pub regression: AdfRegression,
    /// Maximum lag order searched by AIC (None: Schwert rule)
    pub max_lag: Option<usize>,
}

impl Default for AdfConfig {
    fn default() -> Self {
        Self {
            regression: AdfRegression::Constant,
            max_lag: None,
        }
    }
}

/// Augmented Dickey-Fuller test output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfResult {
    /// t statistic on the lagged level
    pub statistic: f64,
    /// MacKinnon approximate p-value
    pub p_value: f64,
    /// Lag order chosen by AIC
    pub used_lag: usize,
    /// Observations in the final regression
    pub nobs: usize,
    /// Finite-sample critical values
    pub critical_values: CriticalValues,
}

/// Core ADF regression: returns (t statistic, chosen lag, regression nobs).
///
/// Every candidate lag is fitted on the same sample (the one left after the
/// largest lag), the AIC-best lag is picked, and the regression is rerun on
/// the longest sample that lag allows.
pub(crate) fn adf_core(
    data: &[f64],
    regression: AdfRegression,
    max_lag: Option<usize>,
) -> EcmResult<(f64, usize, usize)> {
    let n = data.len();
    if n < MIN_UNIT_ROOT_OBSERVATIONS {
        return Err(EcmAnalysisError::InsufficientData {
            required: MIN_UNIT_ROOT_OBSERVATIONS,
            actual: n,
        });
    }

    let ntrend = usize::from(regression == AdfRegression::Constant);
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let bound = (n / 2).saturating_sub(ntrend + 1);
    let max_lag = max_lag.unwrap_or(schwert).min(schwert).min(bound);

    let diffs = difference(data);

    // Row t regresses diffs[t] on data[t] (y_{t-1} for that difference),
    // diffs[t-1..t-lag] and the deterministic terms.
    let build = |lag: usize, start: usize| -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows = start..diffs.len();
        let mut x = vec![rows.clone().map(|t| data[t]).collect::<Vec<f64>>()];
        for j in 1..=lag {
            x.push(rows.clone().map(|t| diffs[t - j]).collect());
        }
        if ntrend == 1 {
            x.push(vec![1.0; diffs.len() - start]);
        }
        (x, diffs[start..].to_vec())
    };

    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let (x, y) = build(lag, max_lag);
        let k = x.len();
        let Ok(fit) = ols_fit(&x, &y) else {
            continue;
        };
        if fit.rss <= 0.0 {
            continue;
        }
        let nobs = y.len() as f64;
        let aic = nobs * (fit.rss / nobs).ln() + 2.0 * k as f64;
        if best.map_or(true, |(b, _)| aic < b) {
            best = Some((aic, lag));
        }
    }

    let (_, best_lag) = best.ok_or_else(|| EcmAnalysisError::NumericalError {
        reason: "ADF test failed: every lag configuration was singular".to_string(),
        operation: Some("augmented_dickey_fuller".to_string()),
    })?;

    let (x, y) = build(best_lag, best_lag);
    let fit = ols_fit(&x, &y)?;
    let t_stat = fit.t_stat(0);
    if !t_stat.is_finite() {
        return Err(EcmAnalysisError::NumericalError {
            reason: "ADF statistic is not finite (perfect fit)".to_string(),
            operation: Some("augmented_dickey_fuller".to_string()),
        });
    }

    Ok((t_stat, best_lag, y.len()))
}

/// Augmented Dickey-Fuller test with constant and AIC lag selection.
pub fn augmented_dickey_fuller(data: &[f64]) -> EcmResult<AdfResult> {
    augmented_dickey_fuller_with_config(data, &AdfConfig::default())
}

/// Augmented Dickey-Fuller test with configuration.
pub fn augmented_dickey_fuller_with_config(data: &[f64], config: &AdfConfig) -> EcmResult<AdfResult> {
    let (statistic, used_lag, nobs) = adf_core(data, config.regression, config.max_lag)?;
    let (p_value, critical_values) = match config.regression {
        AdfRegression::Constant => (
            mackinnon_pvalue(statistic, 1),
            mackinnon_critical_values(1, nobs),
        ),
        AdfRegression::NoConstant => (
            mackinnon_pvalue_no_constant(statistic),
            no_constant_critical_values(nobs),
        ),
    };

    Ok(AdfResult {
        statistic,
        p_value,
        used_lag,
        nobs,
        critical_values,
    })
}

// MacKinnon (1994) approximate distribution, constant case, N = 1 and 2.
const TAU_MAX_C: [f64; 2] = [2.74, 0.92];
const TAU_MIN_C: [f64; 2] = [-18.83, -18.86];
const TAU_STAR_C: [f64; 2] = [-1.61, -2.62];
const TAU_SMALLP_C: [[f64; 3]; 2] = [[2.1659, 1.4412, 0.038269], [2.92, 1.5012, 0.039796]];
const TAU_LARGEP_C: [[f64; 4]; 2] = [
    [1.7339, 0.93202, -0.12745, -0.010368],
    [2.1945, 0.64695, -0.29198, -0.042377],
];

/// MacKinnon approximate p-value for a Dickey-Fuller type statistic with a
/// constant, `n_vars` = number of variables in the (cointegrating) regression.
pub fn mackinnon_pvalue(stat: f64, n_vars: usize) -> f64 {
    let idx = n_vars.clamp(1, 2) - 1;
    if stat > TAU_MAX_C[idx] {
        return 1.0;
    }
    if stat < TAU_MIN_C[idx] {
        return 0.0;
    }
    let z = if stat <= TAU_STAR_C[idx] {
        let c = TAU_SMALLP_C[idx];
        c[0] + c[1] * stat + c[2] * stat * stat
    } else {
        let c = TAU_LARGEP_C[idx];
        c[0] + c[1] * stat + c[2] * stat * stat + c[3] * stat * stat * stat
    };
    standard_normal_cdf(z)
}

fn mackinnon_pvalue_no_constant(stat: f64) -> f64 {
    const TAU_MAX: f64 = 1.51;
    const TAU_MIN: f64 = -19.04;
    const TAU_STAR: f64 = -1.04;
    if stat > TAU_MAX {
        return 1.0;
    }
    if stat < TAU_MIN {
        return 0.0;
    }
    let z = if stat <= TAU_STAR {
        0.6344 + 1.2378 * stat + 0.032496 * stat * stat
    } else {
        0.4797 + 0.93557 * stat - 0.06999 * stat * stat + 0.033066 * stat * stat * stat
    };
    standard_normal_cdf(z)
}

/// MacKinnon (2010) critical values, constant case, for `n_vars` = 1 or 2.
pub fn mackinnon_critical_values(n_vars: usize, nobs: usize) -> CriticalValues {
    let n_inv = 1.0 / nobs.max(1) as f64;
    let surface = |b: [f64; 4]| b[0] + b[1] * n_inv + b[2] * n_inv.powi(2) + b[3] * n_inv.powi(3);
    if n_vars <= 1 {
        CriticalValues {
            one_percent: surface([-3.43035, -6.5393, -16.786, -79.433]),
            five_percent: surface([-2.86154, -2.8903, -4.234, -40.040]),
            ten_percent: surface([-2.56677, -1.5384, -2.809, 0.0]),
        }
    } else {
        CriticalValues {
            one_percent: surface([-3.89644, -10.9519, -22.527, 0.0]),
            five_percent: surface([-3.33613, -6.1101, -6.823, 0.0]),
            ten_percent: surface([-3.04445, -4.2412, -2.720, 0.0]),
        }
    }
}

fn no_constant_critical_values(nobs: usize) -> CriticalValues {
    let n_inv = 1.0 / nobs.max(1) as f64;
    CriticalValues {
        one_percent: -2.56574 - 2.2358 * n_inv - 3.627 * n_inv * n_inv,
        five_percent: -1.94100 - 0.2686 * n_inv - 3.365 * n_inv * n_inv,
        ten_percent: -1.61682 + 0.2656 * n_inv - 2.714 * n_inv * n_inv,
    }
}

/// Lag truncation rule for the KPSS long-run variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthMethod {
    /// Hobijn, Franses & Ooms (1998) data-dependent rule
    Auto,
    /// `floor(4 (n/100)^{2/9})`
    NeweyWest,
    /// Fixed number of lags
    Fixed(usize),
}

/// KPSS configuration (level stationarity).
#[derive(Debug, Clone)]
pub struct KpssConfig {
    /// Bandwidth selection method
    pub bandwidth: BandwidthMethod,
}

impl Default for KpssConfig {
    fn default() -> Self {
        Self {
            bandwidth: BandwidthMethod::Auto,
        }
    }
}

/// KPSS test output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpssResult {
    /// η / σ̂² statistic
    pub statistic: f64,
    /// Interpolated p-value, clipped to [0.01, 0.10]
    pub p_value: f64,
    /// Lags used in the long-run variance
    pub lags: usize,
    /// Kwiatkowski et al. (1992) level critical values
    pub critical_values: CriticalValues,
}

/// KPSS level-stationarity test with automatic lag truncation.
pub fn kpss_test(data: &[f64]) -> EcmResult<KpssResult> {
    kpss_test_with_config(data, &KpssConfig::default())
}

/// KPSS test with configuration.
pub fn kpss_test_with_config(data: &[f64], config: &KpssConfig) -> EcmResult<KpssResult> {
    let n = data.len();
    if n < MIN_UNIT_ROOT_OBSERVATIONS {
        return Err(EcmAnalysisError::InsufficientData {
            required: MIN_UNIT_ROOT_OBSERVATIONS,
            actual: n,
        });
    }

    let mean = data.iter().sum::<f64>() / n as f64;
    let residuals: Vec<f64> = data.iter().map(|x| x - mean).collect();

    let lags = match config.bandwidth {
        BandwidthMethod::Auto => hobijn_autolag(&residuals),
        BandwidthMethod::NeweyWest => newey_west_bandwidth(&residuals),
        BandwidthMethod::Fixed(l) => l,
    }
    .min(n - 1);

    let mut cumsum = 0.0;
    let eta = residuals
        .iter()
        .map(|r| {
            cumsum += r;
            cumsum * cumsum
        })
        .sum::<f64>()
        / (n * n) as f64;

    let lrv = newey_west_lrv(&residuals, lags)?;
    let statistic = eta / lrv;

    Ok(KpssResult {
        statistic,
        p_value: kpss_p_value(statistic),
        lags,
        critical_values: CriticalValues {
            one_percent: 0.739,
            five_percent: 0.463,
            ten_percent: 0.347,
        },
    })
}

/// Hobijn, Franses & Ooms (1998) automatic lag for the KPSS variance.
fn hobijn_autolag(residuals: &[f64]) -> usize {
    let n = residuals.len();
    let covlags = (n as f64).powf(2.0 / 9.0) as usize;
    let mut s0 = residuals.iter().map(|r| r * r).sum::<f64>() / n as f64;
    let mut s1 = 0.0;
    for i in 1..=covlags.min(n - 1) {
        let prod: f64 = (i..n).map(|t| residuals[t] * residuals[t - i]).sum::<f64>() / (n as f64 / 2.0);
        s0 += prod;
        s1 += i as f64 * prod;
    }
    if s0 <= 0.0 {
        return 0;
    }
    let s_hat = s1 / s0;
    let gamma_hat = 1.1447 * (s_hat * s_hat).powf(1.0 / 3.0);
    (gamma_hat * (n as f64).powf(1.0 / 3.0)) as usize
}

/// KPSS p-value by linear interpolation in the level critical-value table.
///
/// Values outside the table are clipped to 0.01 (large statistics) and 0.10
/// (small statistics).
pub fn kpss_p_value(stat: f64) -> f64 {
    const TABLE: [(f64, f64); 4] = [(0.347, 0.10), (0.463, 0.05), (0.574, 0.025), (0.739, 0.01)];
    if stat <= TABLE[0].0 {
        return TABLE[0].1;
    }
    if stat >= TABLE[3].0 {
        return TABLE[3].1;
    }
    for w in TABLE.windows(2) {
        let (c0, p0) = w[0];
        let (c1, p1) = w[1];
        if stat <= c1 {
            return p0 + (p1 - p0) * (stat - c0) / (c1 - c0);
        }
    }
    TABLE[3].1
}

/// One test's headline numbers as reported per candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRootSummary {
    /// Test statistic
    #[serde(rename = "Statistic")]
    pub statistic: f64,
    /// p-value
    #[serde(rename = "p-value")]
    pub p_value: f64,
    /// Whether this test alone points to stationarity
    #[serde(rename = "Stationary")]
    pub stationary: bool,
}

/// ADF and KPSS outcome for one candidate transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Augmented Dickey-Fuller (null: unit root)
    #[serde(rename = "ADF")]
    pub adf: UnitRootSummary,
    /// KPSS (null: stationarity)
    #[serde(rename = "KPSS")]
    pub kpss: UnitRootSummary,
}

impl CandidateResult {
    /// Both tests agree on stationarity.
    pub fn is_stationary(&self) -> bool {
        self.adf.stationary && self.kpss.stationary
    }
}

/// Classification of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityResult {
    /// Selected transformation
    pub transformation: Transformation,
    /// True when no candidate qualified and `original` was used by default
    pub degraded: bool,
    /// Per-candidate results for every candidate that was evaluated
    pub results: BTreeMap<Transformation, CandidateResult>,
    /// Values of the selected transformation
    pub series: Vec<f64>,
}

/// Candidate list in evaluation order. Log variants require strictly
/// positive values.
pub fn candidate_transformations(values: &[f64]) -> Vec<Transformation> {
    let mut candidates = vec![Transformation::Original, Transformation::Diff];
    if values.iter().all(|&v| v > 0.0) {
        candidates.push(Transformation::Log);
        candidates.push(Transformation::LogDiff);
    }
    candidates
}

/// Run ADF and KPSS on one candidate series.
pub fn test_candidate(series: &[f64], config: &StationarityConfig) -> EcmResult<CandidateResult> {
    let adf = augmented_dickey_fuller(series)?;
    let kpss = kpss_test(series)?;
    Ok(CandidateResult {
        adf: UnitRootSummary {
            statistic: adf.statistic,
            p_value: adf.p_value,
            stationary: adf.p_value < config.adf_significance,
        },
        kpss: UnitRootSummary {
            statistic: kpss.statistic,
            p_value: kpss.p_value,
            stationary: kpss.p_value > config.kpss_significance,
        },
    })
}

/// Pick the first stationary transformation of `values`.
///
/// Evaluation stops at the first qualifying candidate. A candidate whose
/// tests fail is logged and counts as non-stationary. When nothing qualifies
/// the original series is returned with `degraded = true`.
pub fn classify_series(
    values: &[f64],
    variable: &str,
    config: &StationarityConfig,
) -> EcmResult<StationarityResult> {
    validate_all_finite(values, variable)?;
    log::debug!("Running stationarity tests for {}", variable);

    let mut results = BTreeMap::new();
    let mut selected = None;

    for candidate in candidate_transformations(values) {
        let series = candidate.apply(values);
        match test_candidate(&series, config) {
            Ok(result) => {
                let stationary = result.is_stationary();
                results.insert(candidate, result);
                if stationary {
                    selected = Some((candidate, series));
                    break;
                }
            }
            Err(e) => {
                log::warn!(
                    "Stationarity test failed for {} with {} transformation: {}",
                    variable,
                    candidate,
                    e
                );
            }
        }
    }

    let (transformation, series, degraded) = match selected {
        Some((t, s)) => (t, s, false),
        None => {
            log::warn!(
                "No transformation made {} stationary; using original",
                variable
            );
            (Transformation::Original, values.to_vec(), true)
        }
    };

    Ok(StationarityResult {
        transformation,
        degraded,
        results,
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_rng::SecureRng;

    fn white_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = SecureRng::with_seed(seed);
        (0..n).map(|_| rng.standard_normal()).collect()
    }

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut level = 0.0;
        white_noise(n, seed)
            .into_iter()
            .map(|e| {
                level += e;
                level
            })
            .collect()
    }

    #[test]
    fn test_mackinnon_pvalue_near_five_percent_critical_value() {
        let p = mackinnon_pvalue(-2.8615, 1);
        assert!((p - 0.05).abs() < 0.005, "p = {}", p);
        let p = mackinnon_pvalue(-3.3361, 2);
        assert!((p - 0.05).abs() < 0.005, "p = {}", p);
        assert_eq!(mackinnon_pvalue(5.0, 1), 1.0);
        assert_eq!(mackinnon_pvalue(-30.0, 1), 0.0);
    }

    #[test]
    fn test_mackinnon_pvalue_continuous_at_switch_point() {
        let below = mackinnon_pvalue(TAU_STAR_C[0] - 1e-9, 1);
        let above = mackinnon_pvalue(TAU_STAR_C[0] + 1e-9, 1);
        assert!((below - above).abs() < 0.005);
    }

    #[test]
    fn test_adf_rejects_unit_root_for_white_noise() {
        let data = white_noise(200, 7);
        let result = augmented_dickey_fuller(&data).unwrap();
        assert!(result.p_value < 0.05, "p = {}", result.p_value);
        assert!(result.statistic < result.critical_values.five_percent);
        assert!(result.nobs <= 199);
    }

    #[test]
    fn test_adf_keeps_unit_root_for_random_walks() {
        // Size is nominal 5%, so most of 20 walks must keep the null
        let kept = (0..20)
            .filter(|&seed| augmented_dickey_fuller(&random_walk(200, seed)).unwrap().p_value > 0.05)
            .count();
        assert!(kept >= 15, "only {} of 20 random walks kept the unit root", kept);
    }

    #[test]
    fn test_adf_insufficient_data() {
        let result = augmented_dickey_fuller(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            result,
            Err(EcmAnalysisError::InsufficientData { required: 10, actual: 3 })
        ));
    }

    #[test]
    fn test_adf_without_constant() {
        let config = AdfConfig {
            regression: AdfRegression::NoConstant,
            max_lag: Some(4),
        };
        let result = augmented_dickey_fuller_with_config(&white_noise(150, 13), &config).unwrap();
        assert!(result.used_lag <= 4);
        assert!(result.critical_values.five_percent < -1.9);
        assert!(result.p_value < 0.05);
    }

    #[test]
    fn test_kpss_white_noise_is_stationary() {
        let kept = (0..20)
            .filter(|&seed| kpss_test(&white_noise(200, 100 + seed)).unwrap().p_value > 0.05)
            .count();
        assert!(kept >= 15, "only {} of 20 white noise series passed KPSS", kept);
    }

    #[test]
    fn test_kpss_trend_rejects_stationarity() {
        let data: Vec<f64> = (0..100).map(|i| i as f64 * 0.5).collect();
        let result = kpss_test(&data).unwrap();
        assert_eq!(result.p_value, 0.01);
    }

    #[test]
    fn test_kpss_p_value_interpolation() {
        assert_eq!(kpss_p_value(0.1), 0.10);
        assert_eq!(kpss_p_value(2.0), 0.01);
        assert!((kpss_p_value(0.463) - 0.05).abs() < 1e-12);
        let mid = kpss_p_value(0.4);
        assert!(mid < 0.10 && mid > 0.05);
    }

    #[test]
    fn test_white_noise_selects_original_without_diff() {
        let config = StationarityConfig::default();
        let mut selected_original = 0;
        for seed in 0..20 {
            let data: Vec<f64> = white_noise(120, 200 + seed).into_iter().map(|e| 10.0 + e).collect();
            let result = classify_series(&data, "usdprice", &config).unwrap();
            if result.transformation == Transformation::Original {
                selected_original += 1;
                assert!(!result.degraded);
                // Short-circuit: nothing after the winning candidate is evaluated
                assert_eq!(result.results.len(), 1);
                assert!(!result.results.contains_key(&Transformation::Diff));
                assert_eq!(result.series, data);
            }
        }
        assert!(selected_original >= 15, "original chosen {} of 20 times", selected_original);
    }

    #[test]
    fn test_trending_walk_selects_difference() {
        let config = StationarityConfig::default();
        let mut selected_diff = 0;
        for seed in 0..20 {
            // Drift makes the level series fail KPSS for certain
            let data: Vec<f64> = random_walk(150, 300 + seed)
                .into_iter()
                .enumerate()
                .map(|(i, v)| v + 0.5 * i as f64)
                .collect();
            let result = classify_series(&data, "usdprice", &config).unwrap();
            assert!(result.results.contains_key(&Transformation::Original));
            assert!(!result.results[&Transformation::Original].is_stationary());
            if result.transformation == Transformation::Diff {
                selected_diff += 1;
                assert_eq!(result.series.len(), 149);
            }
        }
        assert!(selected_diff >= 15, "diff chosen {} of 20 times", selected_diff);
    }

    #[test]
    fn test_non_positive_series_never_tries_logs() {
        let data: Vec<f64> = random_walk(80, 9).into_iter().map(|v| -10.0 - v.abs()).collect();
        let result =
            classify_series(&data, "conflict_intensity", &StationarityConfig::default()).unwrap();
        assert!(!result.results.contains_key(&Transformation::Log));
        assert!(!result.results.contains_key(&Transformation::LogDiff));
        assert_eq!(candidate_transformations(&data).len(), 2);
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let data = vec![1.0, 2.0, f64::NAN, 4.0];
        let err = classify_series(&data, "usdprice", &StationarityConfig::default()).unwrap_err();
        assert!(matches!(err, EcmAnalysisError::DataQuality { .. }));
    }

    #[test]
    fn test_failed_candidates_fall_back_to_original() {
        // Too short for either test on any candidate.
        let data = vec![1.0, 2.0, 4.0, 3.0, 5.0];
        let result = classify_series(&data, "usdprice", &StationarityConfig::default()).unwrap();
        assert_eq!(result.transformation, Transformation::Original);
        assert!(result.degraded);
        assert!(result.results.is_empty());
    }

    #[test]
    fn test_transformation_names_serialize_snake_case() {
        let json = serde_json::to_string(&Transformation::LogDiff).unwrap();
        assert_eq!(json, "\"log_diff\"");
        assert_eq!(Transformation::Diff.apply(&[1.0, 3.0, 6.0]), vec![2.0, 3.0]);
    }
}
