//! Mathematical utility functions: moments, autocorrelation, and the
//! distribution tail probabilities shared by the statistical tests.

use crate::errors::{EcmAnalysisError, EcmResult};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal};

/// Safe comparison for floating point values (NaN sorts last)
pub fn float_total_cmp(a: &f64, b: &f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.total_cmp(b),
    }
}

/// Calculate percentile from sorted data using linear interpolation.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return f64::NAN;
    }
    if p <= 0.0 {
        return sorted_data[0];
    }
    if p >= 1.0 {
        return sorted_data[sorted_data.len() - 1];
    }

    let n = sorted_data.len();
    let index = p * (n - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted_data[lower]
    } else {
        let weight = index - lower as f64;
        sorted_data[lower] * (1.0 - weight) + sorted_data[upper] * weight
    }
}

/// Arithmetic mean (NaN for empty input).
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample skewness using population moments.
pub fn calculate_skewness(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    let mean = mean(data);
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev < 1e-10 {
        return 0.0;
    }

    data.iter()
        .map(|x| ((x - mean) / std_dev).powi(3))
        .sum::<f64>()
        / n
}

/// Sample kurtosis (not excess; 3.0 for a normal distribution).
pub fn calculate_kurtosis(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    let mean = mean(data);
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev < 1e-10 {
        return 3.0;
    }

    data.iter()
        .map(|x| ((x - mean) / std_dev).powi(4))
        .sum::<f64>()
        / n
}

/// Sample autocorrelations for lags 0..=max_lag.
///
/// Autocovariances use the biased `1/n` estimator so the sequence is positive
/// semi-definite, which the Durbin-Levinson recursion in
/// [`calculate_partial_autocorrelations`] requires.
pub fn calculate_autocorrelations(data: &[f64], max_lag: usize) -> Vec<f64> {
    let n = data.len();
    if n <= max_lag {
        return vec![0.0; max_lag + 1];
    }

    let mean = mean(data);
    let c0 = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if c0 <= 0.0 {
        return vec![0.0; max_lag + 1];
    }

    let mut autocorrs = Vec::with_capacity(max_lag + 1);
    autocorrs.push(1.0);
    for lag in 1..=max_lag {
        let cov: f64 = (0..n - lag)
            .map(|i| (data[i] - mean) * (data[i + lag] - mean))
            .sum::<f64>()
            / n as f64;
        autocorrs.push(cov / c0);
    }
    autocorrs
}

/// Partial autocorrelations for lags 0..=max_lag via Durbin-Levinson.
pub fn calculate_partial_autocorrelations(data: &[f64], max_lag: usize) -> Vec<f64> {
    let acf = calculate_autocorrelations(data, max_lag);
    let mut pacf = vec![0.0; max_lag + 1];
    if acf[0] == 0.0 {
        return pacf;
    }
    pacf[0] = 1.0;

    let mut phi_prev: Vec<f64> = Vec::new();
    let mut sigma: f64 = 1.0;
    for k in 1..=max_lag {
        let num = acf[k] - (1..k).map(|j| phi_prev[j - 1] * acf[k - j]).sum::<f64>();
        let phi_kk = if sigma.abs() < 1e-14 { 0.0 } else { num / sigma };

        let mut phi = Vec::with_capacity(k);
        for j in 1..k {
            phi.push(phi_prev[j - 1] - phi_kk * phi_prev[k - j - 1]);
        }
        phi.push(phi_kk);

        sigma *= 1.0 - phi_kk * phi_kk;
        pacf[k] = phi_kk;
        phi_prev = phi;
    }
    pacf
}

/// Upper tail probability of a χ² distribution.
pub fn chi_squared_sf(stat: f64, df: f64) -> EcmResult<f64> {
    let dist = ChiSquared::new(df).map_err(|_| EcmAnalysisError::NumericalError {
        reason: format!(
            "Failed to create chi-squared distribution with {} degrees of freedom",
            df
        ),
        operation: None,
    })?;
    if !stat.is_finite() {
        return Err(EcmAnalysisError::NumericalError {
            reason: format!("non-finite chi-squared statistic {}", stat),
            operation: None,
        });
    }
    Ok((1.0 - dist.cdf(stat.max(0.0))).clamp(0.0, 1.0))
}

/// Upper tail probability of an F distribution.
pub fn f_sf(stat: f64, df_num: f64, df_den: f64) -> EcmResult<f64> {
    let dist = FisherSnedecor::new(df_num, df_den).map_err(|_| EcmAnalysisError::NumericalError {
        reason: format!("Failed to create F({}, {}) distribution", df_num, df_den),
        operation: None,
    })?;
    if !stat.is_finite() {
        return Err(EcmAnalysisError::NumericalError {
            reason: format!("non-finite F statistic {}", stat),
            operation: None,
        });
    }
    Ok((1.0 - dist.cdf(stat.max(0.0))).clamp(0.0, 1.0))
}

/// Standard normal CDF.
pub fn standard_normal_cdf(x: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(x),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_percentile_interpolates() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0];
        assert_approx_eq!(percentile(&sorted, 0.5), 2.5);
        assert_approx_eq!(percentile(&sorted, 0.0), 1.0);
        assert_approx_eq!(percentile(&sorted, 1.0), 4.0);
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn test_moments_of_symmetric_data() {
        let data = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        assert_approx_eq!(calculate_skewness(&data), 0.0, 1e-12);
        // Population kurtosis of {-2..2}: m4/m2² = 6.8/4 = 1.7
        assert_approx_eq!(calculate_kurtosis(&data), 1.7, 1e-12);
        assert_approx_eq!(calculate_kurtosis(&[1.0; 4]), 3.0);
    }

    #[test]
    fn test_acf_of_ar1_decays() {
        let mut data = vec![0.0; 400];
        let mut state = 0.3_f64;
        for i in 1..400 {
            // deterministic pseudo-noise
            state = (state * 3.9 * (1.0 - state)).clamp(0.01, 0.99);
            data[i] = 0.7 * data[i - 1] + (state - 0.5);
        }
        let acf = calculate_autocorrelations(&data, 5);
        assert_eq!(acf.len(), 6);
        assert_approx_eq!(acf[0], 1.0);
        assert!(acf[1] > 0.5);
        assert!(acf[1] > acf[3]);
    }

    #[test]
    fn test_pacf_first_lag_equals_acf() {
        let data: Vec<f64> = (0..100).map(|i| ((i * 7919) % 101) as f64).collect();
        let acf = calculate_autocorrelations(&data, 4);
        let pacf = calculate_partial_autocorrelations(&data, 4);
        assert_approx_eq!(pacf[0], 1.0);
        assert_approx_eq!(pacf[1], acf[1], 1e-12);
        assert!(pacf.iter().all(|p| p.abs() <= 1.0 + 1e-12));
    }

    #[test]
    fn test_tail_probabilities() {
        assert_approx_eq!(chi_squared_sf(3.841458820694124, 1.0).unwrap(), 0.05, 1e-6);
        assert_approx_eq!(f_sf(0.0, 2.0, 10.0).unwrap(), 1.0);
        assert!(f_sf(f64::NAN, 2.0, 10.0).is_err());
        assert_approx_eq!(standard_normal_cdf(0.0), 0.5, 1e-12);
    }
}
