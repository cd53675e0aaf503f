//! Engle-Granger two-step cointegration test of price on conflict intensity.
//!
//! Step one regresses price on a constant and conflict intensity; step two
//! runs a Dickey-Fuller test without deterministic terms on the residuals.
//! Because the residuals come from an estimated relation, the statistic is
//! compared against the two-variable MacKinnon distribution rather than the
//! ordinary ADF one.

use crate::config::CointegrationConfig;
use crate::errors::{validate_all_finite, validate_nonzero_variance, EcmAnalysisError, EcmResult};
use crate::linear_algebra::ols_fit;
use crate::panel::{align_on_dates, ObservationSeries};
use crate::stationarity::{
    adf_core, mackinnon_critical_values, mackinnon_pvalue, AdfRegression, CriticalValues,
    Transformation,
};
use serde::{Deserialize, Serialize};

/// Engle-Granger test output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngleGrangerResult {
    /// Dickey-Fuller t statistic on the cointegrating residual
    pub cointegration_statistic: f64,
    /// MacKinnon approximate p-value (two variables, constant)
    pub p_value: f64,
    /// Finite-sample critical values
    pub critical_values: CriticalValues,
    /// `p_value` below the configured significance
    pub cointegrated: bool,
    /// Long-run coefficient of price on conflict intensity
    pub rho: f64,
    /// Constant of the cointegrating regression
    pub intercept: f64,
    /// Lag order picked for the residual test
    pub used_lag: usize,
}

/// Cointegration record stored per unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CointegrationResult {
    /// Engle-Granger outcome
    pub engle_granger: EngleGrangerResult,
    /// Stationarity transformation selected for price
    pub price_transformation: Transformation,
    /// Stationarity transformation selected for conflict intensity
    pub conflict_transformation: Transformation,
    /// Dates present in both series
    pub aligned_observations: usize,
}

/// Engle-Granger test on two already aligned slices.
pub fn engle_granger_aligned(
    price: &[f64],
    conflict: &[f64],
    config: &CointegrationConfig,
) -> EcmResult<EngleGrangerResult> {
    if price.len() != conflict.len() {
        return Err(EcmAnalysisError::DataQuality {
            context: "cointegration".to_string(),
            reason: format!(
                "series lengths differ after alignment ({} vs {})",
                price.len(),
                conflict.len()
            ),
        });
    }
    if price.len() < 2 {
        return Err(EcmAnalysisError::InsufficientData {
            required: 2,
            actual: price.len(),
        });
    }
    validate_all_finite(price, "usdprice")?;
    validate_all_finite(conflict, "conflict_intensity")?;
    validate_nonzero_variance(conflict, "conflict_intensity")?;

    let n = price.len();
    let fit = ols_fit(&[vec![1.0; n], conflict.to_vec()], price)?;

    // An exact linear relation leaves nothing to test.
    if 1.0 - fit.r_squared() < 100.0 * f64::EPSILON.sqrt() {
        return Err(EcmAnalysisError::DataQuality {
            context: "cointegration".to_string(),
            reason: "price is an exact linear function of conflict intensity".to_string(),
        });
    }

    let (statistic, used_lag, _) =
        adf_core(&fit.residuals, AdfRegression::NoConstant, Some(config.max_lags))?;
    let p_value = mackinnon_pvalue(statistic, 2);

    Ok(EngleGrangerResult {
        cointegration_statistic: statistic,
        p_value,
        critical_values: mackinnon_critical_values(2, n - 1),
        cointegrated: p_value < config.significance,
        rho: fit.coefficients[1],
        intercept: fit.coefficients[0],
        used_lag,
    })
}

/// Engle-Granger test of price on conflict intensity, joined on dates.
pub fn engle_granger(
    price: &ObservationSeries,
    conflict: &ObservationSeries,
    config: &CointegrationConfig,
) -> EcmResult<EngleGrangerResult> {
    let (_, p, c) = align_on_dates(price, conflict);
    engle_granger_aligned(&p, &c, config)
}

/// Run the cointegration stage for one unit.
pub fn test_cointegration(
    price: &ObservationSeries,
    conflict: &ObservationSeries,
    price_transformation: Transformation,
    conflict_transformation: Transformation,
    config: &CointegrationConfig,
) -> EcmResult<CointegrationResult> {
    log::debug!("Running cointegration tests");
    let (_, p, c) = align_on_dates(price, conflict);
    let engle_granger = engle_granger_aligned(&p, &c, config)?;
    Ok(CointegrationResult {
        engle_granger,
        price_transformation,
        conflict_transformation,
        aligned_observations: p.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_rng::SecureRng;
    use chrono::NaiveDate;

    fn walk(n: usize, rng: &mut SecureRng) -> Vec<f64> {
        let mut level = 0.0;
        (0..n)
            .map(|_| {
                level += rng.standard_normal();
                level
            })
            .collect()
    }

    #[test]
    fn test_detects_known_cointegrating_relation() {
        let config = CointegrationConfig::default();
        let mut detected = 0;
        for seed in 0..20 {
            let mut rng = SecureRng::with_seed(seed);
            let x = walk(150, &mut rng);
            let y: Vec<f64> = x.iter().map(|v| 2.0 * v + rng.standard_normal()).collect();
            let result = engle_granger_aligned(&y, &x, &config).unwrap();
            assert!((result.rho - 2.0).abs() < 0.2, "rho = {}", result.rho);
            if result.cointegrated {
                detected += 1;
            }
        }
        assert!(detected >= 18, "detected {} of 20", detected);
    }

    #[test]
    fn test_independent_walks_false_positive_rate() {
        let config = CointegrationConfig::default();
        let runs = 100;
        let false_positives = (0..runs)
            .filter(|&seed| {
                let mut rng = SecureRng::with_seed(1_000 + seed);
                let x = walk(150, &mut rng);
                let y = walk(150, &mut rng);
                engle_granger_aligned(&y, &x, &config).unwrap().cointegrated
            })
            .count();
        let rate = false_positives as f64 / runs as f64;
        assert!(rate <= 0.15, "false positive rate {}", rate);
    }

    #[test]
    fn test_critical_values_ordered() {
        let mut rng = SecureRng::with_seed(3);
        let x = walk(80, &mut rng);
        let y: Vec<f64> = x.iter().map(|v| 1.0 + 0.5 * v + rng.standard_normal()).collect();
        let result = engle_granger_aligned(&y, &x, &CointegrationConfig::default()).unwrap();
        let cv = result.critical_values;
        assert!(cv.one_percent < cv.five_percent && cv.five_percent < cv.ten_percent);
        assert!((0.0..=1.0).contains(&result.p_value));
    }

    #[test]
    fn test_requires_two_points_and_variance() {
        let config = CointegrationConfig::default();
        assert!(matches!(
            engle_granger_aligned(&[1.0], &[2.0], &config),
            Err(EcmAnalysisError::InsufficientData { required: 2, actual: 1 })
        ));
        let flat = vec![1.0; 30];
        let price: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert!(matches!(
            engle_granger_aligned(&price, &flat, &config),
            Err(EcmAnalysisError::DataQuality { .. })
        ));
    }

    #[test]
    fn test_joins_on_dates_not_positions() {
        let date = |i: u32| NaiveDate::from_ymd_opt(2015 + (i / 12) as i32, i % 12 + 1, 1).unwrap();
        let mut rng = SecureRng::with_seed(11);
        let x = walk(120, &mut rng);
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + rng.standard_normal()).collect();

        // Price misses the first ten months, conflict misses the last five.
        let price = ObservationSeries::from_pairs((10..120).map(|i| (date(i as u32), y[i])));
        let conflict = ObservationSeries::from_pairs((0..115).map(|i| (date(i as u32), x[i])));
        let result = test_cointegration(
            &price,
            &conflict,
            Transformation::Diff,
            Transformation::Original,
            &CointegrationConfig::default(),
        )
        .unwrap();
        assert_eq!(result.aligned_observations, 105);
        assert!((result.engle_granger.rho - 2.0).abs() < 0.2);
        assert_eq!(result.price_transformation, Transformation::Diff);
    }
}
