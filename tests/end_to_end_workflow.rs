//! End-to-end runs of the batch pipeline on synthetic panels.
//!
//! These tests exercise the full chain from panel rows to the JSON files on
//! disk: gating, stationarity, cointegration, VECM estimation, diagnostics and
//! result assembly.

mod common;

use common::{cointegrated_rows, independent_rows, test_config};
use conflict_ecm::results::{
    CONSOLIDATED_FILE, COINTEGRATION_FILE, DIAGNOSTICS_FILE, ECM_RESULTS_FILE, STATIONARITY_FILE,
    SUMMARY_FILE,
};
use conflict_ecm::{Observation, Pipeline, SummaryReport};
use serde_json::Value;
use std::path::Path;

const ESTIMATED: [&str; 5] = ["Wheat", "Sugar", "Salt", "Onions", "Lentils"];

fn scenario() -> Vec<Observation> {
    let mut rows = Vec::new();
    for (i, commodity) in ESTIMATED.iter().enumerate() {
        rows.extend(cointegrated_rows(commodity, "Unified", 40, 1 + i as u64));
    }
    rows.extend(cointegrated_rows("Eggs", "North", 29, 20));
    rows.extend(cointegrated_rows("Tomatoes", "North", 30, 21));
    rows.extend(independent_rows("Beans (white)", "South", 60, 22));
    // Not a tracked commodity
    rows.extend(cointegrated_rows("Gold", "Unified", 40, 23));
    rows
}

fn read_json(dir: &Path, name: &str) -> Value {
    let text = std::fs::read_to_string(dir.join(name)).unwrap();
    serde_json::from_str(&text).unwrap()
}

/// Test scenario: Wheat in the Unified regime with 40 monthly observations
///
/// Validates that cointegrated 40-observation units are estimated and that
/// every estimated record has the expected shapes.
#[test]
fn test_wheat_unified_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_config(dir.path())).unwrap();
    let results = pipeline.run(&scenario()).unwrap();
    results.write_all(dir.path()).unwrap();

    for name in [
        CONSOLIDATED_FILE,
        SUMMARY_FILE,
        ECM_RESULTS_FILE,
        DIAGNOSTICS_FILE,
        STATIONARITY_FILE,
        COINTEGRATION_FILE,
    ] {
        assert!(dir.path().join(name).exists(), "{} was not written", name);
    }

    let summary = &results.summary;
    assert_eq!(summary.total_datasets, 7, "40-row units, Tomatoes and Beans are attempted");
    assert!(
        summary.successful_ecm_estimations >= 4,
        "only {} ECMs estimated",
        summary.successful_ecm_estimations
    );
    assert!(results.consolidated.get("Gold", "Unified").is_none());

    let wheat = results.consolidated.get("Wheat", "Unified").unwrap();
    assert!(wheat.stationarity_results.is_some());
    let coint = wheat.cointegration_results.as_ref().unwrap();
    assert_eq!(coint.aligned_observations, 40);
    assert!((coint.engle_granger.rho - 2.0).abs() < 0.2);

    for record in &results.ecm_results {
        assert!((1..=2).contains(&record.optimal_lags));
        assert_eq!(record.cointegration_vector.len(), 2);
        assert_eq!(record.cointegration_vector[0][0], 1.0);
        assert!((record.cointegration_vector[1][0] + 2.0).abs() < 0.3);
        assert_eq!(record.speed_of_adjustment.len(), 2);
        assert_eq!(record.short_run_coefficients[0].len(), 2 * record.optimal_lags);
        assert_eq!(record.residuals.len(), record.fitted_values.len());
        assert_eq!(record.residuals[0].len(), 2);
        assert!(record.fit_metrics.aic.is_some());
        assert!(record.fit_metrics.log_likelihood.is_some());
        assert_eq!(record.regression.coint_rank, 1);
        assert_eq!(record.coefficients.constant.len(), 1);
        assert!(record.coefficients.det_coef.is_empty());

        let unit = results.consolidated.get(&record.commodity, &record.regime).unwrap();
        let aligned = unit.cointegration_results.as_ref().unwrap().aligned_observations;
        let granger = &record.granger_causality["conflict_intensity"];
        assert_eq!(
            granger.keys().copied().collect::<Vec<_>>(),
            (1..=(aligned / 5).min(12)).collect::<Vec<_>>()
        );

        assert_eq!(unit.irfs.impulse_response.irf.len(), 11);
        assert!(unit.irfs.impulse_response.lower.is_empty());
        assert_eq!(unit.fevds.forecast_error_variance_decomposition.len(), 10);
        assert!(unit.summaries.summary.contains("conflict_intensity"));
        assert_eq!(unit.diagnostics.report.acf.len(), 21);
        assert!(unit.skip_reason.is_none());
    }
}

/// Test scenario: MIN_OBSERVATIONS boundary
///
/// A unit one row short of the gate is skipped and absent from the
/// consolidated document; a unit exactly at the gate is attempted.
#[test]
fn test_min_observations_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let results = Pipeline::new(test_config(dir.path()))
        .unwrap()
        .run(&scenario())
        .unwrap();

    assert!(results.consolidated.get("Eggs", "North").is_none());
    let eggs = results
        .summary
        .skipped
        .iter()
        .find(|s| s.commodity == "Eggs")
        .unwrap();
    assert_eq!(eggs.stage, "observation_gate");

    let tomatoes = results.consolidated.get("Tomatoes", "North").unwrap();
    assert!(tomatoes.stationarity_results.is_some());
    assert!(!results
        .summary
        .skipped
        .iter()
        .any(|s| s.commodity == "Tomatoes" && s.stage == "observation_gate"));
}

/// Test scenario: skipped units keep a complete record
///
/// Beans prices move independently of conflict, and the strict level keeps
/// the unit on the not-cointegrated path for any draw.
#[test]
fn test_non_cointegrated_unit_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.cointegration.significance = 1e-6;
    let results = Pipeline::new(config)
        .unwrap()
        .run(&independent_rows("Beans (white)", "South", 60, 22))
        .unwrap();

    assert_eq!(results.summary.total_datasets, 1);
    assert_eq!(results.summary.successful_ecm_estimations, 0);
    assert!(results.ecm_results.is_empty());
    let skip = &results.summary.skipped[0];
    assert_eq!(skip.stage, "cointegration");
    assert_eq!(skip.category, None);

    let beans = results.consolidated.get("Beans (white)", "South").unwrap();
    assert!(beans.skip_reason.as_deref().unwrap().starts_with("cointegration"));
    assert!(beans.stationarity_results.is_some());
    let coint = beans.cointegration_results.as_ref().unwrap();
    assert!(!coint.engle_granger.cointegrated);
    assert_eq!(coint.aligned_observations, 60);

    let ecm = &beans.ecm_results;
    assert_eq!(ecm.commodity, "Beans (white)");
    assert_eq!(ecm.optimal_lags, 0);
    assert!(!ecm.lag_clamped);
    assert!(ecm.speed_of_adjustment.is_empty());
    assert!(ecm.cointegration_vector.is_empty());
    assert!(ecm.residuals.is_empty() && ecm.fitted_values.is_empty());
    assert!(ecm.fit_metrics.aic.is_none());
    assert!(ecm.fit_metrics.log_likelihood.is_none());
    assert_eq!(ecm.regression.coint_rank, 0);
    assert_eq!(ecm.regression.k_ar_diff, 0);
    assert!(ecm.regression.llf.is_none());

    assert!(beans.irfs.impulse_response.irf.is_empty());
    assert!(beans.fevds.forecast_error_variance_decomposition.is_empty());
    assert!(beans.diagnostics.report.jarque_bera_pvalue.is_none());
    assert!(beans.granger_causality.is_empty());
}

/// Test scenario: rerunning on identical input gives byte-identical files
#[test]
fn test_rerun_is_byte_identical() {
    let rows = scenario();
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let mut config = test_config(first.path());
    config.diagnostics.irf_bootstrap_reps = 20;
    Pipeline::new(config.clone())
        .unwrap()
        .run(&rows)
        .unwrap()
        .write_all(first.path())
        .unwrap();

    config.output.output_dir = second.path().to_path_buf();
    config.parallel = !config.parallel;
    Pipeline::new(config)
        .unwrap()
        .run(&rows)
        .unwrap()
        .write_all(second.path())
        .unwrap();

    for name in [
        CONSOLIDATED_FILE,
        SUMMARY_FILE,
        ECM_RESULTS_FILE,
        DIAGNOSTICS_FILE,
        STATIONARITY_FILE,
        COINTEGRATION_FILE,
    ] {
        let a = std::fs::read(first.path().join(name)).unwrap();
        let b = std::fs::read(second.path().join(name)).unwrap();
        assert!(a == b, "{} differs between runs", name);
    }
}

/// Test scenario: required keys survive a write/read round trip
#[test]
fn test_required_keys_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    Pipeline::new(test_config(dir.path()))
        .unwrap()
        .run(&scenario())
        .unwrap()
        .write_all(dir.path())
        .unwrap();

    let consolidated = read_json(dir.path(), CONSOLIDATED_FILE);
    let mut units = 0;
    for regimes in consolidated.as_object().unwrap().values() {
        for record in regimes.as_object().unwrap().values() {
            units += 1;
            for field in [
                "ecm_results",
                "diagnostics",
                "summaries",
                "irfs",
                "fevds",
                "stationarity_results",
                "cointegration_results",
                "granger_causality",
            ] {
                assert!(record.get(field).is_some(), "missing {}", field);
            }
            let ecm = &record["ecm_results"];
            for field in [
                "coefficients",
                "speed_of_adjustment",
                "cointegration_vector",
                "short_run_coefficients",
                "granger_causality",
                "optimal_lags",
                "fit_metrics",
                "residuals",
                "fitted_values",
                "regression",
            ] {
                assert!(ecm.get(field).is_some(), "ecm_results missing {}", field);
            }
            for field in ["AIC", "BIC", "HQIC", "Log_Likelihood"] {
                assert!(ecm["fit_metrics"].get(field).is_some());
            }
        }
    }
    assert_eq!(units, 7);

    let text = std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
    assert!(text.contains("\n    \"schema_version\""));
    let summary: SummaryReport = serde_json::from_str(&text).unwrap();
    assert_eq!(summary.timestamp, "20240101_120000");
    assert_eq!(summary.datasets.len(), summary.successful_ecm_estimations);

    let stationarity = read_json(dir.path(), STATIONARITY_FILE);
    let wheat = &stationarity["Wheat_Unified"];
    for variable in ["usdprice", "conflict_intensity"] {
        let transformation = wheat[variable]["transformation"].as_str().unwrap();
        assert!(["original", "diff", "log", "log_diff"].contains(&transformation));
        let results = wheat[variable]["results"].as_object().unwrap();
        assert!(results.contains_key("original"));
        for candidate in results.values() {
            assert!(candidate["ADF"].get("p-value").is_some());
            assert!(candidate["KPSS"].get("Stationary").is_some());
        }
    }

    let cointegration = read_json(dir.path(), COINTEGRATION_FILE);
    let cv = &cointegration["Wheat_Unified"]["engle_granger"]["critical_values"];
    assert!(cv.get("1%").is_some() && cv.get("5%").is_some() && cv.get("10%").is_some());
}

/// Test scenario: CSV input through `run_file`
#[test]
fn test_csv_input_via_run_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("panel.csv");
    let mut writer = csv::Writer::from_path(&input).unwrap();
    for row in cointegrated_rows("Wheat", "Unified", 40, 1) {
        writer.serialize(row).unwrap();
    }
    writer.flush().unwrap();

    let out = dir.path().join("out");
    let results = Pipeline::new(test_config(&out)).unwrap().run_file(&input).unwrap();
    assert_eq!(results.summary.total_datasets, 1);
    assert!(out.join(CONSOLIDATED_FILE).exists());
    assert!(results.consolidated.get("Wheat", "Unified").is_some());
}
