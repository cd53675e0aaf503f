//! # Analysis Results Structures
//!
//! Result records for every pipeline stage, the consolidated
//! `commodity → regime → record` document and the cross-unit summary report,
//! together with the JSON writers that put them on disk.
//!
//! Every record has a structural default so that a unit which passed the
//! observation gate always carries a complete set of fields, even when a
//! later stage failed.

use crate::cointegration::CointegrationResult;
use crate::diagnostics::{DiagnosticOutcome, DiagnosticsReport, GrangerByLag, ImpulseResponse};
use crate::errors::{EcmAnalysisError, EcmResult, ErrorCategory};
use crate::linear_algebra::matrix_to_rows;
use crate::panel::AnalysisUnit;
use crate::stationarity::StationarityResult;
use crate::vecm::{EcmModel, FitMetrics};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Version of the output layout written to `summary_report.json`.
pub const SCHEMA_VERSION: &str = "1.0";

/// Consolidated results file name.
pub const CONSOLIDATED_FILE: &str = "ecm_analysis_results.json";
/// Summary report file name.
pub const SUMMARY_FILE: &str = "summary_report.json";
/// Flat ECM records file name.
pub const ECM_RESULTS_FILE: &str = "ecm_results.json";
/// Flat diagnostics file name.
pub const DIAGNOSTICS_FILE: &str = "ecm_diagnostics.json";
/// Stationarity results file name.
pub const STATIONARITY_FILE: &str = "stationarity_results.json";
/// Cointegration results file name.
pub const COINTEGRATION_FILE: &str = "cointegration_results.json";

/// Estimated VECM coefficient blocks as nested row lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcmCoefficients {
    /// Loadings, K × 1
    pub alpha: Vec<Vec<f64>>,
    /// Cointegrating vector, K × 1
    pub beta: Vec<Vec<f64>>,
    /// Short-run coefficients, K × K·p
    pub gamma: Vec<Vec<f64>>,
    /// Constant inside the cointegration relation
    #[serde(rename = "const")]
    pub constant: Vec<Vec<f64>>,
    /// Unrestricted deterministic terms (none when the constant is restricted to the relation)
    pub det_coef: Vec<Vec<f64>>,
}

/// Raw regression block of an ECM record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionBlock {
    /// Coefficient blocks
    pub coefficients: EcmCoefficients,
    /// Cointegration rank (0 when no model was fitted)
    pub coint_rank: usize,
    /// Lags in differences (0 when no model was fitted)
    pub k_ar_diff: usize,
    /// Residual covariance
    pub sigma_u: Vec<Vec<f64>>,
    /// Log-likelihood
    pub llf: Option<f64>,
}

/// Per-unit ECM record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EcmResultsRecord {
    /// Commodity name
    pub commodity: String,
    /// Exchange-rate regime
    pub regime: String,
    /// Coefficient blocks
    pub coefficients: EcmCoefficients,
    /// Same as `coefficients.alpha`
    pub speed_of_adjustment: Vec<Vec<f64>>,
    /// Same as `coefficients.beta`
    pub cointegration_vector: Vec<Vec<f64>>,
    /// Same as `coefficients.gamma`
    pub short_run_coefficients: Vec<Vec<f64>>,
    /// Granger results keyed by causing variable
    pub granger_causality: BTreeMap<String, GrangerByLag>,
    /// Lag order used by the fit
    pub optimal_lags: usize,
    /// Lag order preferred by AIC before clamping
    #[serde(default)]
    pub aic_selected_lags: usize,
    /// True when the AIC choice was clamped
    #[serde(default)]
    pub lag_clamped: bool,
    /// Information criteria
    pub fit_metrics: FitMetrics,
    /// Residuals, T × K
    pub residuals: Vec<Vec<f64>>,
    /// Fitted levels, T × K
    pub fitted_values: Vec<Vec<f64>>,
    /// Raw regression block
    pub regression: RegressionBlock,
}

impl EcmResultsRecord {
    /// Structural default for a unit without a fitted model.
    pub fn empty(unit: &AnalysisUnit) -> Self {
        Self {
            commodity: unit.commodity.clone(),
            regime: unit.regime.clone(),
            ..Default::default()
        }
    }

    /// Record for a fitted model.
    pub fn from_model(
        unit: &AnalysisUnit,
        model: &EcmModel,
        granger_causality: BTreeMap<String, GrangerByLag>,
    ) -> Self {
        let coefficients = EcmCoefficients {
            alpha: matrix_to_rows(&model.alpha),
            beta: matrix_to_rows(&model.beta),
            gamma: matrix_to_rows(&model.gamma),
            constant: matrix_to_rows(&model.const_coint),
            det_coef: Vec::new(),
        };
        Self {
            commodity: unit.commodity.clone(),
            regime: unit.regime.clone(),
            speed_of_adjustment: coefficients.alpha.clone(),
            cointegration_vector: coefficients.beta.clone(),
            short_run_coefficients: coefficients.gamma.clone(),
            granger_causality,
            optimal_lags: model.k_ar_diff,
            aic_selected_lags: model.aic_selected_lags,
            lag_clamped: model.lag_clamped,
            fit_metrics: model.fit_metrics(),
            residuals: matrix_to_rows(&model.resid),
            fitted_values: matrix_to_rows(&model.fitted_values),
            regression: RegressionBlock {
                coefficients: coefficients.clone(),
                coint_rank: model.coint_rank,
                k_ar_diff: model.k_ar_diff,
                sigma_u: matrix_to_rows(&model.sigma_u),
                llf: Some(model.llf).filter(|v| v.is_finite()),
            },
            coefficients,
        }
    }
}

/// Diagnostics of one unit, tagged with its key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsRecord {
    /// Commodity name
    pub commodity: String,
    /// Exchange-rate regime
    pub regime: String,
    /// Residual tests
    #[serde(flatten)]
    pub report: DiagnosticsReport,
}

/// Model summary text of one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Commodity name
    pub commodity: String,
    /// Exchange-rate regime
    pub regime: String,
    /// Plain-text model summary (empty without a model)
    pub summary: String,
}

/// Impulse responses of one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrfRecord {
    /// Commodity name
    pub commodity: String,
    /// Exchange-rate regime
    pub regime: String,
    /// Point responses and bands
    pub impulse_response: ImpulseResponse,
}

/// Variance decomposition of one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FevdRecord {
    /// Commodity name
    pub commodity: String,
    /// Exchange-rate regime
    pub regime: String,
    /// Variance shares per horizon step
    pub forecast_error_variance_decomposition: Vec<Vec<f64>>,
}

/// Stationarity classification of both variables of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStationarity {
    /// Price classification
    pub usdprice: StationarityResult,
    /// Conflict intensity classification
    pub conflict_intensity: StationarityResult,
}

/// A unit that did not complete the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedUnit {
    /// Commodity name
    pub commodity: String,
    /// Exchange-rate regime
    pub regime: String,
    /// Stage at which processing stopped
    pub stage: String,
    /// Failure category; `None` for a regular gate such as missing cointegration
    pub category: Option<ErrorCategory>,
    /// Human-readable reason
    pub reason: String,
}

/// Output of the estimation and diagnostic stages for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationOutcome {
    /// ECM record, Granger results included
    pub ecm: EcmResultsRecord,
    /// Model summary text
    pub summary: String,
    /// Diagnostics, IRF and FEVD
    pub diagnostics: DiagnosticOutcome,
}

impl EstimationOutcome {
    /// Collect the records of a fitted and diagnosed model.
    pub fn new(unit: &AnalysisUnit, model: &EcmModel, diagnostics: DiagnosticOutcome) -> Self {
        Self {
            ecm: EcmResultsRecord::from_model(unit, model, diagnostics.granger_causality.clone()),
            summary: model.summary_text(),
            diagnostics,
        }
    }
}

/// Everything the pipeline learned about one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutcome {
    /// Unit key
    pub unit: AnalysisUnit,
    /// False when the unit failed the observation gate
    pub attempted: bool,
    /// Stationarity stage output
    pub stationarity: Option<UnitStationarity>,
    /// Cointegration stage output
    pub cointegration: Option<CointegrationResult>,
    /// Estimation and diagnostic output
    pub estimation: Option<EstimationOutcome>,
    /// Why the unit stopped early
    pub skipped: Option<SkippedUnit>,
}

impl UnitOutcome {
    /// Empty outcome for `unit`.
    pub fn new(unit: AnalysisUnit) -> Self {
        Self {
            unit,
            attempted: false,
            stationarity: None,
            cointegration: None,
            estimation: None,
            skipped: None,
        }
    }
}

/// All records of one unit in the consolidated document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// ECM record (structural default without a model)
    pub ecm_results: EcmResultsRecord,
    /// Residual diagnostics
    pub diagnostics: DiagnosticsRecord,
    /// Model summary
    pub summaries: SummaryRecord,
    /// Impulse responses
    pub irfs: IrfRecord,
    /// Variance decomposition
    pub fevds: FevdRecord,
    /// Stationarity stage output
    pub stationarity_results: Option<UnitStationarity>,
    /// Cointegration stage output
    pub cointegration_results: Option<CointegrationResult>,
    /// Granger results keyed by causing variable
    pub granger_causality: BTreeMap<String, GrangerByLag>,
    /// Why the unit stopped early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl UnitRecord {
    /// Record with structural defaults for every stage.
    pub fn empty(unit: &AnalysisUnit) -> Self {
        let (commodity, regime) = (unit.commodity.clone(), unit.regime.clone());
        Self {
            ecm_results: EcmResultsRecord::empty(unit),
            diagnostics: DiagnosticsRecord {
                commodity: commodity.clone(),
                regime: regime.clone(),
                report: DiagnosticsReport::default(),
            },
            summaries: SummaryRecord {
                commodity: commodity.clone(),
                regime: regime.clone(),
                summary: String::new(),
            },
            irfs: IrfRecord {
                commodity: commodity.clone(),
                regime: regime.clone(),
                impulse_response: ImpulseResponse::default(),
            },
            fevds: FevdRecord {
                commodity,
                regime,
                forecast_error_variance_decomposition: Vec::new(),
            },
            stationarity_results: None,
            cointegration_results: None,
            granger_causality: BTreeMap::new(),
            skip_reason: None,
        }
    }

    /// Record for a unit outcome.
    pub fn from_outcome(outcome: &UnitOutcome) -> Self {
        let mut record = Self::empty(&outcome.unit);
        record.stationarity_results = outcome.stationarity.clone();
        record.cointegration_results = outcome.cointegration.clone();
        record.skip_reason = outcome.skipped.as_ref().map(|s| format!("{}: {}", s.stage, s.reason));

        if let Some(estimation) = &outcome.estimation {
            record.ecm_results = estimation.ecm.clone();
            record.granger_causality = estimation.diagnostics.granger_causality.clone();
            record.diagnostics.report = estimation.diagnostics.report.clone();
            record.summaries.summary = estimation.summary.clone();
            record.irfs.impulse_response = estimation.diagnostics.impulse_response.clone();
            record.fevds.forecast_error_variance_decomposition = estimation.diagnostics.fevd.clone();
        }
        record
    }
}

/// `commodity → regime → record` for every attempted unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsolidatedResults(pub BTreeMap<String, BTreeMap<String, UnitRecord>>);

impl ConsolidatedResults {
    /// Record of one unit, if present.
    pub fn get(&self, commodity: &str, regime: &str) -> Option<&UnitRecord> {
        self.0.get(commodity).and_then(|regimes| regimes.get(regime))
    }

    /// Number of unit records.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// True when no unit was attempted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Headline numbers of one estimated unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Commodity name
    pub commodity: String,
    /// Exchange-rate regime
    pub regime: String,
    /// Akaike criterion
    #[serde(rename = "AIC")]
    pub aic: Option<f64>,
    /// Schwarz criterion
    #[serde(rename = "BIC")]
    pub bic: Option<f64>,
    /// Log-likelihood
    #[serde(rename = "Log_Likelihood")]
    pub log_likelihood: Option<f64>,
    /// Ljung-Box p-value
    pub breusch_godfrey_pvalue: Option<f64>,
    /// ARCH-LM p-value
    pub arch_test_pvalue: Option<f64>,
    /// Jarque-Bera p-value
    pub jarque_bera_pvalue: Option<f64>,
    /// Breusch-Pagan p-value
    pub breusch_pagan_pvalue: Option<f64>,
    /// Durbin-Watson statistic
    pub durbin_watson_stat: Option<f64>,
    /// Granger results keyed by causing variable
    pub granger_causality_tests: BTreeMap<String, GrangerByLag>,
    /// Lag order used by the fit
    pub optimal_lags: usize,
}

/// Cross-unit summary of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Output layout version
    pub schema_version: String,
    /// Run timestamp
    pub timestamp: String,
    /// Units that passed the observation gate
    pub total_datasets: usize,
    /// Units with a fitted ECM
    pub successful_ecm_estimations: usize,
    /// Units whose Jarque-Bera p-value exceeds the pass level
    pub diagnostics_passed: usize,
    /// Units that stopped early
    pub skipped: Vec<SkippedUnit>,
    /// One entry per estimated unit
    pub datasets: Vec<DatasetSummary>,
}

/// All output documents of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResults {
    /// Consolidated per-unit document
    pub consolidated: ConsolidatedResults,
    /// Summary report
    pub summary: SummaryReport,
    /// Flat ECM records
    pub ecm_results: Vec<EcmResultsRecord>,
    /// Flat diagnostics records
    pub diagnostics: Vec<DiagnosticsRecord>,
    /// Stationarity results keyed `"{commodity}_{regime}"`
    pub stationarity: BTreeMap<String, UnitStationarity>,
    /// Cointegration results keyed `"{commodity}_{regime}"`
    pub cointegration: BTreeMap<String, CointegrationResult>,
}

impl AnalysisResults {
    /// Assemble the output documents from unit outcomes.
    ///
    /// Outcomes are processed in unit order regardless of the order given.
    pub fn assemble(outcomes: &[UnitOutcome], timestamp: String, normality_pass_level: f64) -> Self {
        let mut ordered: Vec<&UnitOutcome> = outcomes.iter().collect();
        ordered.sort_by(|a, b| a.unit.cmp(&b.unit));

        let mut consolidated = ConsolidatedResults::default();
        let mut ecm_results = Vec::new();
        let mut diagnostics = Vec::new();
        let mut stationarity = BTreeMap::new();
        let mut cointegration = BTreeMap::new();
        let mut skipped = Vec::new();
        let mut datasets = Vec::new();
        let mut total_datasets = 0;
        let mut diagnostics_passed = 0;

        for outcome in ordered {
            let unit = &outcome.unit;
            if let Some(skip) = &outcome.skipped {
                skipped.push(skip.clone());
            }
            if !outcome.attempted {
                continue;
            }
            total_datasets += 1;

            if let Some(s) = &outcome.stationarity {
                stationarity.insert(unit.key(), s.clone());
            }
            if let Some(c) = &outcome.cointegration {
                cointegration.insert(unit.key(), c.clone());
            }
            if let Some(estimation) = &outcome.estimation {
                let report = &estimation.diagnostics.report;
                if report
                    .jarque_bera_pvalue
                    .map_or(false, |p| p > normality_pass_level)
                {
                    diagnostics_passed += 1;
                }
                let metrics = estimation.ecm.fit_metrics;
                datasets.push(DatasetSummary {
                    commodity: unit.commodity.clone(),
                    regime: unit.regime.clone(),
                    aic: metrics.aic,
                    bic: metrics.bic,
                    log_likelihood: metrics.log_likelihood,
                    breusch_godfrey_pvalue: report.breusch_godfrey_pvalue,
                    arch_test_pvalue: report.arch_test_pvalue,
                    jarque_bera_pvalue: report.jarque_bera_pvalue,
                    breusch_pagan_pvalue: report.breusch_pagan_pvalue,
                    durbin_watson_stat: report.durbin_watson_stat,
                    granger_causality_tests: estimation.ecm.granger_causality.clone(),
                    optimal_lags: estimation.ecm.optimal_lags,
                });
                ecm_results.push(estimation.ecm.clone());
                diagnostics.push(DiagnosticsRecord {
                    commodity: unit.commodity.clone(),
                    regime: unit.regime.clone(),
                    report: report.clone(),
                });
            }

            consolidated
                .0
                .entry(unit.commodity.clone())
                .or_default()
                .insert(unit.regime.clone(), UnitRecord::from_outcome(outcome));
        }

        let summary = SummaryReport {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp,
            total_datasets,
            successful_ecm_estimations: ecm_results.len(),
            diagnostics_passed,
            skipped,
            datasets,
        };

        Self {
            consolidated,
            summary,
            ecm_results,
            diagnostics,
            stationarity,
            cointegration,
        }
    }

    /// Write every document into `dir`, creating it if needed.
    ///
    /// Returns the written paths in a fixed order.
    pub fn write_all(&self, dir: &Path) -> EcmResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| io_error(format!("create {}", dir.display()), e))?;

        let paths = vec![
            write_json_pretty(&dir.join(CONSOLIDATED_FILE), &self.consolidated)?,
            write_json_pretty(&dir.join(SUMMARY_FILE), &self.summary)?,
            write_json_pretty(&dir.join(ECM_RESULTS_FILE), &self.ecm_results)?,
            write_json_pretty(&dir.join(DIAGNOSTICS_FILE), &self.diagnostics)?,
            write_json_pretty(&dir.join(STATIONARITY_FILE), &self.stationarity)?,
            write_json_pretty(&dir.join(COINTEGRATION_FILE), &self.cointegration)?,
        ];
        log::info!(
            "Saved {} unit records and summary report to {}",
            self.consolidated.len(),
            dir.display()
        );
        Ok(paths)
    }
}

fn io_error(operation: String, err: std::io::Error) -> EcmAnalysisError {
    EcmAnalysisError::IoError {
        operation,
        source: Some(Arc::new(err)),
    }
}

/// Serialize `value` as JSON with 4-space indentation.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> EcmResult<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| EcmAnalysisError::SerializationError {
        format: "JSON".to_string(),
        reason: e.to_string(),
    })
}

/// Write `value` to `path` as JSON with 4-space indentation.
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> EcmResult<PathBuf> {
    let file = File::create(path).map_err(|e| io_error(format!("create {}", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    {
        let mut ser =
            serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
        value.serialize(&mut ser)?;
    }
    writer
        .flush()
        .map_err(|e| io_error(format!("write {}", path.display()), e))?;
    log::debug!("Wrote {}", path.display());
    Ok(path.to_path_buf())
}
