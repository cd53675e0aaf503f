//! # Batch Pipeline
//!
//! Drives every analysis unit through the same state machine:
//!
//! ```text
//! observation gate → stationarity → cointegration → alignment gate
//!                  → ECM estimation → diagnostics → records
//! ```
//!
//! A unit leaves the machine at the first stage that fails or whose gate it
//! does not pass, leaving a [`SkippedUnit`] behind. Units are independent;
//! with the `parallel` feature they run on the rayon pool and their outcomes
//! are merged sequentially, so the output does not depend on scheduling.
//! Only fatal errors abort a run.

use crate::cointegration::test_cointegration;
use crate::config::AnalysisConfig;
use crate::diagnostics::run_diagnostics;
use crate::errors::{EcmAnalysisError, EcmResult, ErrorCategory};
use crate::panel::{align_on_dates, group_by_unit, load_observations, AnalysisUnit, Observation, UnitPanel};
use crate::results::{AnalysisResults, EstimationOutcome, SkippedUnit, UnitOutcome, UnitStationarity};
use crate::stationarity::classify_series;
use crate::vecm::estimate_ecm;
use std::collections::BTreeMap;
use std::path::Path;

/// Stage names used in skip records.
pub mod stage {
    /// Unit has fewer rows than `min_observations`
    pub const OBSERVATION_GATE: &str = "observation_gate";
    /// Stationarity classification
    pub const STATIONARITY: &str = "stationarity";
    /// Engle-Granger test or its gate
    pub const COINTEGRATION: &str = "cointegration";
    /// Too few dates shared by price and conflict
    pub const ALIGNMENT: &str = "alignment";
    /// Lag selection or VECM fit
    pub const ECM_ESTIMATION: &str = "ecm_estimation";
}

/// Batch runner holding a validated configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    /// Validate `config` and build a runner.
    pub fn new(config: AnalysisConfig) -> EcmResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration in use.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Timestamp recorded in the summary report.
    pub fn timestamp(&self) -> String {
        self.config
            .output
            .timestamp
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Load the panel at `input`, run every unit and write all outputs.
    pub fn run_file(&self, input: &Path) -> EcmResult<AnalysisResults> {
        let observations = load_observations(input)?;
        let results = self.run(&observations)?;
        results.write_all(&self.config.output.output_dir)?;
        Ok(results)
    }

    /// Group `observations` into units and run them.
    pub fn run(&self, observations: &[Observation]) -> EcmResult<AnalysisResults> {
        let units = group_by_unit(observations, &self.config)?;
        log::info!("Data loaded. Number of datasets: {}", units.len());
        self.run_units(&units)
    }

    /// Run already grouped units.
    pub fn run_units(&self, units: &BTreeMap<AnalysisUnit, UnitPanel>) -> EcmResult<AnalysisResults> {
        let outcomes = self.analyze_units(units)?;

        let estimated = outcomes.iter().filter(|o| o.estimation.is_some()).count();
        let skipped = outcomes.iter().filter(|o| o.skipped.is_some()).count();
        log::info!(
            "ECM analysis finished: {} of {} units estimated, {} skipped",
            estimated,
            outcomes.len(),
            skipped
        );

        Ok(AnalysisResults::assemble(
            &outcomes,
            self.timestamp(),
            self.config.diagnostics.normality_pass_level,
        ))
    }

    fn analyze_units(&self, units: &BTreeMap<AnalysisUnit, UnitPanel>) -> EcmResult<Vec<UnitOutcome>> {
        #[cfg(feature = "parallel")]
        {
            if self.config.parallel {
                use rayon::prelude::*;

                let results: Vec<EcmResult<UnitOutcome>> = units
                    .par_iter()
                    .map(|(unit, panel)| self.analyze_unit(unit, panel))
                    .collect();
                return results.into_iter().collect();
            }
        }

        units
            .iter()
            .map(|(unit, panel)| self.analyze_unit(unit, panel))
            .collect()
    }

    /// Run one unit through the state machine.
    ///
    /// Non-fatal failures end up in the outcome's skip record; only fatal
    /// errors are returned.
    pub fn analyze_unit(&self, unit: &AnalysisUnit, panel: &UnitPanel) -> EcmResult<UnitOutcome> {
        let config = &self.config;
        let mut outcome = UnitOutcome::new(unit.clone());
        log::info!("Processing {}", unit);

        if panel.row_count < config.min_observations {
            outcome.skipped = Some(skip(
                unit,
                stage::OBSERVATION_GATE,
                Some(ErrorCategory::InsufficientData),
                format!(
                    "{} rows, at least {} required",
                    panel.row_count, config.min_observations
                ),
            ));
            return Ok(outcome);
        }
        outcome.attempted = true;

        let stationarity = classify_series(panel.price.values(), "usdprice", &config.stationarity)
            .and_then(|usdprice| {
                classify_series(panel.conflict.values(), "conflict_intensity", &config.stationarity)
                    .map(|conflict_intensity| UnitStationarity {
                        usdprice,
                        conflict_intensity,
                    })
            });
        let stationarity = match stationarity {
            Ok(s) => s,
            Err(e) => return fail(outcome, stage::STATIONARITY, e),
        };

        let cointegration = test_cointegration(
            &panel.price,
            &panel.conflict,
            stationarity.usdprice.transformation,
            stationarity.conflict_intensity.transformation,
            &config.cointegration,
        );
        outcome.stationarity = Some(stationarity);
        let cointegration = match cointegration {
            Ok(c) => c,
            Err(e) => return fail(outcome, stage::COINTEGRATION, e),
        };
        let eg = &cointegration.engle_granger;
        let gate = (!eg.cointegrated).then(|| {
            format!(
                "no cointegration (statistic {:.4}, p = {:.4})",
                eg.cointegration_statistic, eg.p_value
            )
        });
        outcome.cointegration = Some(cointegration);
        if let Some(reason) = gate {
            outcome.skipped = Some(skip(unit, stage::COINTEGRATION, None, reason));
            return Ok(outcome);
        }

        let (_, price, conflict) = align_on_dates(&panel.price, &panel.conflict);
        if price.len() < config.min_observations {
            outcome.skipped = Some(skip(
                unit,
                stage::ALIGNMENT,
                Some(ErrorCategory::InsufficientData),
                format!(
                    "{} aligned observations, at least {} required",
                    price.len(),
                    config.min_observations
                ),
            ));
            return Ok(outcome);
        }

        let model = match estimate_ecm(&price, &conflict, &config.ecm) {
            Ok(model) => model,
            Err(e) => return fail(outcome, stage::ECM_ESTIMATION, e),
        };
        log::info!("ECM estimated with {} lags for {}", model.k_ar_diff, unit);

        let diagnostics = run_diagnostics(&model, &price, &conflict, config.ecm.ecm_lags, &config.diagnostics);
        outcome.estimation = Some(EstimationOutcome::new(unit, &model, diagnostics));
        Ok(outcome)
    }
}

fn skip(unit: &AnalysisUnit, stage: &str, category: Option<ErrorCategory>, reason: String) -> SkippedUnit {
    log::warn!("Skipping {} at {}: {}", unit, stage, reason);
    SkippedUnit {
        commodity: unit.commodity.clone(),
        regime: unit.regime.clone(),
        stage: stage.to_string(),
        category,
        reason,
    }
}

fn fail(mut outcome: UnitOutcome, stage: &str, error: EcmAnalysisError) -> EcmResult<UnitOutcome> {
    if error.is_fatal() {
        return Err(error);
    }
    let category = Some(error.category());
    outcome.skipped = Some(skip(&outcome.unit, stage, category, error.to_string()));
    Ok(outcome)
}
