//! # Conflict ECM
//!
//! Stationarity, cointegration and vector error correction analysis of
//! commodity prices against armed-conflict intensity, run per commodity and
//! exchange-rate regime.
//!
//! Each `(commodity, regime)` unit goes through the same chain:
//!
//! 1. **Stationarity**: ADF and KPSS over original, differenced, log and
//!    log-differenced candidates; the first candidate both tests accept wins.
//! 2. **Cointegration**: Engle-Granger test of price on conflict intensity,
//!    joined on dates.
//! 3. **Estimation**: AIC lag selection and a rank-1 Johansen VECM with the
//!    constant restricted to the cointegration relation.
//! 4. **Diagnostics**: Ljung-Box, ARCH-LM, Jarque-Bera, Breusch-Pagan,
//!    Durbin-Watson, ACF/PACF, Granger causality, bootstrapped impulse
//!    responses and variance decomposition.
//!
//! A unit that fails a stage is skipped with a recorded reason; the batch
//! keeps going. KNN spatial weights between markets are available as a
//! separate step.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conflict_ecm::{AnalysisConfig, Pipeline};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = AnalysisConfig::standard();
//!     config.output.output_dir = "results/ecm".into();
//!
//!     let pipeline = Pipeline::new(config)?;
//!     let results = pipeline.run_file(Path::new("data/unified_data.json"))?;
//!
//!     println!(
//!         "{} of {} units estimated",
//!         results.summary.successful_ecm_estimations, results.summary.total_datasets
//!     );
//!     for skip in &results.summary.skipped {
//!         println!("{} / {}: {} ({})", skip.commodity, skip.regime, skip.stage, skip.reason);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! [`Pipeline`] owns the configuration and drives the per-unit state
//! machine. Every stage is also usable on its own:
//! [`classify_series`], [`engle_granger`], [`estimate_ecm`],
//! [`run_diagnostics`] and [`build_knn_weights`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod linear_algebra;
pub mod math_utils;
pub mod panel;
pub mod results;
pub mod secure_rng;

// Analysis stages
pub mod cointegration;
pub mod diagnostics;
pub mod pipeline;
pub mod spatial;
pub mod stationarity;
pub mod vecm;

pub use config::{
    AnalysisConfig, CointegrationConfig, DiagnosticsConfig, EcmConfig, OutputConfig, SpatialConfig,
    StationarityConfig,
};
pub use errors::{EcmAnalysisError, EcmResult, ErrorCategory};
pub use panel::{group_by_unit, load_observations, AnalysisUnit, Observation, ObservationSeries, UnitPanel};
pub use pipeline::Pipeline;
pub use results::{
    AnalysisResults, ConsolidatedResults, DiagnosticsRecord, EcmResultsRecord, SkippedUnit,
    SummaryReport, UnitOutcome, UnitRecord,
};

pub use cointegration::{engle_granger, test_cointegration, CointegrationResult, EngleGrangerResult};
pub use diagnostics::{
    fevd_from_ma, granger_causality, impulse_responses, run_diagnostics, DiagnosticOutcome,
    DiagnosticsReport, GrangerLagResult, ImpulseResponse,
};
pub use spatial::{build_knn_weights, haversine_km, spatial_lag, Region, SpatialWeights};
pub use stationarity::{classify_series, CriticalValues, StationarityResult, Transformation};
pub use vecm::{estimate_ecm, select_order, EcmModel, FitMetrics, LagOrderSelection};
