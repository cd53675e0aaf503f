//! # Analysis Configuration
//!
//! Configuration for a batch run: the unit gate, the commodity and regime
//! enumerations, and one sub-configuration per pipeline stage. A configuration
//! is built once, validated, and then handed to
//! [`Pipeline::new`](crate::pipeline::Pipeline::new).

use crate::errors::{validate_parameter, EcmAnalysisError, EcmResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Commodities tracked by the price panel.
pub const DEFAULT_COMMODITIES: [&str; 17] = [
    "Beans (kidney red)",
    "Beans (white)",
    "Eggs",
    "Fuel (diesel)",
    "Fuel (gas)",
    "Fuel (petrol-gasoline)",
    "Lentils",
    "Livestock (sheep, two-year-old male)",
    "Oil (vegetable)",
    "Onions",
    "Peas (yellow, split)",
    "Rice (imported)",
    "Salt",
    "Sugar",
    "Tomatoes",
    "Wheat flour",
    "Wheat",
];

/// Exchange-rate regimes produced by the upstream clustering step.
pub const DEFAULT_REGIMES: [&str; 3] = ["North", "South", "Unified"];

/// Minimum rows a unit needs before any test is attempted.
pub const MIN_OBSERVATIONS: usize = 30;
/// Hard cap on the VECM lag order.
pub const ECM_LAGS: usize = 2;
/// Search ceiling for lag selection.
pub const COINTEGRATION_MAX_LAGS: usize = 12;

/// Top-level configuration for a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Units with fewer rows are skipped entirely
    pub min_observations: usize,
    /// Accepted commodity names (empty accepts every commodity)
    pub commodities: Vec<String>,
    /// Accepted regime names (empty accepts every regime)
    pub regimes: Vec<String>,
    /// Run units on the rayon pool when the `parallel` feature is enabled
    pub parallel: bool,
    /// Stationarity cascade settings
    pub stationarity: StationarityConfig,
    /// Engle-Granger settings
    pub cointegration: CointegrationConfig,
    /// VECM settings
    pub ecm: EcmConfig,
    /// Residual diagnostics, Granger, IRF and FEVD settings
    pub diagnostics: DiagnosticsConfig,
    /// Spatial weights settings
    pub spatial: SpatialConfig,
    /// Output location and metadata
    pub output: OutputConfig,
}

/// Significance levels for the ADF/KPSS cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationarityConfig {
    /// ADF rejects the unit root when p is below this level
    pub adf_significance: f64,
    /// KPSS keeps stationarity when p is above this level
    pub kpss_significance: f64,
}

/// Engle-Granger test settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CointegrationConfig {
    /// `cointegrated` is true when p is below this level
    pub significance: f64,
    /// Upper bound on the residual ADF lag search
    pub max_lags: usize,
}

/// Lag search and cap for the error correction model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcmConfig {
    /// Hard cap on the usable lag order (lags in differences)
    pub ecm_lags: usize,
    /// Ceiling for the AIC lag-order search
    pub max_lags: usize,
}

/// Settings for the diagnostic suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Lags for the ARCH-LM test
    pub arch_lags: usize,
    /// Lags for ACF/PACF
    pub acf_lags: usize,
    /// Upper bound on Granger causality lags
    pub granger_max_lags: usize,
    /// IRF/FEVD horizon in steps
    pub irf_horizon: usize,
    /// Residual bootstrap replications for IRF bands (0 disables bands)
    pub irf_bootstrap_reps: usize,
    /// Two-sided significance of the IRF bands
    pub irf_significance: f64,
    /// Seed for the bootstrap generator
    pub seed: u64,
    /// Jarque-Bera p-value above which a unit counts as passing
    pub normality_pass_level: f64,
}

/// KNN spatial weights settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Neighbours per region on the first attempt
    pub initial_k: usize,
    /// Give up densifying beyond this many neighbours
    pub max_k: usize,
    /// Distance floor in kilometres for coincident regions
    pub min_distance_km: f64,
}

/// Output directory and report metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving every JSON/CSV artifact
    pub output_dir: PathBuf,
    /// Fixed report timestamp; the current local time is used when absent
    pub timestamp: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl Default for StationarityConfig {
    fn default() -> Self {
        Self {
            adf_significance: 0.05,
            kpss_significance: 0.05,
        }
    }
}

impl Default for CointegrationConfig {
    fn default() -> Self {
        Self {
            significance: 0.05,
            max_lags: COINTEGRATION_MAX_LAGS,
        }
    }
}

impl Default for EcmConfig {
    fn default() -> Self {
        Self {
            ecm_lags: ECM_LAGS,
            max_lags: COINTEGRATION_MAX_LAGS,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            arch_lags: 12,
            acf_lags: 20,
            granger_max_lags: COINTEGRATION_MAX_LAGS,
            irf_horizon: 10,
            irf_bootstrap_reps: 200,
            irf_significance: 0.05,
            seed: 42,
            normality_pass_level: 0.05,
        }
    }
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            initial_k: 5,
            max_k: 20,
            min_distance_km: 0.001,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            timestamp: None,
        }
    }
}

impl AnalysisConfig {
    /// Batch defaults: every commodity and regime, bootstrap IRF bands.
    pub fn standard() -> Self {
        Self {
            min_observations: MIN_OBSERVATIONS,
            commodities: DEFAULT_COMMODITIES.iter().map(|s| s.to_string()).collect(),
            regimes: DEFAULT_REGIMES.iter().map(|s| s.to_string()).collect(),
            parallel: true,
            stationarity: StationarityConfig::default(),
            cointegration: CointegrationConfig::default(),
            ecm: EcmConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            spatial: SpatialConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Same gates as [`standard`](Self::standard) but without IRF bootstrap bands.
    pub fn light() -> Self {
        let mut config = Self::standard();
        config.diagnostics.irf_bootstrap_reps = 0;
        config
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> EcmResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| EcmAnalysisError::FatalConfiguration {
            reason: format!("cannot read configuration {}: {}", path.display(), e),
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| EcmAnalysisError::FatalConfiguration {
                reason: format!("malformed configuration {}: {}", path.display(), e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a run.
    pub fn validate(&self) -> EcmResult<()> {
        let fatal = |reason: String| Err(EcmAnalysisError::FatalConfiguration { reason });

        if self.min_observations < 2 {
            return fatal(format!(
                "min_observations must be at least 2, got {}",
                self.min_observations
            ));
        }
        if self.ecm.ecm_lags == 0 {
            return fatal("ecm_lags must be at least 1".to_string());
        }
        if self.ecm.max_lags == 0 {
            return fatal("max_lags must be at least 1".to_string());
        }
        for (name, level) in [
            ("adf_significance", self.stationarity.adf_significance),
            ("kpss_significance", self.stationarity.kpss_significance),
            ("cointegration.significance", self.cointegration.significance),
            ("irf_significance", self.diagnostics.irf_significance),
            ("normality_pass_level", self.diagnostics.normality_pass_level),
        ] {
            validate_parameter(level, f64::EPSILON, 1.0 - f64::EPSILON, name)
                .map_err(|e| EcmAnalysisError::FatalConfiguration { reason: e.to_string() })?;
        }
        if self.diagnostics.irf_horizon == 0 {
            return fatal("irf_horizon must be at least 1".to_string());
        }
        if self.spatial.initial_k == 0 || self.spatial.max_k < self.spatial.initial_k {
            return fatal(format!(
                "spatial k range invalid: initial_k={}, max_k={}",
                self.spatial.initial_k, self.spatial.max_k
            ));
        }
        if self.output.output_dir.as_os_str().is_empty() {
            return fatal("output_dir must not be empty".to_string());
        }
        Ok(())
    }

    /// True when `commodity` passes the commodity filter.
    pub fn accepts_commodity(&self, commodity: &str) -> bool {
        self.commodities.is_empty() || self.commodities.iter().any(|c| c == commodity)
    }

    /// True when `regime` passes the regime filter.
    pub fn accepts_regime(&self, regime: &str) -> bool {
        self.regimes.is_empty() || self.regimes.iter().any(|r| r == regime)
    }
}
