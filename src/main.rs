//! Batch ECM analysis of commodity prices against conflict intensity.
//!
//! Usage:
//!   conflict-ecm --input <FILE> [OPTIONS]
//!
//! Options:
//!   --input <FILE>             Panel rows, JSON array or CSV
//!   --output-dir <DIR>         Directory for result files (default: results)
//!   --config <FILE>            JSON configuration; flags below override it
//!   --min-observations <N>     Rows a unit needs before testing
//!   --ecm-lags <N>             Cap on the VECM lag order
//!   --max-lags <N>             Ceiling of the lag-order search
//!   --timestamp <TEXT>         Fixed report timestamp
//!   --spatial                  Also write KNN spatial weights and a flow map
//!   -v, --verbose              Debug logging
//!
//! Example:
//!   conflict-ecm --input data/unified_data.json --output-dir results/ecm --spatial

use clap::Parser;
use conflict_ecm::spatial::{build_knn_weights, regions_from_observations, write_flow_map_csv};
use conflict_ecm::{load_observations, AnalysisConfig, EcmResult, Pipeline};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "conflict-ecm")]
#[command(version, about = "Stationarity, cointegration and ECM analysis per commodity and regime")]
struct Cli {
    /// Panel rows (JSON array or CSV)
    #[arg(long)]
    input: PathBuf,

    /// Directory for result files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rows a unit needs before any test is run
    #[arg(long)]
    min_observations: Option<usize>,

    /// Cap on the VECM lag order
    #[arg(long)]
    ecm_lags: Option<usize>,

    /// Ceiling of the lag-order search
    #[arg(long)]
    max_lags: Option<usize>,

    /// Fixed report timestamp (current time when omitted)
    #[arg(long)]
    timestamp: Option<String>,

    /// Also write spatial_weights.json and flow_map.csv
    #[arg(long)]
    spatial: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn analysis_config(&self) -> EcmResult<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)?,
            None => AnalysisConfig::standard(),
        };
        if let Some(dir) = &self.output_dir {
            config.output.output_dir = dir.clone();
        }
        if let Some(n) = self.min_observations {
            config.min_observations = n;
        }
        if let Some(lags) = self.ecm_lags {
            config.ecm.ecm_lags = lags;
        }
        if let Some(lags) = self.max_lags {
            config.ecm.max_lags = lags;
            config.cointegration.max_lags = lags;
        }
        if let Some(ts) = &self.timestamp {
            config.output.timestamp = Some(ts.clone());
        }
        Ok(config)
    }
}

fn run(cli: &Cli) -> EcmResult<()> {
    let pipeline = Pipeline::new(cli.analysis_config()?)?;
    let observations = load_observations(&cli.input)?;

    let results = pipeline.run(&observations)?;
    let output_dir = &pipeline.config().output.output_dir;
    results.write_all(output_dir)?;

    if cli.spatial {
        let regions = regions_from_observations(&observations);
        let weights = build_knn_weights(&regions, &pipeline.config().spatial)?;
        weights.write_json(&output_dir.join("spatial_weights.json"))?;
        write_flow_map_csv(&weights, &regions, &output_dir.join("flow_map.csv"))?;
    }

    let summary = &results.summary;
    log::info!(
        "{} datasets attempted, {} ECMs estimated, {} passed normality, {} skipped",
        summary.total_datasets,
        summary.successful_ecm_estimations,
        summary.diagnostics_passed,
        summary.skipped.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("ECM analysis aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
