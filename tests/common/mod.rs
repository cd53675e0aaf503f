//! Synthetic monthly panels for the integration tests.

#![allow(dead_code)]

use conflict_ecm::{AnalysisConfig, Observation};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};

/// First day of the `i`-th month after January 2016.
pub fn month(i: usize) -> String {
    format!("{:04}-{:02}-01", 2016 + i / 12, i % 12 + 1)
}

fn row(commodity: &str, regime: &str, i: usize, price: f64, conflict: f64) -> Observation {
    Observation {
        date: month(i),
        commodity: commodity.to_string(),
        exchange_rate_regime: regime.to_string(),
        market_id: Some(format!("{}-market", regime)),
        usdprice: Some(price),
        conflict_intensity: Some(conflict),
        latitude: None,
        longitude: None,
    }
}

/// Conflict follows a drifting random walk; price is a fixed linear function
/// of conflict plus white noise, so the pair is cointegrated.
pub fn cointegrated_rows(commodity: &str, regime: &str, n: usize, seed: u64) -> Vec<Observation> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let step = Normal::new(0.3, 2.0).unwrap();
    let noise = Normal::new(0.0, 0.5).unwrap();
    let mut conflict = 20.0;
    (0..n)
        .map(|i| {
            conflict += step.sample(&mut rng);
            let price = 50.0 + 2.0 * conflict + noise.sample(&mut rng);
            row(commodity, regime, i, price, conflict)
        })
        .collect()
}

/// Two unrelated random walks.
pub fn independent_rows(commodity: &str, regime: &str, n: usize, seed: u64) -> Vec<Observation> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let step = Normal::new(0.0, 1.0).unwrap();
    let (mut price, mut conflict) = (100.0, 20.0);
    (0..n)
        .map(|i| {
            price += step.sample(&mut rng);
            conflict += step.sample(&mut rng);
            row(commodity, regime, i, price, conflict)
        })
        .collect()
}

/// Light configuration with a fixed timestamp, writing into `dir`.
pub fn test_config(dir: &std::path::Path) -> AnalysisConfig {
    let mut config = AnalysisConfig::light();
    config.output.output_dir = dir.to_path_buf();
    config.output.timestamp = Some("20240101_120000".to_string());
    config
}
