//! Panel input and grouping into analysis units.
//!
//! The input panel is a flat table of market-level monthly rows. Rows are
//! grouped by `(commodity, exchange_rate_regime)`; each group becomes one
//! [`AnalysisUnit`] whose price and conflict columns are collapsed into
//! date-indexed [`ObservationSeries`].

use crate::config::AnalysisConfig;
use crate::errors::{EcmAnalysisError, EcmResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// One input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// ISO date, monthly granularity
    pub date: String,
    /// Commodity name
    pub commodity: String,
    /// Exchange-rate regime label
    pub exchange_rate_regime: String,
    /// Market or region identifier
    #[serde(default, alias = "region_id")]
    pub market_id: Option<String>,
    /// Price in US dollars
    #[serde(default)]
    pub usdprice: Option<f64>,
    /// Population-weighted conflict intensity index
    #[serde(default)]
    pub conflict_intensity: Option<f64>,
    /// WGS84 latitude
    #[serde(default)]
    pub latitude: Option<f64>,
    /// WGS84 longitude
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Parse a panel date.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM` (first of the month) and ISO timestamps,
/// whose time part is discarded.
pub fn parse_date(s: &str) -> EcmResult<NaiveDate> {
    let s = s.trim();
    let day_part = s.get(..10).filter(|_| s.len() > 10).unwrap_or(s);
    if let Ok(d) = NaiveDate::parse_from_str(day_part, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
        return Ok(d);
    }
    Err(EcmAnalysisError::DataQuality {
        context: "date".to_string(),
        reason: format!("invalid date '{}', expected YYYY-MM-DD or YYYY-MM", s),
    })
}

/// Load panel rows from a JSON array or a CSV file, chosen by extension.
///
/// A missing file, an unknown extension or a schema mismatch aborts the run.
pub fn load_observations(path: &Path) -> EcmResult<Vec<Observation>> {
    let file = File::open(path).map_err(|e| EcmAnalysisError::FatalConfiguration {
        reason: format!("cannot open input '{}': {}", path.display(), e),
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let rows = match extension.as_deref() {
        Some("json") => serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            EcmAnalysisError::FatalConfiguration {
                reason: format!("malformed JSON panel '{}': {}", path.display(), e),
            }
        })?,
        Some("csv") => {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_reader(file);
            reader
                .deserialize()
                .enumerate()
                .map(|(idx, row)| {
                    row.map_err(|e| EcmAnalysisError::FatalConfiguration {
                        // +2: header line and 1-based numbering
                        reason: format!("malformed CSV panel '{}' at line {}: {}", path.display(), idx + 2, e),
                    })
                })
                .collect::<EcmResult<Vec<Observation>>>()?
        }
        _ => {
            return Err(EcmAnalysisError::FatalConfiguration {
                reason: format!("unsupported input format '{}', expected .json or .csv", path.display()),
            })
        }
    };

    log::info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Key of one independent pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnalysisUnit {
    /// Commodity name
    pub commodity: String,
    /// Exchange-rate regime
    pub regime: String,
}

impl AnalysisUnit {
    /// Create a unit key.
    pub fn new(commodity: impl Into<String>, regime: impl Into<String>) -> Self {
        Self {
            commodity: commodity.into(),
            regime: regime.into(),
        }
    }

    /// Flat key used by the per-stage result files.
    pub fn key(&self) -> String {
        format!("{}_{}", self.commodity, self.regime)
    }
}

impl std::fmt::Display for AnalysisUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in {} regime", self.commodity, self.regime)
    }
}

/// Date-indexed series with strictly increasing dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ObservationSeries {
    /// Build from unordered pairs; values sharing a date are averaged.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        for (date, value) in pairs {
            let entry = buckets.entry(date).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
        let (dates, values) = buckets
            .into_iter()
            .map(|(date, (sum, count))| (date, sum / count as f64))
            .unzip();
        Self { dates, values }
    }

    /// Dates in increasing order.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Values aligned with [`dates`](Self::dates).
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of distinct dates.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the series has no observations.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Price and conflict series of one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitPanel {
    /// Rows before date aggregation
    pub row_count: usize,
    /// Mean price per date
    pub price: ObservationSeries,
    /// Mean conflict intensity per date
    pub conflict: ObservationSeries,
}

/// Inner join of two series on their dates.
///
/// Returns `(dates, left values, right values)` for dates present in both.
pub fn align_on_dates(
    left: &ObservationSeries,
    right: &ObservationSeries,
) -> (Vec<NaiveDate>, Vec<f64>, Vec<f64>) {
    let mut dates = Vec::new();
    let mut a = Vec::new();
    let mut b = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match left.dates[i].cmp(&right.dates[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dates.push(left.dates[i]);
                a.push(left.values[i]);
                b.push(right.values[j]);
                i += 1;
                j += 1;
            }
        }
    }
    (dates, a, b)
}

/// Split the panel into analysis units.
///
/// Rows outside the configured commodity and regime lists are dropped. A row
/// with an unparseable date makes the whole panel unusable and is fatal.
pub fn group_by_unit(
    observations: &[Observation],
    config: &AnalysisConfig,
) -> EcmResult<BTreeMap<AnalysisUnit, UnitPanel>> {
    let mut pairs: BTreeMap<AnalysisUnit, (usize, Vec<(NaiveDate, f64)>, Vec<(NaiveDate, f64)>)> =
        BTreeMap::new();
    let mut filtered = 0usize;

    for (idx, row) in observations.iter().enumerate() {
        if !config.accepts_commodity(&row.commodity) || !config.accepts_regime(&row.exchange_rate_regime) {
            filtered += 1;
            continue;
        }
        let date = parse_date(&row.date).map_err(|e| EcmAnalysisError::FatalConfiguration {
            reason: format!("row {}: {}", idx, e),
        })?;
        let entry = pairs
            .entry(AnalysisUnit::new(&row.commodity, &row.exchange_rate_regime))
            .or_default();
        entry.0 += 1;
        if let Some(price) = row.usdprice {
            entry.1.push((date, price));
        }
        if let Some(conflict) = row.conflict_intensity {
            entry.2.push((date, conflict));
        }
    }

    if filtered > 0 {
        log::debug!("Dropped {} rows outside the configured commodities/regimes", filtered);
    }

    let units: BTreeMap<AnalysisUnit, UnitPanel> = pairs
        .into_iter()
        .map(|(unit, (row_count, price, conflict))| {
            (
                unit,
                UnitPanel {
                    row_count,
                    price: ObservationSeries::from_pairs(price),
                    conflict: ObservationSeries::from_pairs(conflict),
                },
            )
        })
        .collect();

    log::info!("Data grouped into {} commodity/regime units", units.len());
    Ok(units)
}
