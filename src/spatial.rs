//! K-nearest-neighbour spatial weights between market regions.
//!
//! Each region is linked to its `k` nearest regions by great-circle
//! distance. The neighbour relation is treated as undirected when checking
//! connectivity; while it splits the regions into several components, `k`
//! grows by one up to `max_k`. Weights are inverse distances, row
//! standardised.

use crate::config::SpatialConfig;
use crate::errors::{EcmAnalysisError, EcmResult};
use crate::math_utils::float_total_cmp;
use crate::panel::Observation;
use crate::results::write_json_pretty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A region centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Region identifier
    pub id: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl Region {
    /// Create a region.
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
        }
    }
}

/// Row-standardised KNN weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialWeights {
    /// Neighbour count per region in the final graph
    pub k: usize,
    /// True when the neighbour graph is a single component
    pub connected: bool,
    /// Number of connected components
    pub components: usize,
    /// Neighbours of each region, nearest first, with weights summing to 1
    pub neighbors: BTreeMap<String, Vec<(String, f64)>>,
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = phi2 - phi1;
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

fn validate_regions(regions: &[Region]) -> EcmResult<()> {
    if regions.len() < 2 {
        return Err(EcmAnalysisError::InsufficientData {
            required: 2,
            actual: regions.len(),
        });
    }
    let mut seen = std::collections::BTreeSet::new();
    for r in regions {
        if !seen.insert(r.id.as_str()) {
            return Err(EcmAnalysisError::DataQuality {
                context: "spatial weights".to_string(),
                reason: format!("duplicate region '{}'", r.id),
            });
        }
        if !(r.latitude.is_finite() && r.longitude.is_finite())
            || r.latitude.abs() > 90.0
            || r.longitude.abs() > 180.0
        {
            return Err(EcmAnalysisError::DataQuality {
                context: "spatial weights".to_string(),
                reason: format!(
                    "invalid coordinates for '{}': ({}, {})",
                    r.id, r.latitude, r.longitude
                ),
            });
        }
    }
    Ok(())
}

fn count_components(order: &[Vec<usize>], k: usize) -> usize {
    let n = order.len();
    let mut set = DisjointSet::new(n);
    for (i, nearest) in order.iter().enumerate() {
        for &j in nearest.iter().take(k) {
            set.union(i, j);
        }
    }
    (0..n).filter(|&i| set.find(i) == i).count()
}

/// Build KNN weights, densifying until the graph is connected.
///
/// Regions are processed in identifier order, and ties in distance are
/// broken by identifier, so the result does not depend on input order.
/// When `max_k` is reached with the graph still split, the weights are
/// returned with `connected = false` and a warning is logged.
pub fn build_knn_weights(regions: &[Region], config: &SpatialConfig) -> EcmResult<SpatialWeights> {
    validate_regions(regions)?;
    if config.initial_k == 0 || config.max_k < config.initial_k {
        return Err(EcmAnalysisError::InvalidParameter {
            parameter: "initial_k".to_string(),
            value: config.initial_k as f64,
            constraint: format!("1 <= initial_k <= max_k ({})", config.max_k),
        });
    }

    let mut sorted: Vec<&Region> = regions.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    let n = sorted.len();

    let distance: Vec<Vec<f64>> = sorted
        .iter()
        .map(|a| {
            sorted
                .iter()
                .map(|b| haversine_km(a.latitude, a.longitude, b.latitude, b.longitude))
                .collect()
        })
        .collect();

    // Every other region, nearest first
    let order: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            let mut others: Vec<usize> = (0..n).filter(|&j| j != i).collect();
            others.sort_by(|&a, &b| float_total_cmp(&distance[i][a], &distance[i][b]).then(a.cmp(&b)));
            others
        })
        .collect();

    let ceiling = config.max_k.min(n - 1);
    let mut k = config.initial_k.min(n - 1);
    let mut components = count_components(&order, k);
    while components > 1 && k < ceiling {
        k += 1;
        components = count_components(&order, k);
        log::debug!("KNN graph with k={} has {} components", k, components);
    }

    let connected = components == 1;
    if !connected {
        log::warn!(
            "Spatial weights still have {} components at k={}; returning a disconnected graph",
            components,
            k
        );
    } else if k > config.initial_k {
        log::info!("Spatial weights connected after densifying to k={}", k);
    }

    let floor = config.min_distance_km.max(f64::MIN_POSITIVE);
    let neighbors = (0..n)
        .map(|i| {
            let raw: Vec<(usize, f64)> = order[i]
                .iter()
                .take(k)
                .map(|&j| (j, 1.0 / distance[i][j].max(floor)))
                .collect();
            let total: f64 = raw.iter().map(|(_, w)| w).sum();
            let row = raw
                .into_iter()
                .map(|(j, w)| (sorted[j].id.clone(), w / total))
                .collect();
            (sorted[i].id.clone(), row)
        })
        .collect();

    Ok(SpatialWeights {
        k,
        connected,
        components,
        neighbors,
    })
}

/// Weighted average of neighbour values for every region.
pub fn spatial_lag(weights: &SpatialWeights, values: &BTreeMap<String, f64>) -> EcmResult<BTreeMap<String, f64>> {
    weights
        .neighbors
        .iter()
        .map(|(region, row)| {
            let lag = row.iter().try_fold(0.0, |acc, (neighbor, w)| {
                values
                    .get(neighbor)
                    .map(|v| acc + w * v)
                    .ok_or_else(|| EcmAnalysisError::DataQuality {
                        context: "spatial lag".to_string(),
                        reason: format!("no value for region '{}'", neighbor),
                    })
            })?;
            Ok((region.clone(), lag))
        })
        .collect()
}

impl SpatialWeights {
    /// `{region: {neighbor: weight}}` view.
    pub fn to_json(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        self.neighbors
            .iter()
            .map(|(region, row)| (region.clone(), row.iter().cloned().collect()))
            .collect()
    }

    /// Write [`to_json`](Self::to_json) to `path`.
    pub fn write_json(&self, path: &Path) -> EcmResult<()> {
        write_json_pretty(path, &self.to_json())?;
        log::info!("Spatial weights saved to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct FlowRow<'a> {
    source: &'a str,
    source_lat: f64,
    source_lng: f64,
    target: &'a str,
    target_lat: f64,
    target_lng: f64,
    weight: f64,
}

/// Write one CSV row per neighbour link.
pub fn write_flow_map_csv(weights: &SpatialWeights, regions: &[Region], path: &Path) -> EcmResult<()> {
    let by_id: BTreeMap<&str, &Region> = regions.iter().map(|r| (r.id.as_str(), r)).collect();
    let lookup = |id: &str| {
        by_id.get(id).copied().ok_or_else(|| EcmAnalysisError::DataQuality {
            context: "flow map".to_string(),
            reason: format!("unknown region '{}'", id),
        })
    };

    let mut writer = csv::Writer::from_path(path)?;
    for (source, row) in &weights.neighbors {
        let s = lookup(source)?;
        for (target, weight) in row {
            let t = lookup(target)?;
            writer.serialize(FlowRow {
                source,
                source_lat: s.latitude,
                source_lng: s.longitude,
                target,
                target_lat: t.latitude,
                target_lng: t.longitude,
                weight: *weight,
            })?;
        }
    }
    writer.flush()?;
    log::info!("Flow map saved to {}", path.display());
    Ok(())
}

/// Region centroids from panel rows: mean coordinates per market.
///
/// Rows without a market identifier or without both coordinates are ignored.
pub fn regions_from_observations(observations: &[Observation]) -> Vec<Region> {
    let mut sums: BTreeMap<&str, (f64, f64, usize)> = BTreeMap::new();
    for row in observations {
        if let (Some(id), Some(lat), Some(lon)) = (row.market_id.as_deref(), row.latitude, row.longitude) {
            if lat.is_finite() && lon.is_finite() {
                let entry = sums.entry(id).or_insert((0.0, 0.0, 0));
                entry.0 += lat;
                entry.1 += lon;
                entry.2 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(id, (lat, lon, count))| Region::new(id, lat / count as f64, lon / count as f64))
        .collect()
}
