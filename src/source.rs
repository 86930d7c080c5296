//a Imports
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{CatalogError, Result};
use crate::{CelestialPoint, StarRecord};

//a CancelFlag
//tp CancelFlag
/// Cooperative cancellation signal for a running query
///
/// Cloned into query parameters and polled between chunk scans (not
/// between records, to bound the polling overhead). A cancelled query
/// returns [CatalogError::Cancelled] and is not counted in the
/// statistics.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

//ip CancelFlag
impl CancelFlag {
    //cp new
    pub fn new() -> Self {
        Self::default()
    }

    //mp cancel
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    //mp is_cancelled
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

//a Query parameters
//tp ConeParams
/// Parameters of a cone search
#[derive(Debug, Clone, Default)]
pub struct ConeParams {
    /// Cone centre on the sky
    pub center: CelestialPoint,
    /// Angular radius in degrees, > 0
    pub radius: f64,
    /// Keep records with `g_mag >= min_magnitude`
    pub min_magnitude: Option<f32>,
    /// Keep records with `g_mag <= max_magnitude`
    pub max_magnitude: Option<f32>,
    /// Stop after this many matches; no ordering is promised
    pub limit: Option<usize>,
    /// Wall-clock deadline; exceeding it yields a partial result
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelFlag>,
}

//ip ConeParams
impl ConeParams {
    //cp new
    pub fn new(ra_center: f64, dec_center: f64, radius: f64) -> Self {
        Self {
            center: CelestialPoint::new(ra_center, dec_center),
            radius,
            ..Self::default()
        }
    }

    //mp validate
    pub fn validate(&self) -> Result<()> {
        if !(self.radius > 0.0) || !self.radius.is_finite() {
            return Err(CatalogError::InvalidParams {
                reason: format!("cone radius must be positive, got {}", self.radius),
            });
        }
        if let (Some(lo), Some(hi)) = (self.min_magnitude, self.max_magnitude) {
            if lo > hi {
                return Err(CatalogError::InvalidParams {
                    reason: format!("magnitude window [{lo}, {hi}] is empty"),
                });
            }
        }
        Ok(())
    }
}

//tp CorridorParams
/// Parameters of a corridor search around a polyline path
///
/// Used for asteroid-occultation prediction: the path is the
/// predicted track, the width the tube half-width.
#[derive(Debug, Clone)]
pub struct CorridorParams {
    /// Path waypoints, at least two
    pub path: Vec<CelestialPoint>,
    /// Tube half-width in degrees, > 0
    pub width: f64,
    pub max_magnitude: Option<f32>,
    /// Hard cap on returned records
    pub max_results: usize,
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelFlag>,
}

//ip CorridorParams
impl CorridorParams {
    /// Default result cap
    pub const DEFAULT_MAX_RESULTS: usize = 1_000_000;

    //cp new
    pub fn new(path: Vec<CelestialPoint>, width: f64) -> Self {
        Self {
            path,
            width,
            max_magnitude: None,
            max_results: Self::DEFAULT_MAX_RESULTS,
            deadline: None,
            cancel: None,
        }
    }

    //mp validate
    pub fn validate(&self) -> Result<()> {
        if self.path.len() < 2 {
            return Err(CatalogError::InvalidParams {
                reason: format!("corridor path needs >= 2 points, got {}", self.path.len()),
            });
        }
        if !(self.width > 0.0) || !self.width.is_finite() {
            return Err(CatalogError::InvalidParams {
                reason: format!("corridor width must be positive, got {}", self.width),
            });
        }
        Ok(())
    }
}

//a QueryResult
//tp QueryResult
/// The records matched by a query, plus its completion status
///
/// `incomplete` is set when chunks had to be skipped over read errors
/// or the deadline expired; the pixels whose chunks failed are listed
/// in `failed_pixels` so a caller can narrow a retry. Partial sky
/// coverage beats total failure for occultation work.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub stars: Vec<StarRecord>,
    pub incomplete: bool,
    pub failed_pixels: Vec<u32>,
}

//a Info and statistics
//tp CatalogInfo
/// Static facts about an open catalog
#[derive(Debug, Clone, Serialize)]
pub struct CatalogInfo {
    pub catalog_name: String,
    pub version: u32,
    pub total_stars: u64,
    pub magnitude_limit: f64,
    pub is_online: bool,
}

//tp CatalogStatistics
/// Aggregated runtime statistics of an open catalog
///
/// `average_query_time_ms` is the exact arithmetic mean over counted
/// queries (cancelled queries are excluded); `cache_hit_rate` is a
/// percentage over every chunk fetch since the catalog was opened.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStatistics {
    pub total_queries: u64,
    pub average_query_time_ms: f64,
    pub total_stars_returned: u64,
    pub cache_hit_rate: f64,
    pub memory_used_mb: f64,
    pub total_stars: u64,
    pub catalog_name: String,
    pub version: u32,
    pub magnitude_limit: f64,
    pub is_online: bool,
}

//tp QueryCounters
/// Atomic counters behind [CatalogStatistics]
#[derive(Debug, Default)]
pub(crate) struct QueryCounters {
    queries: AtomicU64,
    total_micros: AtomicU64,
    stars_returned: AtomicU64,
}

//ip QueryCounters
impl QueryCounters {
    //mp record
    pub(crate) fn record(&self, elapsed: Duration, returned: usize) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.stars_returned
            .fetch_add(returned as u64, Ordering::Relaxed);
    }

    //ap total_queries
    pub(crate) fn total_queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    //ap average_ms
    pub(crate) fn average_ms(&self) -> f64 {
        let queries = self.queries.load(Ordering::Relaxed);
        if queries == 0 {
            return 0.0;
        }
        self.total_micros.load(Ordering::Relaxed) as f64 / 1000.0 / queries as f64
    }

    //ap total_stars_returned
    pub(crate) fn total_stars_returned(&self) -> u64 {
        self.stars_returned.load(Ordering::Relaxed)
    }
}

//a Magnitude filter
//fp magnitude_in_window
/// Magnitude-window predicate; a NaN magnitude never passes an active
/// bound (absent photometry cannot satisfy a filter)
pub(crate) fn magnitude_in_window(g_mag: f32, min: Option<f32>, max: Option<f32>) -> bool {
    if let Some(lo) = min {
        if !(g_mag >= lo) {
            return false;
        }
    }
    if let Some(hi) = max {
        if !(g_mag <= hi) {
            return false;
        }
    }
    true
}

//a CatalogSource
//tp CatalogSource
/// Capability set every catalog variant provides
///
/// The multifile v2 engine and the legacy single-file reader both
/// implement this; the facade only ever talks through it, so a new
/// format slots in without touching the facade.
pub trait CatalogSource: Send + Sync {
    /// All records within `radius` degrees of the cone centre
    fn query_cone(&self, params: &ConeParams) -> Result<QueryResult>;

    /// All records within `width` degrees of the polyline path
    fn query_corridor(&self, params: &CorridorParams) -> Result<QueryResult>;

    /// Linear-scan lookup by source id; O(total_stars), meant for
    /// debugging. Spatial queries are the supported access path
    fn query_by_source_id(&self, source_id: u64) -> Result<Option<StarRecord>>;

    fn info(&self) -> CatalogInfo;

    fn statistics(&self) -> CatalogStatistics;

    /// Drain in-flight queries and release resources
    fn shutdown(&self);
}

//a Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_window_semantics() {
        assert!(magnitude_in_window(10.0, None, None));
        assert!(magnitude_in_window(10.0, Some(5.0), Some(15.0)));
        assert!(!magnitude_in_window(4.0, Some(5.0), None));
        assert!(!magnitude_in_window(16.0, None, Some(15.0)));
        assert!(magnitude_in_window(f32::NAN, None, None));
        assert!(!magnitude_in_window(f32::NAN, None, Some(15.0)));
        assert!(!magnitude_in_window(f32::NAN, Some(5.0), None));
    }

    #[test]
    fn cone_params_validation() {
        assert!(ConeParams::new(10.0, 20.0, 0.5).validate().is_ok());
        assert!(ConeParams::new(10.0, 20.0, 0.0).validate().is_err());
        assert!(ConeParams::new(10.0, 20.0, -1.0).validate().is_err());
        let mut p = ConeParams::new(10.0, 20.0, 1.0);
        p.min_magnitude = Some(12.0);
        p.max_magnitude = Some(8.0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn corridor_params_validation() {
        let path = vec![CelestialPoint::new(0.0, 0.0), CelestialPoint::new(1.0, 0.0)];
        assert!(CorridorParams::new(path.clone(), 0.1).validate().is_ok());
        assert!(CorridorParams::new(path[..1].to_vec(), 0.1)
            .validate()
            .is_err());
        assert!(CorridorParams::new(path, 0.0).validate().is_err());
    }

    #[test]
    fn counters_compute_exact_mean() {
        let counters = QueryCounters::default();
        counters.record(Duration::from_millis(10), 3);
        counters.record(Duration::from_millis(30), 7);
        assert_eq!(counters.total_queries(), 2);
        assert_eq!(counters.total_stars_returned(), 10);
        assert!((counters.average_ms() - 20.0).abs() < 1e-9);
    }
}
