//! The unified catalog facade
//!
//! Host programs hand over one JSON configuration blob; the facade
//! picks the catalog variant, opens it, and exposes the shared
//! capability set. It can be used as a plain owned object
//! ([UnifiedCatalog::open], the right thing for tests and for hosts
//! with several catalogs) or as the process-wide singleton
//! ([UnifiedCatalog::initialize] / [UnifiedCatalog::instance] /
//! [UnifiedCatalog::shutdown]) that exists so every call site in a
//! host program shares one cache and one set of statistics.

//a Imports
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, LevelFilter};
use serde::Deserialize;

use crate::error::{CatalogError, Result};
use crate::legacy::LegacyCatalog;
use crate::multifile::{MultifileCatalog, MultifileOptions};
use crate::source::{
    CatalogInfo, CatalogSource, CatalogStatistics, ConeParams, CorridorParams, QueryResult,
};
use crate::StarRecord;

//a Configuration
//tp CatalogType
/// Which on-disk format to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CatalogType {
    #[serde(rename = "multifile_v2")]
    MultifileV2,
    #[serde(rename = "single_v1")]
    SingleV1,
}

//tp CatalogConfig
/// The facade's configuration blob
///
/// ```json
/// {
///   "catalog_type": "multifile_v2",
///   "multifile_directory": "/home/ioc/.catalog/gaia_mag18_v2_multifile",
///   "max_cached_chunks": 200,
///   "log_level": "info"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub catalog_type: CatalogType,
    /// Catalog directory for `multifile_v2`
    #[serde(default)]
    pub multifile_directory: Option<PathBuf>,
    /// Catalog file for `single_v1`
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default = "default_max_cached_chunks")]
    pub max_cached_chunks: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound in milliseconds on waiting for a pinned chunk slot
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

//fi default_max_cached_chunks
fn default_max_cached_chunks() -> usize {
    200
}

//fi default_log_level
fn default_log_level() -> String {
    "info".to_string()
}

//fi default_load_timeout_ms
fn default_load_timeout_ms() -> u64 {
    5_000
}

//ip CatalogConfig
impl CatalogConfig {
    //cp from_json
    /// Parse the JSON blob
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CatalogError::Config {
            reason: e.to_string(),
        })
    }

    //mp level_filter
    /// The configured log level; unknown names fall back to `info`
    pub fn level_filter(&self) -> LevelFilter {
        match self.log_level.as_str() {
            "debug" => LevelFilter::Debug,
            "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        }
    }
}

//a UnifiedCatalog
//tp UnifiedCatalog
/// Front door over the catalog variants
pub struct UnifiedCatalog {
    source: Box<dyn CatalogSource>,
}

//ip UnifiedCatalog
impl UnifiedCatalog {
    //cp open
    /// Open the catalog a configuration describes (non-singleton)
    pub fn open(config: CatalogConfig) -> Result<Self> {
        log::set_max_level(config.level_filter());
        let source: Box<dyn CatalogSource> = match config.catalog_type {
            CatalogType::MultifileV2 => {
                let dir = config.multifile_directory.as_ref().ok_or_else(|| {
                    CatalogError::Config {
                        reason: "multifile_v2 requires \"multifile_directory\"".to_string(),
                    }
                })?;
                let options = MultifileOptions {
                    max_cached_chunks: config.max_cached_chunks,
                    load_timeout: Duration::from_millis(config.load_timeout_ms),
                };
                Box::new(MultifileCatalog::open(dir.clone(), options)?)
            }
            CatalogType::SingleV1 => {
                let path = config.file_path.as_ref().ok_or_else(|| CatalogError::Config {
                    reason: "single_v1 requires \"file_path\"".to_string(),
                })?;
                Box::new(LegacyCatalog::open(path.clone())?)
            }
        };
        Ok(Self { source })
    }

    //cp open_json
    /// [UnifiedCatalog::open] straight from a JSON blob
    pub fn open_json(json: &str) -> Result<Self> {
        Self::open(CatalogConfig::from_json(json)?)
    }

    //mp query_cone
    pub fn query_cone(&self, params: &ConeParams) -> Result<QueryResult> {
        self.source.query_cone(params)
    }

    //mp query_corridor
    pub fn query_corridor(&self, params: &CorridorParams) -> Result<QueryResult> {
        self.source.query_corridor(params)
    }

    //mp query_by_source_id
    pub fn query_by_source_id(&self, source_id: u64) -> Result<Option<StarRecord>> {
        self.source.query_by_source_id(source_id)
    }

    //mp info
    pub fn info(&self) -> CatalogInfo {
        self.source.info()
    }

    //mp statistics
    pub fn statistics(&self) -> CatalogStatistics {
        self.source.statistics()
    }

    //mp close
    /// Drain queries and take the catalog offline
    pub fn close(&self) {
        self.source.shutdown();
    }
}

//a Process singleton
static INSTANCE: Mutex<Option<Arc<UnifiedCatalog>>> = Mutex::new(None);

//ip UnifiedCatalog (singleton)
impl UnifiedCatalog {
    //fp initialize
    /// Create the process-wide instance from a JSON configuration
    ///
    /// Fails with [CatalogError::InitFailed] if an instance already
    /// exists; a failed open leaves no instance behind.
    pub fn initialize(json: &str) -> Result<()> {
        let mut slot = INSTANCE.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(CatalogError::init(
                "already initialised; call shutdown() first",
            ));
        }
        let catalog = Self::open_json(json)?;
        *slot = Some(Arc::new(catalog));
        info!("unified catalog initialised");
        Ok(())
    }

    //fp instance
    /// The process-wide instance, if initialised
    pub fn instance() -> Result<Arc<UnifiedCatalog>> {
        INSTANCE
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(CatalogError::NotReady)
    }

    //fp shutdown
    /// Tear down the process-wide instance, draining active queries
    pub fn shutdown() -> Result<()> {
        let taken = INSTANCE
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(CatalogError::NotReady)?;
        taken.close();
        Ok(())
    }
}
