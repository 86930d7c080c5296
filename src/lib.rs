/*!
# Gaia mag-18 catalog engine

On-disk, read-only spatial query engine for large star catalogs bounded
by an apparent-magnitude cutoff (G <= 18). The catalog is stored as a
directory of fixed-size binary chunks plus a HEALPix pixel -> chunk
index; queries translate a region of sky (a cone, or a corridor around
an asteroid path) into a pixel set, visit each candidate chunk once
through a bounded LRU cache, and trim with exact angular predicates.

The [UnifiedCatalog] facade is the front door: it selects a catalog
variant from a JSON configuration blob and can be used either as a
process-wide singleton or as a plain owned object.

 */

pub type Vec3 = geo_nd::FArray<f64, 3>;

mod error;
pub use error::{CatalogError, Result};

pub mod angle;
pub use angle::CelestialPoint;

pub mod healpix;
pub use healpix::PixelSet;

mod record;
pub use record::{StarRecord, RECORD_SIZE};

pub mod format;
pub use format::{CatalogHeader, PixelIndex, PixelIndexEntry};

mod chunk_cache;
pub use chunk_cache::{ChunkCache, PinnedChunk};

mod source;
pub use source::{
    CancelFlag, CatalogInfo, CatalogSource, CatalogStatistics, ConeParams, CorridorParams,
    QueryResult,
};

mod multifile;
pub use multifile::{MultifileCatalog, MultifileOptions};

pub mod legacy;
pub use legacy::LegacyCatalog;

mod unified;
pub use unified::{CatalogConfig, CatalogType, UnifiedCatalog};

pub mod rebuild;
