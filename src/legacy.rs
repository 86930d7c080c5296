//! The legacy single-file (v1) catalog
//!
//! A v1 catalog is one gzip-compressed stream: a short header followed
//! by the full record array. There is no spatial index; the whole
//! catalog is decompressed into memory on open and every query is a
//! full scan, which is what the format always was: one giant chunk.
//! Supported read-only for backward compatibility.

//a Imports
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;

use crate::angle;
use crate::error::{CatalogError, Result};
use crate::healpix;
use crate::record::StarRecord;
use crate::source::{
    magnitude_in_window, CatalogInfo, CatalogSource, CatalogStatistics, ConeParams,
    CorridorParams, QueryCounters, QueryResult,
};
use crate::Vec3;
use crate::RECORD_SIZE;

//a Constants
/// Magic bytes of the v1 stream (after decompression)
pub const V1_MAGIC: [u8; 8] = *b"GAIA18V1";

const V1_VERSION: u32 = 1;
const SOURCE_FIELD_SIZE: usize = 32;

/// Poll the cancellation flag and deadline every this many records
const SCAN_POLL_INTERVAL: usize = 65_536;

//a LegacyCatalog
//tp LegacyCatalog
/// An open v1 catalog, fully resident in memory
pub struct LegacyCatalog {
    path: PathBuf,
    mag_limit: f64,
    source_catalog: String,
    records: Vec<StarRecord>,
    online: AtomicBool,
    counters: QueryCounters,
}

//ip LegacyCatalog
impl LegacyCatalog {
    //cp open
    /// Decompress and load a v1 catalog file
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| {
            CatalogError::init(format!("cannot open v1 catalog {}: {e}", path.display()))
        })?;
        let mut r = BufReader::new(GzDecoder::new(BufReader::new(file)));

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)
            .map_err(|e| CatalogError::corrupt(format!("short v1 header: {e}")))?;
        if magic != V1_MAGIC {
            return Err(CatalogError::corrupt(format!(
                "bad v1 magic {:?}",
                String::from_utf8_lossy(&magic)
            )));
        }
        let version = r
            .read_u32::<LittleEndian>()
            .map_err(|e| CatalogError::corrupt(format!("short v1 header: {e}")))?;
        if version != V1_VERSION {
            return Err(CatalogError::corrupt(format!(
                "unsupported v1 version {version}"
            )));
        }
        let total_stars = r
            .read_u64::<LittleEndian>()
            .map_err(|e| CatalogError::corrupt(format!("short v1 header: {e}")))?;
        let mag_limit = r
            .read_f64::<LittleEndian>()
            .map_err(|e| CatalogError::corrupt(format!("short v1 header: {e}")))?;
        let mut source = [0u8; SOURCE_FIELD_SIZE];
        r.read_exact(&mut source)
            .map_err(|e| CatalogError::corrupt(format!("short v1 header: {e}")))?;
        let source_catalog = String::from_utf8_lossy(&source)
            .trim_end_matches('\0')
            .to_string();

        let mut records = Vec::with_capacity(total_stars.min(1 << 28) as usize);
        for i in 0..total_stars {
            let record = StarRecord::read_from(&mut r).map_err(|e| {
                CatalogError::corrupt(format!("v1 stream truncated at record {i}: {e}"))
            })?;
            let computed = healpix::radec2pix(record.ra, record.dec);
            if computed != record.healpix_pixel {
                return Err(CatalogError::corrupt(format!(
                    "source {} stores pixel {}, coordinates give {computed}",
                    record.source_id, record.healpix_pixel
                )));
            }
            records.push(record);
        }

        info!(
            "loaded v1 catalog {}: {} stars, G <= {mag_limit}",
            path.display(),
            records.len()
        );
        Ok(Self {
            path,
            mag_limit,
            source_catalog,
            records,
            online: AtomicBool::new(true),
            counters: QueryCounters::default(),
        })
    }

    //mi scan
    /// Full scan with the given record predicate
    fn scan<M>(
        &self,
        matches: M,
        cap: Option<usize>,
        deadline: Option<Instant>,
        cancel: Option<&crate::CancelFlag>,
    ) -> Result<QueryResult>
    where
        M: Fn(&StarRecord) -> bool,
    {
        if !self.online.load(Ordering::Acquire) {
            return Err(CatalogError::NotReady);
        }
        let mut out = QueryResult::default();
        for (i, r) in self.records.iter().enumerate() {
            if i % SCAN_POLL_INTERVAL == 0 {
                if let Some(flag) = cancel {
                    if flag.is_cancelled() {
                        return Err(CatalogError::Cancelled);
                    }
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        out.incomplete = true;
                        break;
                    }
                }
            }
            if !matches(r) {
                continue;
            }
            out.stars.push(*r);
            if let Some(cap) = cap {
                if out.stars.len() >= cap {
                    break;
                }
            }
        }
        Ok(out)
    }
}

//ip CatalogSource for LegacyCatalog
impl CatalogSource for LegacyCatalog {
    //mp query_cone
    fn query_cone(&self, params: &ConeParams) -> Result<QueryResult> {
        params.validate()?;
        let started = Instant::now();
        let center = params.center.unit_vector();
        let radius = params.radius;
        let (min_mag, max_mag) = (params.min_magnitude, params.max_magnitude);
        let result = self.scan(
            |r| {
                magnitude_in_window(r.g_mag, min_mag, max_mag)
                    && angle::angular_distance_vec(&center, &r.position().unit_vector()) <= radius
            },
            params.limit,
            params.deadline,
            params.cancel.as_ref(),
        )?;
        self.counters.record(started.elapsed(), result.stars.len());
        Ok(result)
    }

    //mp query_corridor
    fn query_corridor(&self, params: &CorridorParams) -> Result<QueryResult> {
        params.validate()?;
        let started = Instant::now();
        let path: Vec<Vec3> = params.path.iter().map(|p| p.unit_vector()).collect();
        let width = params.width;
        let max_mag = params.max_magnitude;
        let result = self.scan(
            |r| {
                magnitude_in_window(r.g_mag, None, max_mag)
                    && angle::polyline_distance_vec(&path, &r.position().unit_vector()) <= width
            },
            Some(params.max_results),
            params.deadline,
            params.cancel.as_ref(),
        )?;
        self.counters.record(started.elapsed(), result.stars.len());
        Ok(result)
    }

    //mp query_by_source_id
    fn query_by_source_id(&self, source_id: u64) -> Result<Option<StarRecord>> {
        if !self.online.load(Ordering::Acquire) {
            return Err(CatalogError::NotReady);
        }
        Ok(self
            .records
            .iter()
            .find(|r| r.source_id == source_id)
            .copied())
    }

    //mp info
    fn info(&self) -> CatalogInfo {
        CatalogInfo {
            catalog_name: self.source_catalog.clone(),
            version: V1_VERSION,
            total_stars: self.records.len() as u64,
            magnitude_limit: self.mag_limit,
            is_online: self.online.load(Ordering::Acquire),
        }
    }

    //mp statistics
    fn statistics(&self) -> CatalogStatistics {
        CatalogStatistics {
            total_queries: self.counters.total_queries(),
            average_query_time_ms: self.counters.average_ms(),
            total_stars_returned: self.counters.total_stars_returned(),
            // Everything is resident; there is no cache to hit or miss
            cache_hit_rate: 100.0,
            memory_used_mb: (self.records.len() * RECORD_SIZE) as f64 / (1024.0 * 1024.0),
            total_stars: self.records.len() as u64,
            catalog_name: self.source_catalog.clone(),
            version: V1_VERSION,
            magnitude_limit: self.mag_limit,
            is_online: self.online.load(Ordering::Acquire),
        }
    }

    //mp shutdown
    fn shutdown(&self) {
        self.online.store(false, Ordering::Release);
        info!("v1 catalog {} closed", self.path.display());
    }
}

//a Writing
//fp write_catalog
/// Write records as a v1 single-file catalog (used by tests and by
/// migration tooling; the engine itself never writes)
pub fn write_catalog(
    path: &Path,
    records: &[StarRecord],
    mag_limit: f64,
    source_catalog: &str,
) -> Result<()> {
    let file = File::create(path).map_err(|e| CatalogError::io(path, e))?;
    let mut w = GzEncoder::new(BufWriter::new(file), Compression::default());

    let io_err = |e: std::io::Error| CatalogError::io(path, e);
    w.write_all(&V1_MAGIC).map_err(io_err)?;
    w.write_u32::<LittleEndian>(V1_VERSION).map_err(io_err)?;
    w.write_u64::<LittleEndian>(records.len() as u64)
        .map_err(io_err)?;
    w.write_f64::<LittleEndian>(mag_limit).map_err(io_err)?;
    let mut source = [0u8; SOURCE_FIELD_SIZE];
    let bytes = source_catalog.as_bytes();
    let n = bytes.len().min(SOURCE_FIELD_SIZE - 1);
    source[..n].copy_from_slice(&bytes[..n]);
    w.write_all(&source).map_err(io_err)?;
    for record in records {
        record.write_to(&mut w).map_err(io_err)?;
    }
    let mut inner = w.finish().map_err(io_err)?;
    inner.flush().map_err(io_err)?;
    Ok(())
}
