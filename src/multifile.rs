//! The multifile (v2) catalog engine
//!
//! A catalog directory holds `metadata.dat` (header + pixel index)
//! and `chunks/chunk_%03u.dat` record arrays. The engine owns the
//! parsed index, a bounded chunk cache and the query statistics;
//! queries stream chunk by chunk, so a corridor crossing tens of
//! degrees of sky never materialises more than one chunk of
//! candidates at a time.

//a Imports
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::angle;
use crate::chunk_cache::{ChunkCache, PinnedChunk};
use crate::error::{CatalogError, Result};
use crate::format::{self, CatalogHeader, PixelIndex};
use crate::healpix::{self, PixelSet};
use crate::record::{self, StarRecord, RECORD_SIZE};
use crate::source::{
    magnitude_in_window, CancelFlag, CatalogInfo, CatalogSource, CatalogStatistics, ConeParams,
    CorridorParams, QueryCounters, QueryResult,
};
use crate::Vec3;

//a MultifileOptions
//tp MultifileOptions
/// Tunables of a [MultifileCatalog]
#[derive(Debug, Clone)]
pub struct MultifileOptions {
    /// Maximum number of decoded chunks kept in memory
    pub max_cached_chunks: usize,
    /// How long a fetch may wait for a pinned chunk to free up before
    /// failing with [CatalogError::Busy]
    pub load_timeout: Duration,
}

//ip Default for MultifileOptions
impl Default for MultifileOptions {
    fn default() -> Self {
        Self {
            max_cached_chunks: 200,
            load_timeout: Duration::from_secs(5),
        }
    }
}

//a Engine state
//ti EngineState
/// Lifecycle of the engine; queries are accepted only in `Ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Opening,
    Ready,
    ShuttingDown,
    Closed,
}

//ti QueryGate
/// Admission control: state plus the number of in-flight queries
struct QueryGate {
    state: Mutex<(EngineState, usize)>,
    drained: Condvar,
}

//ii QueryGate
impl QueryGate {
    fn new() -> Self {
        Self {
            state: Mutex::new((EngineState::Opening, 0)),
            drained: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, (EngineState, usize)> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_ready(&self) {
        self.lock().0 = EngineState::Ready;
    }

    /// Admit a query, or refuse outside `Ready`
    fn enter(&self) -> Result<QueryPermit<'_>> {
        let mut guard = self.lock();
        if guard.0 != EngineState::Ready {
            return Err(CatalogError::NotReady);
        }
        guard.1 += 1;
        Ok(QueryPermit { gate: self })
    }

    fn is_ready(&self) -> bool {
        self.lock().0 == EngineState::Ready
    }

    /// Stop admitting queries and wait for the in-flight ones to finish
    fn drain_and_close(&self) {
        let mut guard = self.lock();
        if guard.0 == EngineState::Closed {
            return;
        }
        guard.0 = EngineState::ShuttingDown;
        while guard.1 > 0 {
            guard = self.drained.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        guard.0 = EngineState::Closed;
    }
}

//ti QueryPermit
/// RAII token for one in-flight query
struct QueryPermit<'a> {
    gate: &'a QueryGate,
}

//ii Drop for QueryPermit
impl Drop for QueryPermit<'_> {
    fn drop(&mut self) {
        let mut guard = self.gate.lock();
        guard.1 -= 1;
        if guard.1 == 0 {
            self.gate.drained.notify_all();
        }
    }
}

//a MultifileCatalog
//tp MultifileCatalog
/// An open multifile catalog
///
/// The engine exclusively owns the parsed header, the pixel index,
/// the chunk cache and the statistics counters. Query results are
/// owned copies of the matching records; nothing returned borrows
/// the engine's buffers.
pub struct MultifileCatalog {
    dir: PathBuf,
    header: CatalogHeader,
    index: PixelIndex,
    cache: Arc<ChunkCache>,
    gate: QueryGate,
    counters: QueryCounters,
}

//ip MultifileCatalog
impl MultifileCatalog {
    //cp open
    /// Open and validate a catalog directory
    ///
    /// A missing directory is [CatalogError::InitFailed]; a directory
    /// whose metadata fails validation is
    /// [CatalogError::CorruptCatalog]. Either way no engine instance
    /// is left behind.
    pub fn open<P: Into<PathBuf>>(dir: P, options: MultifileOptions) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(CatalogError::init(format!(
                "catalog directory {} does not exist",
                dir.display()
            )));
        }
        let metadata = format::metadata_path(&dir);
        if !metadata.is_file() {
            return Err(CatalogError::init(format!(
                "no metadata.dat in {}",
                dir.display()
            )));
        }
        let (header, index) = format::read_metadata(&metadata)?;
        let chunks_dir = dir.join("chunks");
        if header.total_chunks > 0 && !chunks_dir.is_dir() {
            return Err(CatalogError::init(format!(
                "no chunks directory in {}",
                dir.display()
            )));
        }

        info!(
            "opened catalog {}: {} stars, {} chunks, {} indexed pixels, G <= {}",
            dir.display(),
            header.total_stars,
            header.total_chunks,
            index.num_entries(),
            header.mag_limit
        );

        let cache = ChunkCache::new(options.max_cached_chunks, options.load_timeout);
        let engine = Self {
            dir,
            header,
            index,
            cache,
            gate: QueryGate::new(),
            counters: QueryCounters::default(),
        };
        engine.gate.set_ready();
        Ok(engine)
    }

    //ap header
    pub fn header(&self) -> &CatalogHeader {
        &self.header
    }

    //mi fetch_chunk
    /// Fetch a chunk through the cache, loading and verifying it on a
    /// miss
    fn fetch_chunk(&self, chunk_id: u32) -> Result<PinnedChunk> {
        self.cache.fetch(chunk_id, || self.load_chunk(chunk_id))
    }

    //mi load_chunk
    /// Read a chunk file from disk and check it against the header and
    /// the pixel invariant
    fn load_chunk(&self, chunk_id: u32) -> Result<Vec<StarRecord>> {
        let path = format::chunk_path(&self.dir, chunk_id);
        let bytes = std::fs::read(&path).map_err(|e| CatalogError::io(&path, e))?;
        let records = record::decode_chunk(&bytes)?;

        let expected = self.header.records_in_chunk(chunk_id);
        if records.len() as u64 != expected {
            return Err(CatalogError::corrupt(format!(
                "chunk {chunk_id} holds {} records, header implies {expected}",
                records.len()
            )));
        }
        // healpix_pixel is the indexing key; a record whose stored
        // pixel disagrees with its coordinates would be unreachable
        // or wrongly reachable, so it is corruption, not a skip
        for r in &records {
            let computed = healpix::radec2pix(r.ra, r.dec);
            if computed != r.healpix_pixel {
                return Err(CatalogError::corrupt(format!(
                    "source {} in chunk {chunk_id} stores pixel {}, coordinates give {computed}",
                    r.source_id, r.healpix_pixel
                )));
            }
        }
        debug!("loaded chunk {chunk_id} ({} records)", records.len());
        Ok(records)
    }

    //mi chunks_for_pixels
    /// Deduplicated, ascending chunk ids covering a pixel set
    fn chunks_for_pixels(&self, pixels: &PixelSet) -> Vec<u32> {
        let mut chunks = BTreeSet::new();
        for pixel in pixels.iter() {
            chunks.extend(self.index.chunks_for_pixel(pixel).iter().copied());
        }
        chunks.into_iter().collect()
    }

    //mi pixels_of_chunk
    /// The query pixels that resolve to a given chunk (for the failed
    /// pixel report when the chunk cannot be read)
    fn pixels_of_chunk(&self, chunk_id: u32, pixels: &PixelSet) -> Vec<u32> {
        pixels
            .iter()
            .filter(|p| self.index.chunks_for_pixel(*p).contains(&chunk_id))
            .collect()
    }

    //mi scan_region
    /// Shared kernel of the cone and corridor queries
    ///
    /// Visits the candidate chunks in ascending order exactly once,
    /// applies `matches` to every record whose pixel is in the
    /// region's pixel set, deduplicates on source id and honours the
    /// cap, the deadline and the cancellation flag. Chunk read
    /// failures skip the chunk and flag the result incomplete.
    fn scan_region<M>(
        &self,
        pixels: &PixelSet,
        matches: M,
        cap: Option<usize>,
        deadline: Option<Instant>,
        cancel: Option<&CancelFlag>,
    ) -> Result<QueryResult>
    where
        M: Fn(&StarRecord) -> bool,
    {
        let chunk_ids = self.chunks_for_pixels(pixels);
        debug!(
            "region covers {} pixels in {} chunks",
            pixels.len(),
            chunk_ids.len()
        );

        let mut out = QueryResult::default();
        let mut seen: HashSet<u64> = HashSet::new();
        'chunks: for &chunk_id in &chunk_ids {
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

            let chunk = match self.fetch_chunk(chunk_id) {
                Ok(chunk) => chunk,
                Err(CatalogError::Io { path, source }) => {
                    warn!("skipping unreadable chunk {chunk_id} ({}): {source}", path.display());
                    out.incomplete = true;
                    out.failed_pixels
                        .extend(self.pixels_of_chunk(chunk_id, pixels));
                    continue;
                }
                Err(e) => return Err(e),
            };

            for r in chunk.records() {
                if !pixels.contains(r.healpix_pixel) {
                    continue;
                }
                if !matches(r) {
                    continue;
                }
                // Each record lives in exactly one chunk and each chunk
                // is visited once, so this is a defensive check only
                if !seen.insert(r.source_id) {
                    continue;
                }
                out.stars.push(*r);
                if let Some(cap) = cap {
                    if out.stars.len() >= cap {
                        break 'chunks;
                    }
                }
            }
        }
        Ok(out)
    }
}

//ip CatalogSource for MultifileCatalog
impl CatalogSource for MultifileCatalog {
    //mp query_cone
    fn query_cone(&self, params: &ConeParams) -> Result<QueryResult> {
        params.validate()?;
        let _permit = self.gate.enter()?;
        let started = Instant::now();

        let pixels = healpix::query_disc(params.center, params.radius);
        let center = params.center.unit_vector();
        let radius = params.radius;
        let (min_mag, max_mag) = (params.min_magnitude, params.max_magnitude);

        let result = self.scan_region(
            &pixels,
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
        let _permit = self.gate.enter()?;
        let started = Instant::now();

        let pixels = healpix::query_polyline(&params.path, params.width);
        let path: Vec<Vec3> = params.path.iter().map(|p| p.unit_vector()).collect();
        let width = params.width;
        let max_mag = params.max_magnitude;

        let result = self.scan_region(
            &pixels,
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
        let _permit = self.gate.enter()?;
        for chunk_id in 0..self.header.total_chunks as u32 {
            let chunk = self.fetch_chunk(chunk_id)?;
            if let Some(r) = chunk.records().iter().find(|r| r.source_id == source_id) {
                return Ok(Some(*r));
            }
        }
        Ok(None)
    }

    //mp info
    fn info(&self) -> CatalogInfo {
        CatalogInfo {
            catalog_name: self.header.source_catalog.clone(),
            version: format::FORMAT_VERSION,
            total_stars: self.header.total_stars,
            magnitude_limit: self.header.mag_limit,
            is_online: self.gate.is_ready(),
        }
    }

    //mp statistics
    fn statistics(&self) -> CatalogStatistics {
        let chunk_bytes =
            self.cache.len() as u64 * self.header.stars_per_chunk as u64 * RECORD_SIZE as u64;
        let index_bytes = self.index.entries_byte_size() + self.index.chunk_lists_byte_size();
        CatalogStatistics {
            total_queries: self.counters.total_queries(),
            average_query_time_ms: self.counters.average_ms(),
            total_stars_returned: self.counters.total_stars_returned(),
            cache_hit_rate: self.cache.hit_rate(),
            memory_used_mb: (chunk_bytes + index_bytes) as f64 / (1024.0 * 1024.0),
            total_stars: self.header.total_stars,
            catalog_name: self.header.source_catalog.clone(),
            version: format::FORMAT_VERSION,
            magnitude_limit: self.header.mag_limit,
            is_online: self.gate.is_ready(),
        }
    }

    //mp shutdown
    fn shutdown(&self) {
        self.gate.drain_and_close();
        self.cache.clear();
        info!("catalog {} closed", self.dir.display());
    }
}

//ip Drop for MultifileCatalog
impl Drop for MultifileCatalog {
    fn drop(&mut self) {
        self.gate.drain_and_close();
    }
}
