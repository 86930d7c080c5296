//! Bounded LRU cache of decoded record chunks
//!
//! Values are shared (`Arc`) decoded chunks keyed by chunk id. A fetch
//! returns a [PinnedChunk] guard; while any guard is alive the entry
//! cannot be evicted. Loading happens on the fetching thread, outside
//! the cache lock, and is single-flight: concurrent fetches of the
//! same chunk wait on the entry's readiness latch instead of reading
//! the file twice. When every cached entry is pinned, a fetch that
//! needs room blocks on a condition variable; past the configured
//! timeout it gives up with [CatalogError::Busy].

//a Imports
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;
use lru::LruCache;

use crate::error::{CatalogError, Result};
use crate::StarRecord;

//a Lock helper
//fi lock
/// Poison-tolerant mutex lock; a panicked holder cannot leave the LRU
/// metadata in a torn state because every mutation is a single call
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

//a ChunkSlot
//ti LoadFailure
/// Outcome of a failed load, kept clonable so every waiter of a
/// single-flight load can report the same error
#[derive(Clone)]
struct LoadFailure {
    corrupt: bool,
    path: PathBuf,
    message: String,
}

//ii LoadFailure
impl LoadFailure {
    fn from_error(e: &CatalogError) -> Self {
        match e {
            CatalogError::CorruptCatalog { what } => Self {
                corrupt: true,
                path: PathBuf::new(),
                message: what.clone(),
            },
            CatalogError::Io { path, source } => Self {
                corrupt: false,
                path: path.clone(),
                message: source.to_string(),
            },
            other => Self {
                corrupt: false,
                path: PathBuf::new(),
                message: other.to_string(),
            },
        }
    }

    fn to_error(&self) -> CatalogError {
        if self.corrupt {
            CatalogError::corrupt(self.message.clone())
        } else {
            CatalogError::io(
                self.path.clone(),
                std::io::Error::new(std::io::ErrorKind::Other, self.message.clone()),
            )
        }
    }
}

//ti SlotState
enum SlotState {
    Loading,
    Ready(Arc<Vec<StarRecord>>),
    Failed(LoadFailure),
}

//ti ChunkSlot
/// One cache entry: pin count plus the readiness latch the loader flips
struct ChunkSlot {
    chunk_id: u32,
    pins: AtomicUsize,
    state: Mutex<SlotState>,
    ready: Condvar,
}

//a ChunkCache
//tp ChunkCache
/// Internally synchronised LRU over decoded chunks
///
/// The LRU mutex guards only the recency metadata; it is never held
/// across disk I/O or while waiting for another thread's load.
pub struct ChunkCache {
    capacity: usize,
    pin_timeout: Duration,
    inner: Mutex<LruCache<u32, Arc<ChunkSlot>>>,
    space: Condvar,
    hits: AtomicU64,
    fetches: AtomicU64,
}

//ip ChunkCache
impl ChunkCache {
    //cp new
    /// A cache holding at most `capacity` chunks (clamped to >= 1),
    /// waiting at most `pin_timeout` for a pinned entry to free up
    pub fn new(capacity: usize, pin_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            pin_timeout,
            inner: Mutex::new(LruCache::unbounded()),
            space: Condvar::new(),
            hits: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
        })
    }

    //mp fetch
    /// Get the chunk, loading it with `load` on a miss
    ///
    /// `load` runs on the calling thread with no cache lock held.
    /// Concurrent fetches of the same chunk share one load. The
    /// returned guard pins the entry against eviction until dropped.
    pub fn fetch<F>(self: &Arc<Self>, chunk_id: u32, load: F) -> Result<PinnedChunk>
    where
        F: FnOnce() -> Result<Vec<StarRecord>>,
    {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.pin_timeout;

        let mut inner = lock(&self.inner);
        let (slot, is_loader) = loop {
            // The wait below releases the lock, so presence must be
            // re-checked on every iteration
            if let Some(slot) = inner.get(&chunk_id) {
                // Pin while still holding the cache lock so the evictor
                // cannot race us
                let slot = slot.clone();
                slot.pins.fetch_add(1, Ordering::SeqCst);
                self.hits.fetch_add(1, Ordering::Relaxed);
                break (slot, false);
            }
            if inner.len() < self.capacity {
                let slot = Arc::new(ChunkSlot {
                    chunk_id,
                    pins: AtomicUsize::new(1),
                    state: Mutex::new(SlotState::Loading),
                    ready: Condvar::new(),
                });
                inner.put(chunk_id, slot.clone());
                break (slot, true);
            }
            if let Some(victim) = Self::evictable(&inner) {
                inner.pop(&victim);
                debug!("evicted chunk {victim} from the cache");
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CatalogError::Busy);
            }
            inner = self
                .space
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        };
        drop(inner);

        if !is_loader {
            return self.wait_ready(slot);
        }

        // Miss: this thread is the single loader for the chunk
        match load() {
            Ok(records) => {
                let records = Arc::new(records);
                let mut state = lock(&slot.state);
                *state = SlotState::Ready(records.clone());
                slot.ready.notify_all();
                drop(state);
                Ok(PinnedChunk {
                    cache: self.clone(),
                    slot,
                    records,
                })
            }
            Err(e) => {
                {
                    let mut state = lock(&slot.state);
                    *state = SlotState::Failed(LoadFailure::from_error(&e));
                    slot.ready.notify_all();
                }
                // Drop the failed entry so a later fetch retries the load
                lock(&self.inner).pop(&chunk_id);
                slot.pins.fetch_sub(1, Ordering::SeqCst);
                self.space.notify_all();
                Err(e)
            }
        }
    }

    //mi wait_ready
    /// Wait on an already-pinned slot's latch; unpins on failure
    fn wait_ready(self: &Arc<Self>, slot: Arc<ChunkSlot>) -> Result<PinnedChunk> {
        let mut state = lock(&slot.state);
        loop {
            match &*state {
                SlotState::Ready(records) => {
                    let records = records.clone();
                    drop(state);
                    return Ok(PinnedChunk {
                        cache: self.clone(),
                        slot: slot.clone(),
                        records,
                    });
                }
                SlotState::Failed(failure) => {
                    let e = failure.to_error();
                    drop(state);
                    self.unpin(&slot);
                    return Err(e);
                }
                SlotState::Loading => {
                    state = slot.ready.wait(state).unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    //mi evictable
    /// Least-recently-used entry that no query is reading
    fn evictable(inner: &LruCache<u32, Arc<ChunkSlot>>) -> Option<u32> {
        inner
            .iter()
            .rev()
            .find(|(_, slot)| slot.pins.load(Ordering::SeqCst) == 0)
            .map(|(id, _)| *id)
    }

    //mi unpin
    fn unpin(&self, slot: &ChunkSlot) {
        // Decrement under the cache lock so the evictor's scan and the
        // space waiters see a consistent pin count
        let inner = lock(&self.inner);
        slot.pins.fetch_sub(1, Ordering::SeqCst);
        drop(inner);
        self.space.notify_all();
    }

    //ap len
    /// Number of chunks currently cached
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    //ap is_empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    //ap capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    //ap hit_rate
    /// Percentage of fetches served from the cache since creation;
    /// 0 when nothing has been fetched yet
    pub fn hit_rate(&self) -> f64 {
        let fetches = self.fetches.load(Ordering::Relaxed);
        if fetches == 0 {
            return 0.0;
        }
        self.hits.load(Ordering::Relaxed) as f64 * 100.0 / fetches as f64
    }

    //mp clear
    /// Drop every unpinned entry (used at shutdown, after queries drain)
    pub fn clear(&self) {
        lock(&self.inner).clear();
    }
}

//a PinnedChunk
//tp PinnedChunk
/// RAII read guard over one cached chunk
///
/// Holding the guard keeps the chunk in the cache; the records
/// themselves are shared, so they stay valid even if the entry is
/// evicted after the guard is dropped mid-iteration elsewhere.
pub struct PinnedChunk {
    cache: Arc<ChunkCache>,
    slot: Arc<ChunkSlot>,
    records: Arc<Vec<StarRecord>>,
}

//ip PinnedChunk
impl PinnedChunk {
    //ap chunk_id
    pub fn chunk_id(&self) -> u32 {
        self.slot.chunk_id
    }

    //ap records
    pub fn records(&self) -> &[StarRecord] {
        &self.records
    }
}

//ip Drop for PinnedChunk
impl Drop for PinnedChunk {
    fn drop(&mut self) {
        self.cache.unpin(&self.slot);
    }
}
