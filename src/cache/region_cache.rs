//! Region Cache
//!
//! LRU-bounded set of open region files.

use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::error::{RegionError, Result};
use crate::region::{region_file_name, ChunkReader, ChunkWriter, RegionFile, RegionFixer};

/// Grid coordinates of a region file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region holding the cell at absolute coordinates (arithmetic shift)
    pub fn of_cell(x: i32, z: i32) -> Self {
        Self { x: x >> 5, z: z >> 5 }
    }
}

/// Open files plus evicted files that are still referenced elsewhere
struct Registry {
    /// Open files, most recently used first
    lru: LruCache<RegionPos, Arc<RegionFile>>,

    /// Evicted while shared. Held until every outside handle is gone so the
    /// file is only ever closed under the registry lock, and handed out again
    /// instead of opening a second instance over the same path.
    retired: HashMap<RegionPos, Arc<RegionFile>>,
}

impl Registry {
    /// Close a file leaving the cache, or flush and retire it if someone
    /// still holds it
    fn release(&mut self, pos: RegionPos, file: Arc<RegionFile>) -> Result<()> {
        tracing::debug!("Releasing region [{}, {}]", pos.x, pos.z);

        match Arc::try_unwrap(file) {
            Ok(file) => file.close(),
            Err(shared) => {
                let flushed = shared.flush();
                self.retired.insert(pos, shared);
                flushed
            }
        }
    }

    /// Close retired files nobody outside the cache holds any more
    fn prune(&mut self) -> Result<()> {
        let idle: Vec<RegionPos> = self
            .retired
            .iter()
            .filter(|&(_, file)| Arc::strong_count(file) == 1)
            .map(|(pos, _)| *pos)
            .collect();

        let mut first_err = None;
        for pos in idle {
            let Some(file) = self.retired.remove(&pos) else {
                continue;
            };
            match Arc::try_unwrap(file) {
                Ok(file) => {
                    if let Err(e) = file.close() {
                        first_err.get_or_insert(e);
                    }
                }
                Err(shared) => {
                    self.retired.insert(pos, shared);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

/// Cache of open region files
///
/// ## Concurrency:
/// - `registry`: one lock around the LRU registry. Lookups, lazy opens and
///   evictions are serialized; the cache can be shared across threads.
/// - Handed-out `Arc<RegionFile>`s stay valid after eviction. An evicted file
///   still referenced elsewhere is flushed instead of closed, handed out again
///   if resolved while retired, and closed by the first cache miss after its
///   last outside handle drops.
pub struct RegionCache {
    config: CacheConfig,

    /// Custom repair strategy for every opened file (forces leniency)
    fixer: Option<Arc<dyn RegionFixer>>,

    registry: Mutex<Registry>,
}

impl RegionCache {
    /// Create a cache over `config.directory`, creating the directory
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a cache whose region files use a custom repair strategy
    pub fn with_fixer(config: CacheConfig, fixer: Arc<dyn RegionFixer>) -> Result<Self> {
        Self::build(config, Some(fixer))
    }

    fn build(config: CacheConfig, fixer: Option<Arc<dyn RegionFixer>>) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.capacity).ok_or_else(|| {
            RegionError::Config("region cache capacity must be at least 1".to_string())
        })?;

        fs::create_dir_all(&config.directory)?;

        Ok(Self {
            config,
            fixer,
            registry: Mutex::new(Registry {
                lru: LruCache::new(capacity),
                retired: HashMap::new(),
            }),
        })
    }

    /// Region file holding the cell at absolute coordinates, opening it if
    /// needed and marking it most recently used
    pub fn resolve(&self, x: i32, z: i32) -> Result<Arc<RegionFile>> {
        self.resolve_region(RegionPos::of_cell(x, z))
    }

    /// Region file at grid coordinates
    pub fn resolve_region(&self, pos: RegionPos) -> Result<Arc<RegionFile>> {
        let mut registry = self.registry.lock();

        if let Some(file) = registry.lru.get(&pos) {
            return Ok(Arc::clone(file));
        }

        if let Err(e) = registry.prune() {
            tracing::warn!("Failed to close retired region file: {}", e);
        }

        let file = match registry.retired.remove(&pos) {
            Some(file) => file,
            None => {
                let file = Arc::new(self.open_region(pos)?);
                tracing::debug!("Opened region file {}", file.path().display());
                file
            }
        };

        if let Some((evicted_pos, evicted)) = registry.lru.push(pos, Arc::clone(&file)) {
            registry.release(evicted_pos, evicted)?;
        }

        Ok(file)
    }

    // =========================================================================
    // Cell Pass-throughs
    // =========================================================================

    /// Decoded stream over a cell
    pub fn read_chunk(&self, x: i32, z: i32) -> Result<ChunkReader> {
        self.resolve(x, z)?.read_chunk(x, z)
    }

    /// Read and decode a whole cell
    pub fn read_chunk_to_vec(&self, x: i32, z: i32) -> Result<Vec<u8>> {
        self.resolve(x, z)?.read_chunk_to_vec(x, z)
    }

    /// Writer for a cell, using the configured default compression
    pub fn write_chunk(&self, x: i32, z: i32) -> Result<ChunkWriter<'static>> {
        let file = self.resolve(x, z)?;
        let compression = file.compression();
        Ok(ChunkWriter::shared(file, x, z, compression))
    }

    /// Encode and store a whole cell
    pub fn write_chunk_bytes(&self, x: i32, z: i32, data: &[u8]) -> Result<()> {
        self.resolve(x, z)?.write_chunk_bytes(x, z, data)
    }

    /// Best-effort existence probe; false if the region cannot be opened
    pub fn chunk_exists(&self, x: i32, z: i32) -> bool {
        match self.resolve(x, z) {
            Ok(file) => file.chunk_exists(x, z),
            Err(_) => false,
        }
    }

    /// Whether the header has an entry for the cell
    pub fn has_chunk(&self, x: i32, z: i32) -> Result<bool> {
        Ok(self.resolve(x, z)?.has_chunk(x, z))
    }

    /// Last write time of a cell
    pub fn timestamp(&self, x: i32, z: i32) -> Result<u32> {
        Ok(self.resolve(x, z)?.timestamp(x, z))
    }

    /// Remove a cell
    pub fn remove_chunk(&self, x: i32, z: i32) -> Result<()> {
        self.resolve(x, z)?.remove_chunk(x, z)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush every open region file, retired ones included; returns the first
    /// error after trying all
    pub fn flush(&self) -> Result<()> {
        let registry = self.registry.lock();
        let mut first_err = None;

        let open = registry.lru.iter().map(|(_, file)| file);
        for file in open.chain(registry.retired.values()) {
            if let Err(e) = file.flush() {
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Close every open region file and empty the cache; returns the first
    /// error after trying all
    ///
    /// Files still held elsewhere are flushed now and stay retired: a later
    /// resolve hands them out again, and the first cache miss after their last
    /// handle drops closes them.
    pub fn close(&self) -> Result<()> {
        let mut registry = self.registry.lock();
        let mut first_err = None;

        while let Some((pos, file)) = registry.lru.pop_lru() {
            if let Err(e) = registry.release(pos, file) {
                first_err.get_or_insert(e);
            }
        }
        // Shared files stay retired so a later resolve reuses them
        if let Err(e) = registry.prune() {
            first_err.get_or_insert(e);
        }

        first_err.map_or(Ok(()), Err)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of open region files
    pub fn len(&self) -> usize {
        self.registry.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().lru.is_empty()
    }

    /// Whether the region at grid coordinates is open (does not touch recency)
    pub fn contains(&self, pos: RegionPos) -> bool {
        self.registry.lock().lru.contains(&pos)
    }

    /// Maximum number of open region files
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Directory holding the region files
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Path of the region file at grid coordinates
    pub fn region_path(&self, pos: RegionPos) -> PathBuf {
        self.config
            .directory
            .join(region_file_name(pos.x, pos.z, self.config.format))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn open_region(&self, pos: RegionPos) -> Result<RegionFile> {
        let path = self.region_path(pos);
        let directory = &self.config.directory;

        match &self.fixer {
            Some(fixer) => {
                RegionFile::open_with_fixer(directory, &path, &self.config.region, Arc::clone(fixer))
            }
            None => RegionFile::open(directory, &path, &self.config.region),
        }
    }
}
