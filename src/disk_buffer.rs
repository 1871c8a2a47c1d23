//! DiskBuffer Module
//!
//! The cache facade that coordinates all components.
//!
//! ## Responsibilities
//! - Admit loaded objects to the small-object pool or the MRU list
//! - Evict least-recently-used objects into the write buffer
//! - Drain the write buffer when it grows past its threshold
//! - Expose space management and layout persistence to the owning collection

use std::fmt;
use std::path::Path;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::cache::{MruList, SmallObjectPool, WriteBuffer};
use crate::config::Config;
use crate::error::Result;
use crate::object::{ObjectId, ObjectRef, PageableObject};
use crate::storage::{BackingFile, FreeBlock, FreeSpaceLayout, FreeSpaceMap};

/// State guarded by the cache lock
///
/// The MRU list and write buffer share one lock because eviction moves
/// objects directly from one into the other.
struct CacheState {
    mru: MruList,
    write_buffer: WriteBuffer,
    /// Buffered volume above which `write_all` runs
    write_buffer_size: u64,
}

/// Disk-backed MRU cache over one backing file
///
/// ## Concurrency Model: three independent critical sections
///
/// - **cache** (MRU list + write buffer): `loading`, `to_write`, drains
/// - **free_space** (allocator): `allocate`, `free_block`, `relocate`, ...
/// - **small_pool** (pool running total): admission decisions
///
/// Allocation and eviction therefore never serialize each other. The only
/// nesting is cache → free_space (assigning a position while buffering);
/// free_space and small_pool are never held while taking another lock.
///
/// Physical writes happen only inside a write-buffer drain (under the cache
/// lock) and inside objects' own load routines.
pub struct DiskBuffer {
    /// Current configuration (the single owned copy)
    config: RwLock<Config>,

    /// The backing file every object is paged into
    file: BackingFile,

    /// MRU list + write buffer
    cache: Mutex<CacheState>,

    /// Free-space map and file length
    free_space: Mutex<FreeSpaceMap>,

    /// Small-object pool
    small_pool: Mutex<SmallObjectPool>,
}

impl DiskBuffer {
    /// Open (or create) the backing file named by the config
    ///
    /// The allocator starts with an empty file; when reopening a file with
    /// data, restore its layout with [`DiskBuffer::load_layout`] before
    /// loading any object.
    pub fn open(config: Config) -> Result<Self> {
        let file = BackingFile::open(&config.file_path)?;
        info!(path = %config.file_path.display(), "Opened backing file");
        Ok(Self::with_file(config, file))
    }

    /// Build a cache over an already opened backing file
    pub fn with_file(config: Config, file: BackingFile) -> Self {
        let cache = CacheState {
            mru: MruList::new(config.mru_size),
            write_buffer: WriteBuffer::new(),
            write_buffer_size: config.write_buffer_size,
        };
        let small_pool = SmallObjectPool::new(config.small_buffer_size, config.expected_object_count);

        Self {
            config: RwLock::new(config),
            file,
            cache: Mutex::new(cache),
            free_space: Mutex::new(FreeSpaceMap::new()),
            small_pool: Mutex::new(small_pool),
        }
    }

    // =========================================================================
    // MRU Lifecycle
    // =========================================================================

    /// Register a use of `item` (call after loading it into memory)
    ///
    /// Small objects are pinned by the pool and dropped from the MRU list if
    /// an earlier load put them there. Otherwise the
    /// item becomes the most recent resident; least-recently-used objects are
    /// evicted until the budget holds again (never the item itself), and the
    /// write buffer is drained if eviction pushed it over its threshold.
    pub fn loading(&self, item: &ObjectRef) -> Result<()> {
        let id = item.id();

        if self.small_pool.lock().should_stay_in_memory(id, item.memory_size()) {
            let mut cache = self.cache.lock();
            if cache.mru.remove(id).is_some() {
                debug!(id, "Moved object from MRU to small-object pool");
            }
            // A write queued before admission still completes but keeps the payload
            cache.write_buffer.keep_in_memory(id);
            trace!(id, "Object pinned in small-object pool");
            return Ok(());
        }

        let mut cache = self.cache.lock();
        if cache.mru.budget() == 0 {
            return Ok(());
        }

        cache.write_buffer.keep_in_memory(id);
        let victims = cache.mru.touch(item);
        self.evict(&mut cache, victims)?;
        self.write_if_over_threshold(&mut cache)
    }

    /// Mark `item` dirty so it is written with the next drain
    ///
    /// Objects pinned by the small-object pool are ignored.
    pub fn to_write(&self, item: &ObjectRef) -> Result<()> {
        let id = item.id();
        if self.small_pool.lock().is_resident(id) {
            return Ok(());
        }

        let mut cache = self.cache.lock();
        let resident = cache.mru.contains(id);
        cache.write_buffer.enqueue(item.clone(), !resident, &self.free_space)?;
        self.write_if_over_threshold(&mut cache)
    }

    /// Write every buffered object now, in file-position order
    ///
    /// Returns the number of objects written. Busy objects stay buffered.
    pub fn write_old_objects(&self) -> Result<usize> {
        let mut cache = self.cache.lock();
        cache.write_buffer.write_all(&self.file)
    }

    /// Write every buffered object and sync the backing file
    ///
    /// A second flush with nothing buffered in between writes nothing.
    pub fn flush_cache(&self) -> Result<usize> {
        let mut cache = self.cache.lock();
        let written = cache.write_buffer.write_all(&self.file)?;
        if written > 0 {
            self.file.sync()?;
            info!(written, "Flushed write buffer");
        }
        Ok(written)
    }

    /// Forget a deleted object and return its file footprint to free space
    ///
    /// If the object is buffered, the range reserved for it is freed;
    /// otherwise `[file_position, +size_on_file)` is.
    pub fn object_deleted(&self, item: &ObjectRef, size_on_file: u64) -> Result<()> {
        let id = item.id();
        self.small_pool.lock().release(id);

        let reserved = {
            let mut cache = self.cache.lock();
            cache.mru.remove(id);
            cache.write_buffer.remove(id)
        };

        let footprint =
            reserved.or_else(|| item.file_position().map(|pos| FreeBlock::new(pos, size_on_file)));
        if let Some(block) = footprint {
            self.free_space.lock().free_block(block.position, block.size)?;
        }

        debug!(id, freed = ?footprint, "Object deleted");
        Ok(())
    }

    // =========================================================================
    // Space Management
    // =========================================================================

    /// Mark `[position, +size)` as free
    pub fn free_block(&self, position: u64, size: u64) -> Result<()> {
        self.free_space.lock().free_block(position, size)
    }

    /// Merge touching free blocks; returns how many blocks were merged away
    pub fn defrag_free_blocks(&self) -> Result<usize> {
        self.free_space.lock().defrag_free_blocks()
    }

    /// Reserve `size` bytes and return their position (grows the file if needed)
    pub fn allocate(&self, size: u64) -> u64 {
        self.free_space.lock().allocate(size)
    }

    /// Resize an allocation; the caller moves the data if the position changes
    pub fn relocate(&self, old_position: u64, old_size: u64, new_size: u64) -> Result<u64> {
        self.free_space.lock().relocate(old_position, old_size, new_size)
    }

    /// Snapshot of the free blocks in position order
    pub fn free_space_vector(&self) -> Vec<FreeBlock> {
        self.free_space.lock().free_space_vector()
    }

    /// Replace the free blocks (e.g. from a saved layout)
    pub fn set_free_space_vector(&self, blocks: &[FreeBlock]) -> Result<()> {
        self.free_space.lock().set_free_space_vector(blocks)
    }

    /// First never-allocated byte offset
    pub fn file_length(&self) -> u64 {
        self.free_space.lock().file_length()
    }

    /// Reset the file length (e.g. when reopening a saved file)
    pub fn set_file_length(&self, length: u64) -> Result<()> {
        self.free_space.lock().set_file_length(length)
    }

    // =========================================================================
    // Layout Persistence
    // =========================================================================

    /// Save the file length and free blocks to `path`
    pub fn save_layout(&self, path: &Path) -> Result<()> {
        let layout = {
            let free_space = self.free_space.lock();
            FreeSpaceLayout {
                file_length: free_space.file_length(),
                free_blocks: free_space.free_space_vector(),
            }
        };
        layout.save(path)?;

        info!(
            path = %path.display(),
            file_length = layout.file_length,
            free_blocks = layout.free_blocks.len(),
            "Saved free-space layout"
        );
        Ok(())
    }

    /// Restore the file length and free blocks saved by `save_layout`
    ///
    /// Call before any object is buffered.
    pub fn load_layout(&self, path: &Path) -> Result<FreeSpaceLayout> {
        let layout = FreeSpaceLayout::load(path)?;
        self.free_space
            .lock()
            .restore(layout.file_length, &layout.free_blocks)?;

        info!(
            path = %path.display(),
            file_length = layout.file_length,
            free_blocks = layout.free_blocks.len(),
            "Restored free-space layout"
        );
        Ok(layout)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Change the write buffer threshold (takes effect at the next buffering)
    pub fn set_write_buffer_size(&self, size: u64) {
        self.config.write().write_buffer_size = size;
        self.cache.lock().write_buffer_size = size;
    }

    /// Change the MRU budget, evicting immediately if it shrank
    ///
    /// A budget of 0 disables the MRU and evicts every resident object.
    pub fn set_mru_size(&self, size: u64) -> Result<()> {
        self.config.write().mru_size = size;

        let mut cache = self.cache.lock();
        let victims = if size == 0 {
            let victims = cache.mru.clear();
            cache.mru.set_budget(0);
            victims
        } else {
            cache.mru.set_budget(size)
        };
        self.evict(&mut cache, victims)?;
        self.write_if_over_threshold(&mut cache)
    }

    /// Change the small-object pool budget (admitted objects stay admitted)
    pub fn set_small_buffer_size(&self, size: u64) {
        self.config.write().small_buffer_size = size;
        self.small_pool.lock().set_budget(size);
    }

    /// Set a budget from text (`write_buffer_size`, `mru_size`,
    /// `small_buffer_size`); rejected values leave the configuration as is
    pub fn set_option(&self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.config.read().clone();
        updated.set_option(key, value)?;

        match key {
            "write_buffer_size" => self.set_write_buffer_size(updated.write_buffer_size),
            "mru_size" => self.set_mru_size(updated.mru_size)?,
            _ => self.set_small_buffer_size(updated.small_buffer_size),
        }
        Ok(())
    }

    // =========================================================================
    // Small-Object Pool
    // =========================================================================

    /// Pre-size the pool for `count` objects (ids `0..count`)
    pub fn set_number_of_objects(&self, count: usize) {
        self.config.write().expected_object_count = count;
        self.small_pool.lock().set_number_of_objects(count);
    }

    /// Decide (once) whether `id` stays in memory permanently
    pub fn should_stay_in_memory(&self, id: ObjectId, size: u64) -> bool {
        self.small_pool.lock().should_stay_in_memory(id, size)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Snapshot of the current configuration
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// The backing file (for objects' load routines)
    pub fn file(&self) -> &BackingFile {
        &self.file
    }

    /// Resident ids, most recent first
    pub fn mru_ids(&self) -> Vec<ObjectId> {
        self.cache.lock().mru.ids()
    }

    /// Buffered ids in drain order
    pub fn write_buffer_ids(&self) -> Vec<ObjectId> {
        self.cache.lock().write_buffer.ids()
    }

    /// Position reserved for a buffered object
    pub fn buffered_position(&self, id: ObjectId) -> Option<u64> {
        self.cache.lock().write_buffer.position_of(id)
    }

    /// Usage figures for every component
    pub fn stats(&self) -> BufferStats {
        let (mru_used, mru_budget, mru_objects, write_buffer_used, write_buffer_size, write_buffer_objects) = {
            let cache = self.cache.lock();
            (
                cache.mru.used(),
                cache.mru.budget(),
                cache.mru.len(),
                cache.write_buffer.used(),
                cache.write_buffer_size,
                cache.write_buffer.len(),
            )
        };
        let (small_pool_used, small_pool_budget) = {
            let pool = self.small_pool.lock();
            (pool.used(), pool.budget())
        };
        let (file_length, free_space, free_blocks) = {
            let map = self.free_space.lock();
            (map.file_length(), map.free_space(), map.block_count())
        };

        BufferStats {
            mru_used,
            mru_budget,
            mru_objects,
            write_buffer_used,
            write_buffer_size,
            write_buffer_objects,
            small_pool_used,
            small_pool_budget,
            file_length,
            free_space,
            free_blocks,
        }
    }

    /// Human-readable usage summary
    pub fn memory_str(&self) -> String {
        self.stats().to_string()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Buffer dirty victims, drop clean ones from memory
    ///
    /// Every victim is handled even if one fails to buffer; the first error
    /// is returned. A victim that could not be buffered goes back to the MRU
    /// list as least recent, so the next eviction retries it.
    fn evict(&self, cache: &mut CacheState, victims: Vec<ObjectRef>) -> Result<()> {
        let mut first_error = None;

        for victim in victims {
            let id = victim.id();
            if needs_write(victim.as_ref()) {
                let buffered = cache
                    .write_buffer
                    .enqueue(victim.clone(), true, &self.free_space);
                if let Err(e) = buffered {
                    warn!(id, error = %e, "Failed to buffer evicted object, kept resident");
                    cache.mru.reinstate(victim);
                    first_error.get_or_insert(e);
                }
            } else {
                victim.clear_from_memory();
                trace!(id, "Evicted clean object");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write_if_over_threshold(&self, cache: &mut CacheState) -> Result<()> {
        if cache.write_buffer.used() > cache.write_buffer_size {
            debug!(
                buffered = cache.write_buffer.used(),
                threshold = cache.write_buffer_size,
                "Write buffer over threshold"
            );
            cache.write_buffer.write_all(&self.file)?;
        }
        Ok(())
    }
}

/// Whether an evicted object must be written before it can leave memory
fn needs_write(object: &dyn PageableObject) -> bool {
    object.file_position().is_none()
        || object.is_dirty()
        || object.data_size() != object.size_on_file()
}

/// Usage figures for every component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    /// Footprint of resident objects
    pub mru_used: u64,
    pub mru_budget: u64,
    pub mru_objects: usize,
    /// Data size of buffered objects
    pub write_buffer_used: u64,
    pub write_buffer_size: u64,
    pub write_buffer_objects: usize,
    pub small_pool_used: u64,
    pub small_pool_budget: u64,
    pub file_length: u64,
    /// Total free bytes below `file_length`
    pub free_space: u64,
    pub free_blocks: usize,
}

impl fmt::Display for BufferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Buffer: {} / {} in MRU ({} objects); {} / {} in write buffer ({} objects); \
             {} / {} in small-object pool. File length: {}; free space: {} in {} blocks.",
            self.mru_used,
            self.mru_budget,
            self.mru_objects,
            self.write_buffer_used,
            self.write_buffer_size,
            self.write_buffer_objects,
            self.small_pool_used,
            self.small_pool_budget,
            self.file_length,
            self.free_space,
            self.free_blocks,
        )
    }
}
