//! Shared helpers for DiskBuffer integration tests

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use diskbuffer::{BackingFile, BlobObject, Config, DiskBuffer, ObjectId, ObjectRef, PageableObject};
use parking_lot::Mutex;
use tempfile::TempDir;

// =============================================================================
// Buffer Setup
// =============================================================================

pub fn setup_temp_buffer(mru_size: u64, write_buffer_size: u64) -> (TempDir, DiskBuffer) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .file_path(temp_dir.path().join("buffer.dat"))
        .mru_size(mru_size)
        .write_buffer_size(write_buffer_size)
        .build();
    let buffer = DiskBuffer::open(config).unwrap();
    (temp_dir, buffer)
}

pub fn setup_temp_buffer_with_pool(
    mru_size: u64,
    write_buffer_size: u64,
    small_buffer_size: u64,
    expected_objects: usize,
) -> (TempDir, DiskBuffer) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .file_path(temp_dir.path().join("buffer.dat"))
        .mru_size(mru_size)
        .write_buffer_size(write_buffer_size)
        .small_buffer_size(small_buffer_size)
        .expected_object_count(expected_objects)
        .build();
    let buffer = DiskBuffer::open(config).unwrap();
    (temp_dir, buffer)
}

// =============================================================================
// Objects
// =============================================================================

/// A blob filled with `id as u8`, plus the handle the cache takes
pub fn blob(id: ObjectId, size: usize) -> (Arc<BlobObject>, ObjectRef) {
    let object = Arc::new(BlobObject::new(id, vec![id as u8; size]));
    let handle: ObjectRef = object.clone();
    (object, handle)
}

/// Shared log of saved ids, in save order
pub type SaveLog = Arc<Mutex<Vec<ObjectId>>>;

/// A blob that counts its saves and can be told to fail them
pub struct TrackedObject {
    pub inner: BlobObject,
    pub saves: AtomicUsize,
    pub fail: AtomicBool,
    pub log: Option<SaveLog>,
}

impl TrackedObject {
    pub fn new(id: ObjectId, size: usize) -> Arc<Self> {
        Self::with_log(id, size, None)
    }

    pub fn with_log(id: ObjectId, size: usize, log: Option<SaveLog>) -> Arc<Self> {
        Arc::new(Self {
            inner: BlobObject::new(id, vec![id as u8; size]),
            saves: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            log,
        })
    }

    pub fn handle(self: &Arc<Self>) -> ObjectRef {
        self.clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl PageableObject for TrackedObject {
    fn id(&self) -> ObjectId {
        self.inner.id()
    }

    fn file_position(&self) -> Option<u64> {
        self.inner.file_position()
    }

    fn size_on_file(&self) -> u64 {
        self.inner.size_on_file()
    }

    fn data_size(&self) -> u64 {
        self.inner.data_size()
    }

    fn memory_size(&self) -> u64 {
        self.inner.memory_size()
    }

    fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    fn is_busy(&self) -> bool {
        self.inner.is_busy()
    }

    fn save(&self, file: &BackingFile, position: u64) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected save failure"));
        }
        self.inner.save(file, position)?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().push(self.inner.id());
        }
        Ok(())
    }

    fn clear_from_memory(&self) {
        self.inner.clear_from_memory()
    }
}
