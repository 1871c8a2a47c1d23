//! Pageable Object Module
//!
//! The interface the cache consumes from the objects it pages.
//!
//! ## Responsibilities
//! - Report identity, file footprint, and in-memory footprint
//! - Serialize itself at a position chosen by the cache (`save`)
//! - Drop its payload once it is safely on disk (`clear_from_memory`)
//!
//! The cache decides only *when* and *where* an object is written; the
//! payload format belongs entirely to the object. Objects are shared as
//! [`ObjectRef`] and are never owned by the cache.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::storage::BackingFile;

/// Stable, process-lifetime-unique object key
pub type ObjectId = u64;

/// Shared handle to a pageable object
pub type ObjectRef = Arc<dyn PageableObject>;

/// An object that can be paged to and from the backing file
pub trait PageableObject: Send + Sync {
    /// Stable key used by the MRU and write-buffer indexes
    fn id(&self) -> ObjectId;

    /// Byte offset of the current on-file copy, `None` if never written
    fn file_position(&self) -> Option<u64>;

    /// Size of the current on-file copy
    fn size_on_file(&self) -> u64;

    /// Size the next write will occupy on file
    fn data_size(&self) -> u64;

    /// Footprint charged against the MRU budget while resident
    fn memory_size(&self) -> u64;

    /// Whether the in-memory state differs from the on-file copy
    fn is_dirty(&self) -> bool;

    /// Busy objects are skipped by a drain and stay buffered
    fn is_busy(&self) -> bool {
        false
    }

    /// Write the payload at `position`.
    ///
    /// On success the object must report `position` and `data_size()` as its
    /// new file position and size on file, and stop being dirty.
    fn save(&self, file: &BackingFile, position: u64) -> io::Result<()>;

    /// Release the in-memory payload after eviction
    fn clear_from_memory(&self) {}
}

// =============================================================================
// BlobObject
// =============================================================================

/// A pageable object holding an opaque byte payload
///
/// The payload is written verbatim; `load` pages it back in.
pub struct BlobObject {
    id: ObjectId,
    state: Mutex<BlobState>,
}

struct BlobState {
    /// Payload, `None` while paged out
    data: Option<Bytes>,
    len: u64,
    position: Option<u64>,
    size_on_file: u64,
    dirty: bool,
    busy: bool,
}

impl BlobObject {
    /// Create a new, never-written object
    pub fn new(id: ObjectId, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            id,
            state: Mutex::new(BlobState {
                len: data.len() as u64,
                data: Some(data),
                position: None,
                size_on_file: 0,
                dirty: true,
                busy: false,
            }),
        }
    }

    /// Replace the payload (marks the object dirty)
    pub fn set_data(&self, data: impl Into<Bytes>) {
        let data = data.into();
        let mut state = self.state.lock();
        state.len = data.len() as u64;
        state.data = Some(data);
        state.dirty = true;
    }

    /// The resident payload, if any
    pub fn data(&self) -> Option<Bytes> {
        self.state.lock().data.clone()
    }

    /// Whether the payload is currently in memory
    pub fn is_resident(&self) -> bool {
        self.state.lock().data.is_some()
    }

    /// Mark the object as in use (or not) by a worker
    pub fn set_busy(&self, busy: bool) {
        self.state.lock().busy = busy;
    }

    /// Page the payload back in from the backing file
    pub fn load(&self, file: &BackingFile) -> io::Result<Bytes> {
        let mut state = self.state.lock();
        if let Some(data) = &state.data {
            return Ok(data.clone());
        }

        let position = state.position.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("object {} is neither resident nor on file", self.id),
            )
        })?;

        let data = Bytes::from(file.read_at(position, state.size_on_file as usize)?);
        state.data = Some(data.clone());
        Ok(data)
    }
}

impl PageableObject for BlobObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn file_position(&self) -> Option<u64> {
        self.state.lock().position
    }

    fn size_on_file(&self) -> u64 {
        self.state.lock().size_on_file
    }

    fn data_size(&self) -> u64 {
        self.state.lock().len
    }

    fn memory_size(&self) -> u64 {
        self.state.lock().len
    }

    fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    fn save(&self, file: &BackingFile, position: u64) -> io::Result<()> {
        let mut state = self.state.lock();

        match &state.data {
            Some(data) => file.write_at(position, data)?,
            // Paged out and unchanged: the on-file copy is already current
            None if state.position == Some(position) => return Ok(()),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("object {} must be loaded before moving it", self.id),
                ))
            }
        }

        state.position = Some(position);
        state.size_on_file = state.len;
        state.dirty = false;
        Ok(())
    }

    fn clear_from_memory(&self) {
        let mut state = self.state.lock();
        // Dirty payloads have nowhere else to live
        if !state.dirty {
            state.data = None;
        }
    }
}
