//! Write Buffer
//!
//! Stages dirty objects so they can be written in file-position order.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{DiskBufferError, Result};
use crate::object::{ObjectId, ObjectRef};
use crate::storage::{BackingFile, FreeBlock, FreeSpaceMap};

/// A buffered object and the range reserved for it
struct Pending {
    object: ObjectRef,
    position: u64,
    size: u64,
    /// Drop the payload once written (set for evicted objects)
    release_after_write: bool,
}

/// Objects waiting to be written, indexed by id and by target position
///
/// Buffering decides *when* an object is written, never *where*: the range
/// is reserved at enqueue time and stays put across re-buffering unless the
/// object changed size.
#[derive(Default)]
pub struct WriteBuffer {
    entries: HashMap<ObjectId, Pending>,

    /// (position, id) in drain order
    by_position: BTreeSet<(u64, ObjectId)>,

    /// Sum of buffered data sizes
    used: u64,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `object`, returning its target position
    ///
    /// Position assignment:
    /// - already buffered, same size: the reserved position
    /// - already buffered, new size: the reserved range is relocated
    /// - on file: its current position, relocated if the size changed
    /// - never written: a fresh allocation
    pub fn enqueue(
        &mut self,
        object: ObjectRef,
        release_after_write: bool,
        free_space: &Mutex<FreeSpaceMap>,
    ) -> Result<u64> {
        let id = object.id();
        let size = object.data_size();

        let position = match self.entries.get(&id) {
            Some(pending) if pending.size == size => pending.position,
            Some(pending) => free_space.lock().relocate(pending.position, pending.size, size)?,
            None => match object.file_position() {
                Some(current) => {
                    let on_file = object.size_on_file();
                    if on_file == size {
                        current
                    } else {
                        free_space.lock().relocate(current, on_file, size)?
                    }
                }
                None => free_space.lock().allocate(size),
            },
        };

        self.remove_entry(id);
        self.by_position.insert((position, id));
        self.used += size;
        self.entries.insert(
            id,
            Pending {
                object,
                position,
                size,
                release_after_write,
            },
        );

        debug!(id, position, size, buffered = self.used, "Buffered object for writing");
        Ok(position)
    }

    /// Keep a buffered object's payload after it is written (it was reloaded)
    pub fn keep_in_memory(&mut self, id: ObjectId) {
        if let Some(pending) = self.entries.get_mut(&id) {
            pending.release_after_write = false;
        }
    }

    /// Drop an object's entry, returning the range reserved for it
    pub fn remove(&mut self, id: ObjectId) -> Option<FreeBlock> {
        self.remove_entry(id)
            .map(|pending| FreeBlock::new(pending.position, pending.size))
    }

    /// Write every buffered object in ascending position order
    ///
    /// Busy objects are skipped and stay buffered. The first failed save
    /// stops the drain: that object and all later ones stay buffered for the
    /// next attempt. Returns the number of objects written.
    pub fn write_all(&mut self, file: &BackingFile) -> Result<usize> {
        let order: Vec<(u64, ObjectId)> = self.by_position.iter().copied().collect();
        let mut written = 0;
        let mut skipped = 0;

        for (position, id) in order {
            let Some(pending) = self.entries.get(&id) else {
                continue;
            };

            if pending.object.is_busy() {
                skipped += 1;
                continue;
            }

            if let Err(source) = pending.object.save(file, position) {
                warn!(id, position, error = %source, "Write failed, object stays buffered");
                return Err(DiskBufferError::Write { id, position, source });
            }

            if pending.release_after_write {
                pending.object.clear_from_memory();
            }
            self.remove_entry(id);
            written += 1;
        }

        if skipped > 0 {
            warn!(skipped, "Busy objects left in write buffer");
        }
        debug!(written, remaining = self.entries.len(), "Drained write buffer");
        Ok(written)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Reserved position of a buffered object
    pub fn position_of(&self, id: ObjectId) -> Option<u64> {
        self.entries.get(&id).map(|pending| pending.position)
    }

    /// Buffered ids in drain order
    pub fn ids(&self) -> Vec<ObjectId> {
        self.by_position.iter().map(|&(_, id)| id).collect()
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_entry(&mut self, id: ObjectId) -> Option<Pending> {
        let pending = self.entries.remove(&id)?;
        self.by_position.remove(&(pending.position, id));
        self.used -= pending.size;
        Some(pending)
    }
}
