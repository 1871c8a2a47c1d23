//! Backing File
//!
//! The single flat byte space every pageable object lives in.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Positional access to the backing file
///
/// Positions are assigned by the free-space map; this type only moves bytes.
/// The handle is shared by all worker threads, so each call seeks and
/// transfers under one lock.
pub struct BackingFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl BackingFile {
    /// Open or create the backing file (existing contents are kept)
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Write `data` starting at `position`
    pub fn write_at(&self, position: u64, data: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(position))?;
        file.write_all(data)
    }

    /// Read exactly `len` bytes starting at `position`
    pub fn read_at(&self, position: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(position))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Flush OS buffers to disk
    pub fn sync(&self) -> std::io::Result<()> {
        self.file.lock().sync_data()
    }

    /// Physical length of the file (may trail the allocator's file length
    /// until every allocated range has been written)
    pub fn len(&self) -> std::io::Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Whether the file holds no bytes yet
    pub fn is_empty(&self) -> std::io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
