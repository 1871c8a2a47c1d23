//! Free-Space Layout Persistence
//!
//! Saves the allocator state next to the data file so a reopened file can
//! keep reusing its holes.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                        │
//! │   Magic: "DBFL" (4) | Version: u16 (2)                   │
//! │   PayloadLen: u32 (4) | PayloadCRC: u32 (4)              │
//! ├──────────────────────────────────────────────────────────┤
//! │ Payload (bincode)                                        │
//! │   file_length: u64                                       │
//! │   free_blocks: [FreeBlock { position, size }]            │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DiskBufferError, Result};

use super::FreeBlock;

/// Magic bytes identifying a layout file
pub(crate) const MAGIC: &[u8; 4] = b"DBFL";

/// Current layout format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + PayloadLen (4) + CRC (4) = 14 bytes
pub(crate) const HEADER_SIZE: usize = 14;

/// Persisted allocator state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpaceLayout {
    /// First never-allocated byte offset
    pub file_length: u64,

    /// Free blocks in position order
    pub free_blocks: Vec<FreeBlock>,
}

impl FreeSpaceLayout {
    /// Total free bytes recorded in the layout
    pub fn free_space(&self) -> u64 {
        self.free_blocks.iter().map(|b| b.size).sum()
    }

    /// Write the layout to `path`, replacing any previous file
    pub fn save(&self, path: &Path) -> Result<()> {
        let payload = bincode::serialize(self)?;
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| DiskBufferError::Layout("layout too large".to_string()))?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let mut file = File::create(path)?;
        file.write_all(MAGIC)?;
        file.write_all(&VERSION.to_le_bytes())?;
        file.write_all(&payload_len.to_le_bytes())?;
        file.write_all(&crc.to_le_bytes())?;
        file.write_all(&payload)?;
        file.sync_all()?;

        Ok(())
    }

    /// Read and verify a layout written by [`FreeSpaceLayout::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_SIZE {
            return Err(DiskBufferError::Layout(format!(
                "file too small ({} bytes)",
                bytes.len()
            )));
        }

        if &bytes[0..4] != MAGIC {
            return Err(DiskBufferError::Layout("bad magic bytes".to_string()));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(DiskBufferError::Layout(format!(
                "unsupported version {}",
                version
            )));
        }

        let payload_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        let stored_crc = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != payload_len {
            return Err(DiskBufferError::Layout(format!(
                "payload length mismatch: header says {}, found {}",
                payload_len,
                payload.len()
            )));
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != stored_crc {
            return Err(DiskBufferError::Layout("checksum mismatch".to_string()));
        }

        Ok(bincode::deserialize(payload)?)
    }
}
