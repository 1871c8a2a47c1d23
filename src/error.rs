//! Error types for DiskBuffer
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::object::ObjectId;

/// Result type alias using DiskBufferError
pub type Result<T> = std::result::Result<T, DiskBufferError>;

/// Unified error type for DiskBuffer operations
#[derive(Debug, Error)]
pub enum DiskBufferError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A pageable object's save routine failed; the object stays buffered
    #[error("Failed to write object {id} at position {position}: {source}")]
    Write {
        id: ObjectId,
        position: u64,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Free-Space Errors
    // -------------------------------------------------------------------------
    #[error("Range [{position}, +{size}) lies outside the file (length {file_length})")]
    InvalidRange {
        position: u64,
        size: u64,
        file_length: u64,
    },

    #[error("Range [{position}, +{size}) overlaps space that is already free")]
    DoubleFree { position: u64, size: u64 },

    #[error("Free-space map corrupted: {0}")]
    CorruptFreeSpace(String),

    // -------------------------------------------------------------------------
    // Layout Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Layout file error: {0}")]
    Layout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for DiskBufferError {
    fn from(e: bincode::Error) -> Self {
        DiskBufferError::Serialization(e.to_string())
    }
}
