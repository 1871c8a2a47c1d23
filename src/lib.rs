//! # DiskBuffer
//!
//! A disk-backed MRU cache and byte-range allocator for paging very large
//! collections of variable-sized objects to and from one backing file:
//! - Most-recently-used residency under a memory budget
//! - Deferred writes, batched and sorted by file position
//! - Free-space allocator with in-place growth and defragmentation
//! - Bypass pool for objects too small to page
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Owning Collection                          │
//! │          (worker threads, disjoint object subsets)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ loading / to_write / object_deleted
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     DiskBuffer                               │
//! └───────┬─────────────────────┬──────────────────────┬────────┘
//!         │                     │                      │
//!         ▼                     ▼                      ▼
//!  ┌─────────────┐   ┌─────────────────────┐   ┌──────────────┐
//!  │ Small-Object│   │  MRU List ─evict─▶  │   │  Free-Space  │
//!  │    Pool     │   │     Write Buffer    │──▶│     Map      │
//!  │  (Mutex)    │   │      (Mutex)        │   │   (Mutex)    │
//!  └─────────────┘   └──────────┬──────────┘   └──────────────┘
//!                               │ save(position)
//!                               ▼
//!                       ┌───────────────┐
//!                       │ Backing File  │
//!                       └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod object;
pub mod storage;
pub mod cache;
pub mod disk_buffer;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DiskBufferError, Result};
pub use config::Config;
pub use disk_buffer::{BufferStats, DiskBuffer};
pub use object::{BlobObject, ObjectId, ObjectRef, PageableObject};
pub use storage::{BackingFile, FreeBlock, FreeSpaceLayout, FreeSpaceMap};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of DiskBuffer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
