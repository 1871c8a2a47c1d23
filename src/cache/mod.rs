//! Cache Module
//!
//! In-memory bookkeeping that decides when objects leave memory.
//!
//! ## Responsibilities
//! - [`MruList`]: keep the most recently used objects within a memory budget
//! - [`WriteBuffer`]: stage evicted / dirty objects for position-ordered writes
//! - [`SmallObjectPool`]: pin objects too small to be worth paging
//!
//! These types are not synchronized themselves; `DiskBuffer` guards the MRU
//! list and write buffer with one lock (eviction writes straight into the
//! buffer) and the pool with another.

mod mru;
mod small_pool;
mod write_buffer;

pub use mru::MruList;
pub use small_pool::SmallObjectPool;
pub use write_buffer::WriteBuffer;
