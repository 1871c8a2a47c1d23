//! Storage Module
//!
//! Everything that knows about the backing file's byte space.
//!
//! ## Responsibilities
//! - Positional reads/writes on the single backing file
//! - Track free ranges; allocate, relocate and defragment them
//! - Persist the free-space layout alongside the data file
//!
//! ## Backing File Layout
//! ```text
//! 0                                                     file_length
//! ┌──────────┬────────┬──────────────┬──────┬──────────┐
//! │ object 3 │  free  │   object 1   │ free │ object 2 │
//! └──────────┴────────┴──────────────┴──────┴──────────┘
//! ```
//! The layout is owned entirely by the free-space map: there is no header,
//! and every byte below `file_length` is either free or owned by exactly one
//! object.

mod file;
mod free_space;
mod layout;

pub use file::BackingFile;
pub use free_space::{FreeBlock, FreeSpaceMap};
pub use layout::FreeSpaceLayout;
