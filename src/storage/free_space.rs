//! Free-Space Map
//!
//! Tracks unused byte ranges of the backing file and hands out positions.
//!
//! ## Data Structure Choice
//! Two ordered indexes over the same set of free blocks, keyed by the block's
//! position (its handle):
//! - `by_position`: position → size, for neighbor lookups when merging and
//!   for in-place growth
//! - `by_size`: (size, position), for allocation queries
//!
//! Both are updated together through `insert_block` / `remove_block`, so
//! they always describe the same blocks.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::{DiskBufferError, Result};

/// A contiguous unused byte range of the backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBlock {
    /// First byte of the range
    pub position: u64,
    /// Number of bytes in the range
    pub size: u64,
}

impl FreeBlock {
    pub fn new(position: u64, size: u64) -> Self {
        FreeBlock { position, size }
    }

    /// One past the last byte of the range
    pub fn end(&self) -> u64 {
        self.position + self.size
    }

    /// Check if `other` starts exactly where this block ends
    pub fn touches(&self, other: &FreeBlock) -> bool {
        self.end() == other.position
    }
}

/// Free-space map and allocator for the backing file
///
/// Invariants (at every quiescent point):
/// - free blocks never overlap
/// - free bytes + allocated bytes == `file_length`
/// - no operation here lowers `file_length`; only the owner may reset it
#[derive(Debug, Default)]
pub struct FreeSpaceMap {
    /// Free blocks: position → size
    by_position: BTreeMap<u64, u64>,

    /// Free blocks ordered by (size, position)
    by_size: BTreeSet<(u64, u64)>,

    /// First never-allocated byte offset
    file_length: u64,
}

impl FreeSpaceMap {
    /// Create an empty map for an empty file
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map for a file whose first `file_length` bytes are in use
    pub fn with_file_length(file_length: u64) -> Self {
        Self {
            file_length,
            ..Self::default()
        }
    }

    // =========================================================================
    // Space Management
    // =========================================================================

    /// Return `[position, position + size)` to the free pool
    ///
    /// Merges eagerly with a free neighbor on either side. Freeing a range
    /// outside the file, or one that overlaps free space, is an error and
    /// leaves the map untouched.
    pub fn free_block(&mut self, position: u64, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        self.check_allocated(position, size)?;

        let mut start = position;
        let mut len = size;
        let end = position + size;

        let prev = self
            .by_position
            .range(..position)
            .next_back()
            .map(|(&p, &s)| (p, s));
        if let Some((prev_pos, prev_size)) = prev {
            if prev_pos + prev_size == position {
                self.remove_block(prev_pos);
                start = prev_pos;
                len += prev_size;
            }
        }

        if let Some(next_size) = self.by_position.get(&end).copied() {
            self.remove_block(end);
            len += next_size;
        }

        self.insert_block(start, len);
        trace!(position, size, merged_start = start, merged_len = len, "Freed block");
        Ok(())
    }

    /// Find room for `size` bytes and return its position
    ///
    /// Takes the first free block, in ascending size order, that is large
    /// enough, splitting off the unused tail. With no such block the range is
    /// appended at end of file. Never fails.
    pub fn allocate(&mut self, size: u64) -> u64 {
        if size == 0 {
            return self.file_length;
        }

        let fit = self.by_size.range((size, 0)..).next().copied();
        if let Some((block_size, position)) = fit {
            self.remove_block(position);
            if block_size > size {
                self.insert_block(position + size, block_size - size);
            }
            trace!(position, size, block_size, "Allocated from free block");
            return position;
        }

        let position = self.file_length;
        self.file_length += size;
        debug!(position, size, file_length = self.file_length, "Allocated at end of file");
        position
    }

    /// Resize the allocation `[old_position, +old_size)` to `new_size`
    ///
    /// - Shrinking keeps the position and frees the tail.
    /// - Growing keeps the position when the range right after it is free
    ///   and large enough (any remainder stays free).
    /// - Otherwise a new range is allocated and the old one freed; the
    ///   caller moves the data.
    ///
    /// The old range must be allocated and inside the file, whichever way
    /// the size changes.
    pub fn relocate(&mut self, old_position: u64, old_size: u64, new_size: u64) -> Result<u64> {
        self.check_allocated(old_position, old_size)?;

        if new_size <= old_size {
            self.free_block(old_position + new_size, old_size - new_size)?;
            return Ok(old_position);
        }

        let growth = new_size - old_size;
        let end = old_position + old_size;

        if let Some(next_size) = self.by_position.get(&end).copied() {
            if next_size >= growth {
                self.remove_block(end);
                if next_size > growth {
                    self.insert_block(end + growth, next_size - growth);
                }
                debug!(old_position, old_size, new_size, "Grew allocation in place");
                return Ok(old_position);
            }
        }

        let new_position = self.allocate(new_size);
        self.free_block(old_position, old_size)?;
        debug!(old_position, new_position, old_size, new_size, "Relocated allocation");
        Ok(new_position)
    }

    /// Merge every run of touching free blocks
    ///
    /// The whole map is validated first; overlapping blocks or blocks past
    /// end of file abort the pass without modifying anything. Returns the
    /// number of blocks merged away.
    pub fn defrag_free_blocks(&mut self) -> Result<usize> {
        let mut prev: Option<FreeBlock> = None;
        for (&position, &size) in &self.by_position {
            let block = FreeBlock::new(position, size);
            if let Some(p) = prev {
                if p.end() > block.position {
                    return Err(DiskBufferError::CorruptFreeSpace(format!(
                        "free blocks [{}, +{}) and [{}, +{}) overlap",
                        p.position, p.size, block.position, block.size
                    )));
                }
            }
            prev = Some(block);
        }
        if let Some(last) = prev {
            if last.end() > self.file_length {
                return Err(DiskBufferError::CorruptFreeSpace(format!(
                    "free block [{}, +{}) extends past end of file {}",
                    last.position, last.size, self.file_length
                )));
            }
        }

        let before = self.by_position.len();
        let mut merged: Vec<FreeBlock> = Vec::with_capacity(before);
        for (&position, &size) in &self.by_position {
            match merged.last_mut() {
                Some(last) if last.end() == position => last.size += size,
                _ => merged.push(FreeBlock::new(position, size)),
            }
        }

        self.by_position = merged.iter().map(|b| (b.position, b.size)).collect();
        self.by_size = merged.iter().map(|b| (b.size, b.position)).collect();

        let merges = before - merged.len();
        info!(merges, blocks = merged.len(), "Defragmented free space");
        Ok(merges)
    }

    // =========================================================================
    // Introspection / Persistence
    // =========================================================================

    /// Snapshot of the free blocks in position order
    pub fn free_space_vector(&self) -> Vec<FreeBlock> {
        self.by_position
            .iter()
            .map(|(&position, &size)| FreeBlock::new(position, size))
            .collect()
    }

    /// Replace the free blocks with a saved snapshot
    ///
    /// Blocks are taken verbatim (touching blocks are not merged; run
    /// `defrag_free_blocks` for that). Empty blocks are skipped.
    pub fn set_free_space_vector(&mut self, blocks: &[FreeBlock]) -> Result<()> {
        self.restore(self.file_length, blocks)
    }

    /// Replace both the file length and the free blocks
    pub fn restore(&mut self, file_length: u64, blocks: &[FreeBlock]) -> Result<()> {
        let mut by_position = BTreeMap::new();
        for block in blocks.iter().filter(|b| b.size > 0) {
            let end = block.position.checked_add(block.size);
            if end.map_or(true, |end| end > file_length) {
                return Err(DiskBufferError::InvalidRange {
                    position: block.position,
                    size: block.size,
                    file_length,
                });
            }
            if by_position.insert(block.position, block.size).is_some() {
                return Err(DiskBufferError::CorruptFreeSpace(format!(
                    "duplicate free block at position {}",
                    block.position
                )));
            }
        }

        self.by_size = by_position.iter().map(|(&p, &s)| (s, p)).collect();
        self.by_position = by_position;
        self.file_length = file_length;
        Ok(())
    }

    /// First never-allocated byte offset
    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    /// Reset the file length (e.g. when reopening a saved file)
    ///
    /// Rejected if a free block would end past the new length.
    pub fn set_file_length(&mut self, length: u64) -> Result<()> {
        if let Some((&position, &size)) = self.by_position.iter().next_back() {
            if position + size > length {
                return Err(DiskBufferError::InvalidRange {
                    position,
                    size,
                    file_length: length,
                });
            }
        }
        self.file_length = length;
        Ok(())
    }

    /// Total free bytes
    pub fn free_space(&self) -> u64 {
        self.by_position.values().sum()
    }

    /// Number of free blocks (fragmentation indicator)
    pub fn block_count(&self) -> usize {
        self.by_position.len()
    }

    /// The largest free block, lowest position first among equals
    pub fn largest_block(&self) -> Option<FreeBlock> {
        let max = self.by_size.iter().next_back()?.0;
        self.by_size
            .range((max, 0)..)
            .next()
            .map(|&(size, position)| FreeBlock::new(position, size))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn insert_block(&mut self, position: u64, size: u64) {
        self.by_position.insert(position, size);
        self.by_size.insert((size, position));
    }

    fn remove_block(&mut self, position: u64) -> Option<u64> {
        let size = self.by_position.remove(&position)?;
        self.by_size.remove(&(size, position));
        Some(size)
    }

    /// Ensure `[position, +size)` is inside the file and touches no free block
    fn check_allocated(&self, position: u64, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }

        let end = match position.checked_add(size) {
            Some(end) if end <= self.file_length => end,
            _ => {
                return Err(DiskBufferError::InvalidRange {
                    position,
                    size,
                    file_length: self.file_length,
                })
            }
        };

        let overlaps_prev = self
            .by_position
            .range(..=position)
            .next_back()
            .map_or(false, |(&p, &s)| p + s > position);
        let overlaps_next = self.by_position.range(position..end).next().is_some();

        if overlaps_prev || overlaps_next {
            return Err(DiskBufferError::DoubleFree { position, size });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indexes_agree(map: &FreeSpaceMap) {
        let from_size: BTreeSet<(u64, u64)> =
            map.by_position.iter().map(|(&p, &s)| (s, p)).collect();
        assert_eq!(from_size, map.by_size);
    }

    #[test]
    fn test_indexes_agree_through_churn() {
        let mut map = FreeSpaceMap::new();
        let a = map.allocate(10);
        let b = map.allocate(20);
        let c = map.allocate(30);
        let _d = map.allocate(40);

        map.free_block(b, 20).unwrap();
        assert_indexes_agree(&map);
        map.free_block(a, 10).unwrap();
        assert_indexes_agree(&map);
        let e = map.allocate(25);
        assert_indexes_agree(&map);
        map.relocate(c, 30, 35).unwrap();
        assert_indexes_agree(&map);
        map.free_block(e, 25).unwrap();
        assert_indexes_agree(&map);
    }

    #[test]
    fn test_check_allocated_rejects_overflow() {
        let map = FreeSpaceMap::with_file_length(100);
        assert!(matches!(
            map.check_allocated(u64::MAX - 1, 10),
            Err(DiskBufferError::InvalidRange { .. })
        ));
    }
}
