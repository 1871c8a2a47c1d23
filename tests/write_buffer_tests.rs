//! Tests for the write buffer
//!
//! Verifies:
//! - Drains write in ascending file-position order
//! - Re-buffering keeps the reserved position unless the size changed
//! - Failed and busy writes leave objects buffered
//! - The threshold triggers a drain

mod common;

use std::sync::Arc;

use common::{blob, setup_temp_buffer, SaveLog, TrackedObject};
use diskbuffer::cache::WriteBuffer;
use diskbuffer::{DiskBufferError, FreeBlock, FreeSpaceMap, PageableObject};
use parking_lot::Mutex;

// =============================================================================
// Drain Order Tests
// =============================================================================

#[test]
fn test_drain_in_position_order() {
    let (_dir, buffer) = setup_temp_buffer(10_000, 10_000);
    let log: SaveLog = Arc::new(Mutex::new(Vec::new()));
    let objects: Vec<_> = (1..=4)
        .map(|id| TrackedObject::with_log(id, 10, Some(log.clone())))
        .collect();

    for object in &objects {
        buffer.to_write(&object.handle()).unwrap();
    }
    assert_eq!(buffer.flush_cache().unwrap(), 4);
    assert_eq!(*log.lock(), vec![1, 2, 3, 4]);
    log.lock().clear();

    // Dirty them again in reverse; positions are kept
    for object in objects.iter().rev() {
        object.inner.set_data(vec![0xAA; 10]);
        buffer.to_write(&object.handle()).unwrap();
    }
    assert_eq!(buffer.write_buffer_ids(), vec![1, 2, 3, 4]);

    assert_eq!(buffer.flush_cache().unwrap(), 4);
    assert_eq!(*log.lock(), vec![1, 2, 3, 4]);
    assert_eq!(buffer.file_length(), 40);
}

#[test]
fn test_write_buffer_ids_follow_positions() {
    let free_space = Mutex::new(FreeSpaceMap::with_file_length(100));
    free_space
        .lock()
        .set_free_space_vector(&[FreeBlock::new(10, 20), FreeBlock::new(60, 10)])
        .unwrap();

    let mut write_buffer = WriteBuffer::new();
    let (_a, a) = blob(1, 15);
    let (_b, b) = blob(2, 10);

    // Smallest fitting block first: b lands at 60, a at 10
    assert_eq!(write_buffer.enqueue(b, true, &free_space).unwrap(), 60);
    assert_eq!(write_buffer.enqueue(a, true, &free_space).unwrap(), 10);

    assert_eq!(write_buffer.ids(), vec![1, 2]);
    assert_eq!(write_buffer.used(), 25);
    assert_eq!(write_buffer.remove(1), Some(FreeBlock::new(10, 15)));
    assert_eq!(write_buffer.ids(), vec![2]);
    assert_eq!(write_buffer.used(), 10);
}

// =============================================================================
// Re-buffering Tests
// =============================================================================

#[test]
fn test_rebuffer_keeps_single_entry() {
    let (_dir, buffer) = setup_temp_buffer(10_000, 10_000);
    let object = TrackedObject::new(1, 40);
    let handle = object.handle();

    buffer.to_write(&handle).unwrap();
    let position = buffer.buffered_position(1);
    buffer.to_write(&handle).unwrap();

    assert_eq!(buffer.write_buffer_ids(), vec![1]);
    assert_eq!(buffer.buffered_position(1), position);
    assert_eq!(buffer.stats().write_buffer_used, 40);

    assert_eq!(buffer.flush_cache().unwrap(), 1);
    assert_eq!(object.save_count(), 1);
}

#[test]
fn test_rebuffer_after_growth_relocates() {
    let (_dir, buffer) = setup_temp_buffer(10_000, 10_000);
    let (a_obj, a) = blob(1, 40);
    let (_b, b) = blob(2, 40);

    buffer.to_write(&a).unwrap();
    buffer.to_write(&b).unwrap();
    assert_eq!(buffer.buffered_position(1), Some(0));
    assert_eq!(buffer.buffered_position(2), Some(40));

    a_obj.set_data(vec![7u8; 60]);
    buffer.to_write(&a).unwrap();

    assert_eq!(buffer.buffered_position(1), Some(80));
    assert_eq!(buffer.free_space_vector(), vec![FreeBlock::new(0, 40)]);
    assert_eq!(buffer.file_length(), 140);
    assert_eq!(buffer.write_buffer_ids(), vec![2, 1]);

    buffer.flush_cache().unwrap();
    assert_eq!(a.file_position(), Some(80));
    assert_eq!(a.size_on_file(), 60);
    assert_eq!(buffer.file().read_at(80, 60).unwrap(), vec![7u8; 60]);
}

#[test]
fn test_second_flush_writes_nothing() {
    let (_dir, buffer) = setup_temp_buffer(10_000, 10_000);
    let object = TrackedObject::new(1, 40);

    buffer.to_write(&object.handle()).unwrap();
    assert_eq!(buffer.flush_cache().unwrap(), 1);
    assert_eq!(buffer.flush_cache().unwrap(), 0);
    assert_eq!(object.save_count(), 1);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_failed_write_stays_buffered() {
    let (_dir, buffer) = setup_temp_buffer(10_000, 10_000);
    let object = TrackedObject::new(1, 40);
    object.set_failing(true);

    buffer.to_write(&object.handle()).unwrap();
    let result = buffer.flush_cache();

    assert!(matches!(
        result,
        Err(DiskBufferError::Write { id: 1, position: 0, .. })
    ));
    assert_eq!(buffer.write_buffer_ids(), vec![1]);
    assert_eq!(object.file_position(), None);

    object.set_failing(false);
    assert_eq!(buffer.flush_cache().unwrap(), 1);
    assert!(buffer.write_buffer_ids().is_empty());
    assert_eq!(object.file_position(), Some(0));
}

#[test]
fn test_failed_write_stops_drain() {
    let (_dir, buffer) = setup_temp_buffer(10_000, 10_000);
    let first = TrackedObject::new(1, 40);
    let second = TrackedObject::new(2, 40);
    first.set_failing(true);

    buffer.to_write(&first.handle()).unwrap();
    buffer.to_write(&second.handle()).unwrap();

    assert!(buffer.write_old_objects().is_err());
    assert_eq!(buffer.write_buffer_ids(), vec![1, 2]);
    assert_eq!(second.save_count(), 0);
}

#[test]
fn test_busy_object_skipped() {
    let (_dir, buffer) = setup_temp_buffer(10_000, 10_000);
    let (a_obj, a) = blob(1, 40);
    let (_b, b) = blob(2, 40);
    a_obj.set_busy(true);

    buffer.to_write(&a).unwrap();
    buffer.to_write(&b).unwrap();

    assert_eq!(buffer.flush_cache().unwrap(), 1);
    assert_eq!(buffer.write_buffer_ids(), vec![1]);
    assert_eq!(b.file_position(), Some(40));

    a_obj.set_busy(false);
    assert_eq!(buffer.write_old_objects().unwrap(), 1);
    assert_eq!(a.file_position(), Some(0));
}

// =============================================================================
// Threshold Tests
// =============================================================================

#[test]
fn test_threshold_triggers_drain() {
    let (_dir, buffer) = setup_temp_buffer(10_000, 50);
    let (_a, a) = blob(1, 40);
    let (_b, b) = blob(2, 40);

    buffer.to_write(&a).unwrap();
    assert_eq!(buffer.write_buffer_ids(), vec![1]);

    buffer.to_write(&b).unwrap();
    assert!(buffer.write_buffer_ids().is_empty());
    assert_eq!(buffer.file().read_at(0, 40).unwrap(), vec![1u8; 40]);
    assert_eq!(buffer.file().read_at(40, 40).unwrap(), vec![2u8; 40]);
}

#[test]
fn test_set_write_buffer_size() {
    let (_dir, buffer) = setup_temp_buffer(10_000, 1_000);
    let (_a, a) = blob(1, 40);
    buffer.to_write(&a).unwrap();

    buffer.set_write_buffer_size(10);
    assert_eq!(buffer.stats().write_buffer_size, 10);
    assert_eq!(buffer.config().write_buffer_size, 10);

    // Takes effect at the next buffering
    assert_eq!(buffer.write_buffer_ids(), vec![1]);
    let (_b, b) = blob(2, 5);
    buffer.to_write(&b).unwrap();
    assert!(buffer.write_buffer_ids().is_empty());
}
