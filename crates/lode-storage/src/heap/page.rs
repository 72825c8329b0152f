//! Slotted table page.
//!
//! Page layout:
//! ```text
//! +-------------------------+ 0
//! | page_id            (4)  |
//! | prev_page_id       (4)  |
//! | next_page_id       (4)  |
//! | free_space_pointer (4)  |
//! | tuple_count        (4)  |
//! +-------------------------+ 20
//! | slot array              |  <- grows forward, 8 bytes per slot
//! | [offset:4, length:4]    |
//! +-------------------------+
//! |      free space         |
//! +-------------------------+ free_space_pointer
//! | tuple data              |  <- grows backward from PAGE_SIZE
//! +-------------------------+ PAGE_SIZE
//! ```
//!
//! A slot length of zero marks a tombstone whose space has been reclaimed.
//! The high bit of the length marks a delete in progress (two-phase
//! delete): the tuple bytes stay in place until `apply_delete` compacts
//! them away, and `rollback_delete` clears the mark.
//!
//! All operations are associated functions over raw page buffers so they
//! can run in place under a frame's content latch.

use crate::record::Row;
use crate::txn::{LockManager, LogManager, Transaction};
use lode_common::page::{PageId, RowId, PAGE_SIZE};

/// Marks a slot whose delete is in progress.
const DELETE_MASK: u32 = 1 << 31;

/// Slotted page operations over raw page buffers.
pub struct TablePage;

impl TablePage {
    /// Size of the page header in bytes.
    pub const HEADER_SIZE: usize = 20;

    /// Size of one slot entry in bytes.
    pub const SLOT_SIZE: usize = 8;

    fn read_i32(data: &[u8], offset: usize) -> i32 {
        i32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    }

    fn read_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    }

    fn write_i32(data: &mut [u8], offset: usize, value: i32) {
        data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn write_u32(data: &mut [u8], offset: usize, value: u32) {
        data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Formats an empty table page.
    pub fn init(
        data: &mut [u8],
        page_id: PageId,
        prev_page_id: PageId,
        _log_manager: Option<&LogManager>,
        _txn: Option<&Transaction>,
    ) {
        Self::write_i32(data, 0, page_id.0);
        Self::write_i32(data, 4, prev_page_id.0);
        Self::write_i32(data, 8, PageId::INVALID.0);
        Self::write_u32(data, 12, PAGE_SIZE as u32);
        Self::write_u32(data, 16, 0);
    }

    /// Returns the page's own id.
    pub fn page_id(data: &[u8]) -> PageId {
        PageId(Self::read_i32(data, 0))
    }

    /// Returns the previous page in the heap chain.
    pub fn prev_page_id(data: &[u8]) -> PageId {
        PageId(Self::read_i32(data, 4))
    }

    /// Sets the previous page in the heap chain.
    pub fn set_prev_page_id(data: &mut [u8], prev: PageId) {
        Self::write_i32(data, 4, prev.0);
    }

    /// Returns the next page in the heap chain.
    pub fn next_page_id(data: &[u8]) -> PageId {
        PageId(Self::read_i32(data, 8))
    }

    /// Sets the next page in the heap chain.
    pub fn set_next_page_id(data: &mut [u8], next: PageId) {
        Self::write_i32(data, 8, next.0);
    }

    fn free_space_pointer(data: &[u8]) -> u32 {
        Self::read_u32(data, 12)
    }

    fn set_free_space_pointer(data: &mut [u8], pointer: u32) {
        Self::write_u32(data, 12, pointer);
    }

    /// Returns the number of slots, tombstones included.
    pub fn tuple_count(data: &[u8]) -> u32 {
        Self::read_u32(data, 16)
    }

    fn set_tuple_count(data: &mut [u8], count: u32) {
        Self::write_u32(data, 16, count);
    }

    fn slot_offset(slot: u32) -> usize {
        Self::HEADER_SIZE + slot as usize * Self::SLOT_SIZE
    }

    fn tuple_offset(data: &[u8], slot: u32) -> u32 {
        Self::read_u32(data, Self::slot_offset(slot))
    }

    fn set_tuple_offset(data: &mut [u8], slot: u32, offset: u32) {
        Self::write_u32(data, Self::slot_offset(slot), offset);
    }

    fn tuple_length_raw(data: &[u8], slot: u32) -> u32 {
        Self::read_u32(data, Self::slot_offset(slot) + 4)
    }

    fn set_tuple_length_raw(data: &mut [u8], slot: u32, length: u32) {
        Self::write_u32(data, Self::slot_offset(slot) + 4, length);
    }

    fn is_delete_marked(length_raw: u32) -> bool {
        length_raw & DELETE_MASK != 0
    }

    fn is_live(data: &[u8], slot: u32) -> bool {
        let raw = Self::tuple_length_raw(data, slot);
        raw != 0 && !Self::is_delete_marked(raw)
    }

    /// Returns the contiguous free space between the slot array and the
    /// tuple area.
    pub fn free_space(data: &[u8]) -> u32 {
        let slot_end = Self::slot_offset(Self::tuple_count(data)) as u32;
        Self::free_space_pointer(data).saturating_sub(slot_end)
    }

    /// Inserts a serialized row. On success the row's id is updated to
    /// (this page, slot).
    ///
    /// Returns false if the page cannot hold the tuple.
    pub fn insert_tuple(
        data: &mut [u8],
        row: &mut Row,
        _txn: Option<&Transaction>,
        _lock_manager: Option<&LockManager>,
        _log_manager: Option<&LogManager>,
    ) -> bool {
        let payload = row.to_bytes();
        let size = payload.len() as u32;
        if size == 0 {
            return false;
        }

        // Prefer a reclaimed slot over growing the slot array.
        let count = Self::tuple_count(data);
        let reuse = (0..count).find(|&i| Self::tuple_length_raw(data, i) == 0);

        let needed = if reuse.is_some() {
            size
        } else {
            size + Self::SLOT_SIZE as u32
        };
        if Self::free_space(data) < needed {
            return false;
        }

        let pointer = Self::free_space_pointer(data) - size;
        data[pointer as usize..(pointer + size) as usize].copy_from_slice(&payload);
        Self::set_free_space_pointer(data, pointer);

        let slot = match reuse {
            Some(slot) => slot,
            None => {
                Self::set_tuple_count(data, count + 1);
                count
            }
        };
        Self::set_tuple_offset(data, slot, pointer);
        Self::set_tuple_length_raw(data, slot, size);

        row.set_rid(RowId::new(Self::page_id(data), slot));
        true
    }

    /// Reads the live tuple at `rid`.
    ///
    /// Tombstoned, delete-marked, and out-of-range slots read as absent.
    pub fn get_tuple(
        data: &[u8],
        rid: RowId,
        _txn: Option<&Transaction>,
        _lock_manager: Option<&LockManager>,
    ) -> Option<Row> {
        if rid.slot >= Self::tuple_count(data) || !Self::is_live(data, rid.slot) {
            return None;
        }
        let offset = Self::tuple_offset(data, rid.slot) as usize;
        let length = Self::tuple_length_raw(data, rid.slot) as usize;
        if offset + length > PAGE_SIZE {
            return None;
        }
        let mut row = Row::from_bytes(&data[offset..offset + length])?;
        row.set_rid(rid);
        Some(row)
    }

    /// Phase one of a delete: marks the slot without touching the bytes.
    pub fn mark_delete(
        data: &mut [u8],
        rid: RowId,
        _txn: Option<&Transaction>,
        _lock_manager: Option<&LockManager>,
        _log_manager: Option<&LogManager>,
    ) -> bool {
        if rid.slot >= Self::tuple_count(data) {
            return false;
        }
        let raw = Self::tuple_length_raw(data, rid.slot);
        if raw == 0 {
            return false;
        }
        Self::set_tuple_length_raw(data, rid.slot, raw | DELETE_MASK);
        true
    }

    /// Undoes `mark_delete`.
    pub fn rollback_delete(
        data: &mut [u8],
        rid: RowId,
        _txn: Option<&Transaction>,
        _log_manager: Option<&LogManager>,
    ) -> bool {
        if rid.slot >= Self::tuple_count(data) {
            return false;
        }
        let raw = Self::tuple_length_raw(data, rid.slot);
        if raw == 0 {
            return false;
        }
        Self::set_tuple_length_raw(data, rid.slot, raw & !DELETE_MASK);
        true
    }

    /// Phase two of a delete: removes the tuple bytes, compacting the
    /// tuple area and rewriting every slot that pointed below it.
    pub fn apply_delete(
        data: &mut [u8],
        rid: RowId,
        _txn: Option<&Transaction>,
        _log_manager: Option<&LogManager>,
    ) -> bool {
        if rid.slot >= Self::tuple_count(data) {
            return false;
        }
        let raw = Self::tuple_length_raw(data, rid.slot);
        let length = raw & !DELETE_MASK;
        if length == 0 {
            return false;
        }
        let offset = Self::tuple_offset(data, rid.slot);
        let pointer = Self::free_space_pointer(data);
        if (offset + length) as usize > PAGE_SIZE || offset < pointer {
            return false;
        }

        // Close the gap: everything below the deleted tuple moves up.
        data.copy_within(pointer as usize..offset as usize, (pointer + length) as usize);
        Self::set_free_space_pointer(data, pointer + length);
        Self::set_tuple_offset(data, rid.slot, 0);
        Self::set_tuple_length_raw(data, rid.slot, 0);

        let count = Self::tuple_count(data);
        for slot in 0..count {
            let slot_raw = Self::tuple_length_raw(data, slot);
            if slot_raw == 0 {
                continue;
            }
            let slot_offset = Self::tuple_offset(data, slot);
            if slot_offset < offset {
                Self::set_tuple_offset(data, slot, slot_offset + length);
            }
        }
        true
    }

    /// Rewrites the tuple at `rid` in place, shifting the tuple area when
    /// the size changes. The previous contents are returned through
    /// `old_row`.
    ///
    /// Returns false (leaving the page unchanged) when the slot is absent,
    /// delete-marked, or the new tuple does not fit; the caller falls back
    /// to delete + reinsert.
    pub fn update_tuple(
        data: &mut [u8],
        new_row: &mut Row,
        old_row: &mut Row,
        rid: RowId,
        _txn: Option<&Transaction>,
        _lock_manager: Option<&LockManager>,
        _log_manager: Option<&LogManager>,
    ) -> bool {
        if rid.slot >= Self::tuple_count(data) {
            return false;
        }
        let raw = Self::tuple_length_raw(data, rid.slot);
        if raw == 0 || Self::is_delete_marked(raw) {
            return false;
        }
        let old_size = raw;
        let payload = new_row.to_bytes();
        let new_size = payload.len() as u32;
        if Self::free_space(data) + old_size < new_size {
            return false;
        }

        let offset = Self::tuple_offset(data, rid.slot);
        if let Some(previous) =
            Self::get_tuple(data, rid, None, None)
        {
            *old_row = previous;
        } else {
            return false;
        }

        // Shift the tuple area below this tuple by the size delta.
        let pointer = Self::free_space_pointer(data);
        let new_pointer = (pointer as i64 + old_size as i64 - new_size as i64) as u32;
        data.copy_within(pointer as usize..offset as usize, new_pointer as usize);
        Self::set_free_space_pointer(data, new_pointer);

        let new_offset = (offset as i64 + old_size as i64 - new_size as i64) as u32;
        data[new_offset as usize..(new_offset + new_size) as usize].copy_from_slice(&payload);
        Self::set_tuple_offset(data, rid.slot, new_offset);
        Self::set_tuple_length_raw(data, rid.slot, new_size);

        let count = Self::tuple_count(data);
        for slot in 0..count {
            if slot == rid.slot {
                continue;
            }
            let slot_raw = Self::tuple_length_raw(data, slot);
            if slot_raw == 0 {
                continue;
            }
            let slot_offset = Self::tuple_offset(data, slot);
            if slot_offset < offset {
                Self::set_tuple_offset(
                    data,
                    slot,
                    (slot_offset as i64 + old_size as i64 - new_size as i64) as u32,
                );
            }
        }

        new_row.set_rid(rid);
        true
    }

    /// Returns the first live row id on this page.
    pub fn get_first_tuple_rid(data: &[u8]) -> Option<RowId> {
        let count = Self::tuple_count(data);
        (0..count)
            .find(|&slot| Self::is_live(data, slot))
            .map(|slot| RowId::new(Self::page_id(data), slot))
    }

    /// Returns the next live row id after `current` on this page.
    pub fn get_next_tuple_rid(data: &[u8], current: RowId) -> Option<RowId> {
        let count = Self::tuple_count(data);
        (current.slot + 1..count)
            .find(|&slot| Self::is_live(data, slot))
            .map(|slot| RowId::new(Self::page_id(data), slot))
    }
}
