//! Persistent map from index id to root page id.
//!
//! Lives on physical page 1 of the database file. Page layout:
//! ```text
//! +------------------+ 0
//! | entry count (4)  |
//! +------------------+ 4
//! | entries          |  <- (index_id: u32, root_page_id: i32) pairs,
//! |                  |     sorted by index id
//! +------------------+ PAGE_SIZE
//! ```
//! Only live entries are serialized; the count is authoritative.

use lode_common::page::{PageId, PAGE_SIZE};

/// Operations over the raw index-roots page.
pub struct IndexRootsPage;

impl IndexRootsPage {
    const ENTRIES_OFFSET: usize = 4;
    const ENTRY_SIZE: usize = 8;

    /// Maximum number of indexes the page can record.
    pub const MAX_ENTRIES: usize = (PAGE_SIZE - Self::ENTRIES_OFFSET) / Self::ENTRY_SIZE;

    /// Returns the number of recorded indexes.
    pub fn count(data: &[u8]) -> u32 {
        u32::from_le_bytes([data[0], data[1], data[2], data[3]])
    }

    fn set_count(data: &mut [u8], count: u32) {
        data[0..4].copy_from_slice(&count.to_le_bytes());
    }

    fn entry_offset(index: usize) -> usize {
        Self::ENTRIES_OFFSET + index * Self::ENTRY_SIZE
    }

    fn index_id_at(data: &[u8], index: usize) -> u32 {
        let offset = Self::entry_offset(index);
        u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    }

    fn root_at(data: &[u8], index: usize) -> PageId {
        let offset = Self::entry_offset(index) + 4;
        PageId(i32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]))
    }

    fn write_entry(data: &mut [u8], index: usize, index_id: u32, root: PageId) {
        let offset = Self::entry_offset(index);
        data[offset..offset + 4].copy_from_slice(&index_id.to_le_bytes());
        data[offset + 4..offset + 8].copy_from_slice(&root.0.to_le_bytes());
    }

    /// Binary search over the sorted entries.
    fn find(data: &[u8], index_id: u32) -> Result<usize, usize> {
        let count = Self::count(data) as usize;
        let mut low = 0;
        let mut high = count;
        while low < high {
            let mid = low + (high - low) / 2;
            match Self::index_id_at(data, mid).cmp(&index_id) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }
        Err(low)
    }

    /// Returns the recorded root for an index.
    pub fn get_root_id(data: &[u8], index_id: u32) -> Option<PageId> {
        Self::find(data, index_id).ok().map(|i| Self::root_at(data, i))
    }

    /// Records a new index. Fails if the id is already present or the page
    /// is full.
    pub fn insert(data: &mut [u8], index_id: u32, root: PageId) -> bool {
        let count = Self::count(data) as usize;
        if count >= Self::MAX_ENTRIES {
            return false;
        }
        let Err(position) = Self::find(data, index_id) else {
            return false;
        };
        let start = Self::entry_offset(position);
        let end = Self::entry_offset(count);
        data.copy_within(start..end, start + Self::ENTRY_SIZE);
        Self::write_entry(data, position, index_id, root);
        Self::set_count(data, count as u32 + 1);
        true
    }

    /// Updates the root of a recorded index. Fails if the id is absent.
    pub fn update(data: &mut [u8], index_id: u32, root: PageId) -> bool {
        match Self::find(data, index_id) {
            Ok(position) => {
                Self::write_entry(data, position, index_id, root);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes a recorded index. Fails if the id is absent.
    pub fn delete(data: &mut [u8], index_id: u32) -> bool {
        let count = Self::count(data) as usize;
        match Self::find(data, index_id) {
            Ok(position) => {
                let start = Self::entry_offset(position + 1);
                let end = Self::entry_offset(count);
                data.copy_within(start..end, Self::entry_offset(position));
                Self::set_count(data, count as u32 - 1);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_page() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    #[test]
    fn test_empty_page() {
        let data = fresh_page();
        assert_eq!(IndexRootsPage::count(&data), 0);
        assert_eq!(IndexRootsPage::get_root_id(&data, 1), None);
    }

    #[test]
    fn test_insert_and_get() {
        let mut data = fresh_page();
        assert!(IndexRootsPage::insert(&mut data, 3, PageId(30)));
        assert!(IndexRootsPage::insert(&mut data, 1, PageId(10)));
        assert!(IndexRootsPage::insert(&mut data, 2, PageId(20)));

        assert_eq!(IndexRootsPage::count(&data), 3);
        assert_eq!(IndexRootsPage::get_root_id(&data, 1), Some(PageId(10)));
        assert_eq!(IndexRootsPage::get_root_id(&data, 2), Some(PageId(20)));
        assert_eq!(IndexRootsPage::get_root_id(&data, 3), Some(PageId(30)));

        // Entries stay sorted by index id.
        assert_eq!(IndexRootsPage::index_id_at(&data, 0), 1);
        assert_eq!(IndexRootsPage::index_id_at(&data, 2), 3);
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let mut data = fresh_page();
        assert!(IndexRootsPage::insert(&mut data, 1, PageId(10)));
        assert!(!IndexRootsPage::insert(&mut data, 1, PageId(99)));
        assert_eq!(IndexRootsPage::get_root_id(&data, 1), Some(PageId(10)));
    }

    #[test]
    fn test_update() {
        let mut data = fresh_page();
        IndexRootsPage::insert(&mut data, 1, PageId(10));
        assert!(IndexRootsPage::update(&mut data, 1, PageId(77)));
        assert_eq!(IndexRootsPage::get_root_id(&data, 1), Some(PageId(77)));
        assert!(!IndexRootsPage::update(&mut data, 9, PageId(1)));
    }

    #[test]
    fn test_update_to_invalid_root() {
        let mut data = fresh_page();
        IndexRootsPage::insert(&mut data, 1, PageId(10));
        assert!(IndexRootsPage::update(&mut data, 1, PageId::INVALID));
        assert_eq!(IndexRootsPage::get_root_id(&data, 1), Some(PageId::INVALID));
    }

    #[test]
    fn test_delete() {
        let mut data = fresh_page();
        IndexRootsPage::insert(&mut data, 1, PageId(10));
        IndexRootsPage::insert(&mut data, 2, PageId(20));
        IndexRootsPage::insert(&mut data, 3, PageId(30));

        assert!(IndexRootsPage::delete(&mut data, 2));
        assert_eq!(IndexRootsPage::count(&data), 2);
        assert_eq!(IndexRootsPage::get_root_id(&data, 2), None);
        assert_eq!(IndexRootsPage::get_root_id(&data, 1), Some(PageId(10)));
        assert_eq!(IndexRootsPage::get_root_id(&data, 3), Some(PageId(30)));
        assert!(!IndexRootsPage::delete(&mut data, 2));
    }

    #[test]
    fn test_fills_to_capacity() {
        let mut data = fresh_page();
        for i in 0..IndexRootsPage::MAX_ENTRIES as u32 {
            assert!(IndexRootsPage::insert(&mut data, i, PageId(i as i32)));
        }
        assert!(!IndexRootsPage::insert(
            &mut data,
            IndexRootsPage::MAX_ENTRIES as u32,
            PageId(0)
        ));
    }
}
