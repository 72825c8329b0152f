//! Ordered iterator over B+ tree entries.

use crate::index::key::IndexKey;
use crate::index::node::{LeafNode, NodeHeader};
use lode_buffer::BufferPool;
use lode_common::page::{PageId, RowId};
use std::marker::PhantomData;

/// Cursor over the leaf chain in ascending key order.
///
/// The iterator owns a pin on its current leaf so the frame cannot be
/// evicted underneath it; the pin moves with the cursor as it crosses leaf
/// boundaries and is released on drop. A cursor whose position is one past
/// the last entry of the rightmost leaf equals the tree's `end()` cursor.
pub struct IndexIterator<'a, K: IndexKey> {
    pool: &'a BufferPool,
    page_id: PageId,
    index: u32,
    _marker: PhantomData<K>,
}

impl<'a, K: IndexKey> IndexIterator<'a, K> {
    /// Creates a cursor at (page, index), pinning the page. An invalid
    /// page id yields the exhausted cursor.
    pub(crate) fn new(pool: &'a BufferPool, page_id: PageId, index: u32) -> Self {
        let page_id = if page_id.is_valid() && pool.fetch_page(page_id).is_some() {
            page_id
        } else {
            PageId::INVALID
        };
        Self {
            pool,
            page_id,
            index,
            _marker: PhantomData,
        }
    }

    /// Returns the cursor position as (leaf page, entry index).
    pub fn position(&self) -> (PageId, u32) {
        (self.page_id, self.index)
    }
}

impl<K: IndexKey> PartialEq for IndexIterator<'_, K> {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id && self.index == other.index
    }
}

impl<K: IndexKey> Iterator for IndexIterator<'_, K> {
    type Item = (K, RowId);

    fn next(&mut self) -> Option<(K, RowId)> {
        loop {
            if !self.page_id.is_valid() {
                return None;
            }
            let frame = self.pool.fetch_page(self.page_id)?;
            let data = frame.read_data();
            let size = NodeHeader::size(&**data);

            if self.index < size {
                let key = LeafNode::<K>::key_at(&**data, self.index);
                let value = LeafNode::<K>::value_at(&**data, self.index);
                drop(data);
                self.pool.unpin_page(self.page_id, false);
                self.index += 1;
                return Some((key, value));
            }

            let next_leaf = LeafNode::<K>::next_page_id(&**data);
            drop(data);
            self.pool.unpin_page(self.page_id, false);
            if !next_leaf.is_valid() {
                return None;
            }

            // Hand the pin over to the next leaf.
            if self.pool.fetch_page(next_leaf).is_none() {
                self.pool.unpin_page(self.page_id, false);
                self.page_id = PageId::INVALID;
                return None;
            }
            self.pool.unpin_page(self.page_id, false);
            self.page_id = next_leaf;
            self.index = 0;
        }
    }
}

impl<K: IndexKey> Drop for IndexIterator<'_, K> {
    fn drop(&mut self) {
        if self.page_id.is_valid() {
            self.pool.unpin_page(self.page_id, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::index::key::I32Comparator;
    use crate::index::tree::BPlusTree;
    use lode_buffer::BufferPool;
    use lode_common::page::{PageId, RowId};
    use lode_disk::{DiskManager, DiskManagerConfig};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_pool() -> (Arc<BufferPool>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                db_file: dir.path().join("iter.db"),
                fsync_enabled: false,
            })
            .unwrap(),
        );
        (Arc::new(BufferPool::new(64, disk)), dir)
    }

    fn rid(key: i32) -> RowId {
        RowId::new(PageId(key), key as u32)
    }

    #[test]
    fn test_scan_in_order() {
        let (pool, _dir) = test_pool();
        let mut tree = BPlusTree::new(1, pool.clone(), I32Comparator, 3, 3);
        for key in [5, 1, 4, 2, 3] {
            tree.insert(key, rid(key));
        }

        let entries: Vec<_> = tree.begin().collect();
        assert_eq!(
            entries,
            vec![
                (1, rid(1)),
                (2, rid(2)),
                (3, rid(3)),
                (4, rid(4)),
                (5, rid(5)),
            ]
        );
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_begin_at_key() {
        let (pool, _dir) = test_pool();
        let mut tree = BPlusTree::new(1, pool.clone(), I32Comparator, 3, 3);
        for key in 1..=20 {
            tree.insert(key, rid(key));
        }

        let mut iter = tree.begin_at(&10);
        assert_eq!(iter.next(), Some((10, rid(10))));
        assert_eq!(iter.next(), Some((11, rid(11))));
        drop(iter);

        // An absent key positions at its successor.
        tree.remove(&15);
        let mut iter = tree.begin_at(&15);
        assert_eq!(iter.next(), Some((16, rid(16))));
        drop(iter);
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_end_equality() {
        let (pool, _dir) = test_pool();
        let mut tree = BPlusTree::new(1, pool.clone(), I32Comparator, 3, 3);
        for key in 1..=10 {
            tree.insert(key, rid(key));
        }

        let mut iter = tree.begin_at(&10);
        assert!(iter != tree.end());
        assert_eq!(iter.next(), Some((10, rid(10))));
        assert!(iter == tree.end());
        assert!(iter.next().is_none());
        // Exhausting the cursor does not move it off the end position.
        assert!(iter == tree.end());
    }

    #[test]
    fn test_empty_tree_iterators() {
        let (pool, _dir) = test_pool();
        let tree: BPlusTree<i32, I32Comparator> =
            BPlusTree::new(1, pool.clone(), I32Comparator, 3, 3);
        assert!(tree.begin() == tree.end());
        assert!(tree.begin().next().is_none());
        assert!(pool.check_all_unpinned());
    }
}
