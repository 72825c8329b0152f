//! Table heap: a doubly-linked list of slotted pages forming one relation.

use crate::heap::page::TablePage;
use crate::record::{Row, Schema};
use crate::txn::{LockManager, LogManager, Transaction};
use lode_buffer::BufferPool;
use lode_common::page::{PageId, RowId, PAGE_SIZE};
use std::sync::Arc;
use tracing::warn;

/// Per-tuple overhead budget used by the oversize check: one slot entry
/// plus header slack.
const TUPLE_OVERHEAD: usize = 32;

/// One relation stored as a chain of slotted pages.
pub struct TableHeap {
    pool: Arc<BufferPool>,
    schema: Arc<Schema>,
    first_page_id: PageId,
    lock_manager: Option<Arc<LockManager>>,
    log_manager: Option<Arc<LogManager>>,
}

impl TableHeap {
    /// Creates a new relation with one empty page.
    pub fn create(pool: Arc<BufferPool>, schema: Arc<Schema>) -> Option<Self> {
        let (first_page_id, frame) = pool.new_page()?;
        {
            let mut data = frame.write_data();
            TablePage::init(&mut **data, first_page_id, PageId::INVALID, None, None);
        }
        pool.unpin_page(first_page_id, true);
        Some(Self {
            pool,
            schema,
            first_page_id,
            lock_manager: None,
            log_manager: None,
        })
    }

    /// Opens an existing relation rooted at `first_page_id`.
    pub fn open(pool: Arc<BufferPool>, schema: Arc<Schema>, first_page_id: PageId) -> Self {
        Self {
            pool,
            schema,
            first_page_id,
            lock_manager: None,
            log_manager: None,
        }
    }

    /// Installs the execution engine's lock and log hooks.
    pub fn with_hooks(
        mut self,
        lock_manager: Option<Arc<LockManager>>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        self.lock_manager = lock_manager;
        self.log_manager = log_manager;
        self
    }

    /// Returns the first page of the chain.
    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Returns the schema of this relation.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn locks(&self) -> Option<&LockManager> {
        self.lock_manager.as_deref()
    }

    fn logs(&self) -> Option<&LogManager> {
        self.log_manager.as_deref()
    }

    /// Inserts a row, walking the chain until a page accepts it and
    /// linking a fresh page at the tail when none does. On success the
    /// row's id names its new location.
    pub fn insert_tuple(&self, row: &mut Row, txn: Option<&Transaction>) -> bool {
        if row.serialized_size() + TUPLE_OVERHEAD > PAGE_SIZE {
            return false;
        }
        if !self.schema.validate_row(row) {
            warn!("row does not match the table schema");
            return false;
        }

        let mut current = self.first_page_id;
        loop {
            let Some(frame) = self.pool.fetch_page(current) else {
                return false;
            };
            let mut data = frame.write_data();
            if TablePage::insert_tuple(&mut **data, row, txn, self.locks(), self.logs()) {
                drop(data);
                self.pool.unpin_page(current, true);
                return true;
            }

            let next = TablePage::next_page_id(&**data);
            if next.is_valid() {
                drop(data);
                self.pool.unpin_page(current, false);
                current = next;
                continue;
            }

            // Tail reached; grow the chain.
            let Some((new_page_id, new_frame)) = self.pool.new_page() else {
                drop(data);
                self.pool.unpin_page(current, false);
                return false;
            };
            let mut new_data = new_frame.write_data();
            TablePage::init(&mut **new_data, new_page_id, current, self.logs(), txn);
            TablePage::set_next_page_id(&mut **data, new_page_id);
            drop(data);
            self.pool.unpin_page(current, true);

            let inserted =
                TablePage::insert_tuple(&mut **new_data, row, txn, self.locks(), self.logs());
            drop(new_data);
            self.pool.unpin_page(new_page_id, true);
            return inserted;
        }
    }

    /// Marks the tuple at `rid` as delete-in-progress.
    pub fn mark_delete(&self, rid: RowId, txn: Option<&Transaction>) -> bool {
        let Some(frame) = self.pool.fetch_page(rid.page_id) else {
            return false;
        };
        let mut data = frame.write_data();
        let marked = TablePage::mark_delete(&mut **data, rid, txn, self.locks(), self.logs());
        drop(data);
        self.pool.unpin_page(rid.page_id, marked);
        marked
    }

    /// Physically removes the tuple at `rid`.
    pub fn apply_delete(&self, rid: RowId, txn: Option<&Transaction>) -> bool {
        let Some(frame) = self.pool.fetch_page(rid.page_id) else {
            return false;
        };
        let mut data = frame.write_data();
        let deleted = TablePage::apply_delete(&mut **data, rid, txn, self.logs());
        drop(data);
        self.pool.unpin_page(rid.page_id, deleted);
        deleted
    }

    /// Clears a delete mark set by [`Self::mark_delete`].
    pub fn rollback_delete(&self, rid: RowId, txn: Option<&Transaction>) -> bool {
        let Some(frame) = self.pool.fetch_page(rid.page_id) else {
            return false;
        };
        let mut data = frame.write_data();
        let rolled_back = TablePage::rollback_delete(&mut **data, rid, txn, self.logs());
        drop(data);
        self.pool.unpin_page(rid.page_id, rolled_back);
        rolled_back
    }

    /// Rewrites the tuple at `rid` in place.
    ///
    /// Returns false when the new version does not fit on its page; the
    /// caller decides whether to delete and reinsert.
    pub fn update_tuple(&self, row: &Row, rid: RowId, txn: Option<&Transaction>) -> bool {
        if !self.schema.validate_row(row) {
            return false;
        }
        let Some(frame) = self.pool.fetch_page(rid.page_id) else {
            return false;
        };
        let mut new_row = row.clone();
        let mut old_row = Row::new(Vec::new());
        let mut data = frame.write_data();
        let updated = TablePage::update_tuple(
            &mut **data,
            &mut new_row,
            &mut old_row,
            rid,
            txn,
            self.locks(),
            self.logs(),
        );
        drop(data);
        self.pool.unpin_page(rid.page_id, updated);
        updated
    }

    /// Reads the tuple at `rid`.
    pub fn get_tuple(&self, rid: RowId, txn: Option<&Transaction>) -> Option<Row> {
        let guard = self.pool.read_page(rid.page_id)?;
        let data = guard.data();
        TablePage::get_tuple(&**data, rid, txn, self.locks())
    }

    /// Returns an iterator positioned at the first live tuple.
    pub fn begin(&self, _txn: Option<&Transaction>) -> TableIterator<'_> {
        let mut page_id = self.first_page_id;
        let mut rid = RowId::INVALID;
        while page_id.is_valid() {
            let Some(guard) = self.pool.read_page(page_id) else {
                break;
            };
            let data = guard.data();
            if let Some(first) = TablePage::get_first_tuple_rid(&**data) {
                rid = first;
                break;
            }
            page_id = TablePage::next_page_id(&**data);
        }
        TableIterator { heap: self, rid }
    }

    /// Returns the past-the-end iterator.
    pub fn end(&self) -> TableIterator<'_> {
        TableIterator {
            heap: self,
            rid: RowId::INVALID,
        }
    }
}

/// Iterator over the live tuples of a table heap.
///
/// Holds no pin between steps; each advance pins the page it inspects and
/// releases it before returning.
pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    rid: RowId,
}

impl TableIterator<'_> {
    /// Returns the id of the row the iterator currently points at;
    /// invalid once past the end.
    pub fn rid(&self) -> RowId {
        self.rid
    }

    /// Moves to the next live tuple, crossing page boundaries and
    /// skipping empty pages.
    fn advance(&mut self) {
        let current = self.rid;
        let Some(guard) = self.heap.pool.read_page(current.page_id) else {
            self.rid = RowId::INVALID;
            return;
        };
        let data = guard.data();
        if let Some(next) = TablePage::get_next_tuple_rid(&**data, current) {
            self.rid = next;
            return;
        }
        let mut page_id = TablePage::next_page_id(&**data);
        drop(data);
        drop(guard);

        while page_id.is_valid() {
            let Some(guard) = self.heap.pool.read_page(page_id) else {
                break;
            };
            let data = guard.data();
            if let Some(first) = TablePage::get_first_tuple_rid(&**data) {
                self.rid = first;
                return;
            }
            page_id = TablePage::next_page_id(&**data);
        }
        self.rid = RowId::INVALID;
    }
}

impl PartialEq for TableIterator<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.rid == other.rid
    }
}

impl Iterator for TableIterator<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        while self.rid.is_valid() {
            let row = self.heap.get_tuple(self.rid, None);
            self.advance();
            if row.is_some() {
                return row;
            }
            // The tuple vanished under us; keep walking.
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, Field};
    use lode_common::types::TypeId;
    use lode_disk::{DiskManager, DiskManagerConfig};
    use tempfile::tempdir;

    fn test_pool(pool_size: usize) -> (Arc<BufferPool>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                db_file: dir.path().join("heap.db"),
                fsync_enabled: false,
            })
            .unwrap(),
        );
        (Arc::new(BufferPool::new(pool_size, disk)), dir)
    }

    fn test_schema() -> Arc<Schema> {
        Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false),
            Column::new("name", TypeId::Char, 4, false),
        ])
    }

    fn row(id: i32, text: &str) -> Row {
        Row::new(vec![Field::Int(id), Field::Char(text.to_string())])
    }

    #[test]
    fn test_insert_and_get() {
        let (pool, _dir) = test_pool(16);
        let heap = TableHeap::create(pool, test_schema()).unwrap();

        let mut r = row(1, "ab");
        assert!(heap.insert_tuple(&mut r, None));
        assert!(r.rid().is_valid());

        let fetched = heap.get_tuple(r.rid(), None).unwrap();
        assert_eq!(fetched.fields(), r.fields());
    }

    #[test]
    fn test_insert_rejects_oversize_row() {
        let (pool, _dir) = test_pool(16);
        let schema = Schema::new(vec![Column::new("v", TypeId::Varchar, 0, false)]);
        let heap = TableHeap::create(pool, schema).unwrap();

        let mut r = Row::new(vec![Field::Varchar("x".repeat(PAGE_SIZE))]);
        assert!(!heap.insert_tuple(&mut r, None));
    }

    #[test]
    fn test_insert_rejects_schema_mismatch() {
        let (pool, _dir) = test_pool(16);
        let heap = TableHeap::create(pool, test_schema()).unwrap();
        let mut r = Row::new(vec![Field::Int(1)]);
        assert!(!heap.insert_tuple(&mut r, None));
    }

    #[test]
    fn test_insert_spills_to_new_pages() {
        let (pool, _dir) = test_pool(32);
        let heap = TableHeap::create(pool.clone(), test_schema()).unwrap();

        let mut rids = Vec::new();
        for i in 0..600 {
            let mut r = row(i, "abcd");
            assert!(heap.insert_tuple(&mut r, None));
            rids.push(r.rid());
        }
        // More rows than one page can hold.
        assert!(rids.iter().any(|rid| rid.page_id != heap.first_page_id()));
        for (i, rid) in rids.iter().enumerate() {
            let fetched = heap.get_tuple(*rid, None).unwrap();
            assert_eq!(fetched.fields()[0], Field::Int(i as i32));
        }
        assert!(pool.check_all_unpinned());
    }

    #[test]
    fn test_delete_lifecycle() {
        let (pool, _dir) = test_pool(16);
        let heap = TableHeap::create(pool, test_schema()).unwrap();
        let mut r = row(1, "ab");
        heap.insert_tuple(&mut r, None);
        let rid = r.rid();

        assert!(heap.mark_delete(rid, None));
        assert!(heap.get_tuple(rid, None).is_none());
        assert!(heap.rollback_delete(rid, None));
        assert!(heap.get_tuple(rid, None).is_some());

        assert!(heap.mark_delete(rid, None));
        assert!(heap.apply_delete(rid, None));
        assert!(heap.get_tuple(rid, None).is_none());
    }

    #[test]
    fn test_update_tuple() {
        let (pool, _dir) = test_pool(16);
        let heap = TableHeap::create(pool, test_schema()).unwrap();
        let mut r = row(1, "ab");
        heap.insert_tuple(&mut r, None);

        assert!(heap.update_tuple(&row(2, "cd"), r.rid(), None));
        let fetched = heap.get_tuple(r.rid(), None).unwrap();
        assert_eq!(fetched.fields()[0], Field::Int(2));
        assert_eq!(fetched.fields()[1], Field::Char("cd".to_string()));
    }

    #[test]
    fn test_iteration_in_insertion_order() {
        let (pool, _dir) = test_pool(16);
        let heap = TableHeap::create(pool, test_schema()).unwrap();

        for i in 0..3 {
            let mut r = row(i, "abcd");
            heap.insert_tuple(&mut r, None);
        }

        let ids: Vec<_> = heap
            .begin(None)
            .map(|r| match r.fields()[0] {
                Field::Int(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_iteration_skips_deleted() {
        let (pool, _dir) = test_pool(16);
        let heap = TableHeap::create(pool, test_schema()).unwrap();

        let mut rids = Vec::new();
        for i in 0..3 {
            let mut r = row(i, "abcd");
            heap.insert_tuple(&mut r, None);
            rids.push(r.rid());
        }
        heap.mark_delete(rids[1], None);
        heap.apply_delete(rids[1], None);

        let remaining: Vec<_> = heap.begin(None).map(|r| r.rid()).collect();
        assert_eq!(remaining, vec![rids[0], rids[2]]);
    }

    #[test]
    fn test_empty_heap_iteration() {
        let (pool, _dir) = test_pool(16);
        let heap = TableHeap::create(pool, test_schema()).unwrap();
        let mut iter = heap.begin(None);
        assert!(iter == heap.end());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_iteration_crosses_pages() {
        let (pool, _dir) = test_pool(32);
        let heap = TableHeap::create(pool, test_schema()).unwrap();
        for i in 0..600 {
            let mut r = row(i, "abcd");
            heap.insert_tuple(&mut r, None);
        }
        let count = heap.begin(None).count();
        assert_eq!(count, 600);
    }
}
