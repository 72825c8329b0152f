//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::replacer::{LruReplacer, Replacer};
use lode_common::page::{PageId, PAGE_SIZE};
use lode_common::Result;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::error;

use lode_disk::DiskManager;

struct PoolInner {
    /// Logical page id to frame id mapping for resident pages.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page.
    free_list: VecDeque<FrameId>,
}

/// Buffer pool manager.
///
/// Owns a fixed array of frames, the page table, a free-frame list, and an
/// LRU replacer over unpinned frames. All metadata updates happen under a
/// single mutex; page contents are protected by the per-frame read/write
/// latch exposed through [`BufferFrame`].
///
/// Every `fetch_page`/`new_page` must be paired with exactly one
/// `unpin_page`; a frame becomes evictable when its pin count reaches zero.
pub struct BufferPool {
    pool_size: usize,
    disk: Arc<DiskManager>,
    frames: Vec<BufferFrame>,
    inner: Mutex<PoolInner>,
    replacer: LruReplacer,
}

impl BufferPool {
    /// Creates a buffer pool of `pool_size` frames over the disk manager.
    pub fn new(pool_size: usize, disk: Arc<DiskManager>) -> Self {
        let frames: Vec<_> = (0..pool_size)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();
        let free_list: VecDeque<_> = (0..pool_size).map(|i| FrameId(i as u32)).collect();

        Self {
            pool_size,
            disk,
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
        }
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.inner.lock().free_list.len()
    }

    /// Returns the number of resident pages.
    pub fn resident_count(&self) -> usize {
        self.inner.lock().page_table.len()
    }

    /// Checks if a page is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.lock().page_table.contains_key(&page_id)
    }

    /// Returns the number of evictable frames.
    pub fn replacer_size(&self) -> usize {
        self.replacer.size()
    }

    /// Returns the disk manager handle.
    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// Takes a frame from the free list, or evicts a victim. The victim's
    /// dirty contents are written back and its mapping removed.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Option<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Some(frame_id);
        }
        let frame_id = self.replacer.victim()?;
        let frame = &self.frames[frame_id.0 as usize];
        let old_id = frame.page_id();
        if old_id.is_valid() {
            if frame.is_dirty() {
                let data = frame.read_data();
                let _ = self.disk.write_page(old_id, &data);
            }
            inner.page_table.remove(&old_id);
        }
        Some(frame_id)
    }

    /// Fetches a page, pinning it.
    ///
    /// Returns None when the page is not resident, every frame is pinned,
    /// and no victim is available.
    pub fn fetch_page(&self, page_id: PageId) -> Option<&BufferFrame> {
        if !page_id.is_valid() {
            return None;
        }
        let mut inner = self.inner.lock();
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.pin(frame_id);
            return Some(frame);
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.frames[frame_id.0 as usize];
        let data = match self.disk.read_page(page_id) {
            Ok(data) => data,
            Err(_) => {
                frame.reset();
                inner.free_list.push_back(frame_id);
                return None;
            }
        };
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.copy_from(&data);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        Some(frame)
    }

    /// Allocates a fresh page on disk and installs it in a zeroed frame,
    /// pinned.
    pub fn new_page(&self) -> Option<(PageId, &BufferFrame)> {
        let mut inner = self.inner.lock();
        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.frames[frame_id.0 as usize];

        let Some(page_id) = self.disk.allocate_page() else {
            frame.reset();
            inner.free_list.push_back(frame_id);
            return None;
        };

        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.zero_data();
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        Some((page_id, frame))
    }

    /// Releases one pin on a page. The dirty flag is sticky: once set it
    /// survives until the page is written back.
    ///
    /// Returns false if the page is not resident or already unpinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.0 as usize];
        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Drops a resident page and frees its disk allocation.
    ///
    /// Returns true if the page was dropped or was not resident, false if
    /// it is pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[frame_id.0 as usize];
        if frame.is_pinned() {
            return false;
        }
        inner.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        frame.reset();
        inner.free_list.push_back(frame_id);
        self.disk.deallocate_page(page_id);
        true
    }

    /// Writes a resident page to disk and clears its dirty flag.
    ///
    /// Returns whether the write happened.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.0 as usize];
        let data = frame.read_data();
        if self.disk.write_page(page_id, &data).is_err() {
            return false;
        }
        frame.set_dirty(false);
        true
    }

    /// Writes every dirty resident page to disk. Returns the number of
    /// pages written.
    pub fn flush_all(&self) -> usize {
        let inner = self.inner.lock();
        let mut flushed = 0;
        for (&page_id, &frame_id) in inner.page_table.iter() {
            let frame = &self.frames[frame_id.0 as usize];
            if !frame.is_dirty() {
                continue;
            }
            let data = frame.read_data();
            if self.disk.write_page(page_id, &data).is_ok() {
                frame.set_dirty(false);
                flushed += 1;
            }
        }
        flushed
    }

    /// Verifies that every frame is unpinned, logging offenders.
    pub fn check_all_unpinned(&self) -> bool {
        let mut ok = true;
        for frame in &self.frames {
            if frame.is_pinned() {
                error!(
                    page_id = frame.page_id().0,
                    pin_count = frame.pin_count(),
                    "page left pinned"
                );
                ok = false;
            }
        }
        ok
    }

    /// Asks the disk manager whether a logical page is unallocated.
    pub fn is_page_free(&self, page_id: PageId) -> bool {
        self.disk.is_page_free(page_id)
    }

    /// Frees a disk page that is not resident in the pool.
    pub fn deallocate_page(&self, page_id: PageId) -> bool {
        self.disk.deallocate_page(page_id)
    }

    /// Reads the index roots page (physical page 1, outside the logical id
    /// space and therefore never cached in a frame).
    pub fn read_index_roots(&self) -> Result<[u8; PAGE_SIZE]> {
        self.disk.read_index_roots()
    }

    /// Read-modify-writes the index roots page under the disk latch.
    pub fn update_index_roots<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut [u8; PAGE_SIZE]) -> R,
    {
        self.disk.update_index_roots(f)
    }

    /// Fetches a page behind an RAII read guard; the pin is released when
    /// the guard drops.
    pub fn read_page(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Some(PageReadGuard {
            pool: self,
            page_id,
            frame,
        })
    }

    /// Fetches a page behind an RAII write guard; the pin is released when
    /// the guard drops, carrying the frame's dirty flag.
    pub fn write_page(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Some(PageWriteGuard {
            pool: self,
            page_id,
            frame,
        })
    }
}

/// RAII pin token for reading a page.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame: &'a BufferFrame,
}

impl PageReadGuard<'_> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Acquires the read latch on the page bytes.
    pub fn data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, false);
    }
}

/// RAII pin token for writing a page.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame: &'a BufferFrame,
}

impl PageWriteGuard<'_> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Acquires the write latch on the page bytes.
    pub fn data_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.write_data()
    }

    /// Marks the page as modified.
    pub fn set_dirty(&self) {
        self.frame.set_dirty(true);
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.frame.is_dirty());
    }
}
