//! Disk manager: logical page I/O and extent allocation over one file.
//!
//! Physical file layout:
//! ```text
//! physical 0                  disk meta page
//! physical 1                  index roots page
//! physical 2 + E(C+1) + n     data page n of extent E, n in [0, C)
//! physical 2 + E(C+1) + C     bitmap page of extent E
//! ```
//! where `C = BITMAP_CAPACITY`. Logical ids are dense across extents:
//! logical `L` lives in extent `L / C` at offset `L % C`. The bitmap page
//! rides in the last slot of its extent block so the logical-to-physical
//! mapping stays the closed form above.

use crate::bitmap::BitmapPage;
use crate::meta::DiskMetaPage;
use lode_common::page::{PageId, PAGE_SIZE};
use lode_common::{LodeError, Result, StorageConfig};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Number of data pages tracked by one bitmap page.
pub const BITMAP_CAPACITY: usize = BitmapPage::<PAGE_SIZE>::MAX_SUPPORTED_SIZE;

/// Physical position of the disk meta page.
const META_PHYSICAL_PAGE: u64 = 0;

/// Physical position of the index roots page.
pub const INDEX_ROOTS_PHYSICAL_PAGE: u64 = 1;

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Path of the database file.
    pub db_file: PathBuf,
    /// Flush file writes through to disk.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            db_file: PathBuf::from("./data/lode.db"),
            fsync_enabled: true,
        }
    }
}

impl From<&StorageConfig> for DiskManagerConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            db_file: config.db_file.clone(),
            fsync_enabled: config.fsync_enabled,
        }
    }
}

struct DiskInner {
    file: File,
    meta: DiskMetaPage,
}

/// Manages reading and writing pages of one database file.
///
/// All I/O and every logical-to-physical translation happens behind one
/// mutex; the allocation path is structured so a single acquisition covers
/// the bitmap read-modify-write and the meta page update.
pub struct DiskManager {
    config: DiskManagerConfig,
    inner: Mutex<DiskInner>,
}

impl DiskManager {
    /// Opens the database file, creating it if absent, and loads the meta
    /// page shadow.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        if let Some(parent) = config.db_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.db_file)?;

        let mut manager = DiskInner {
            file,
            meta: DiskMetaPage::new(),
        };
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical_locked(&mut manager, META_PHYSICAL_PAGE, &mut buf)?;
        manager.meta = DiskMetaPage::from_bytes(&buf);

        Ok(Self {
            config,
            inner: Mutex::new(manager),
        })
    }

    /// Returns the database file path.
    pub fn db_file(&self) -> &Path {
        &self.config.db_file
    }

    /// Returns the size of the database file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        let inner = self.inner.lock();
        Ok(inner.file.metadata()?.len())
    }

    /// Returns the total number of allocated data pages.
    pub fn num_allocated_pages(&self) -> u32 {
        self.inner.lock().meta.num_allocated_pages
    }

    /// Returns the number of extents in use.
    pub fn num_extents(&self) -> u32 {
        self.inner.lock().meta.num_extents
    }

    /// Maps a logical page id to its physical position in the file.
    fn map_page_id(page_id: PageId) -> u64 {
        let logical = page_id.0 as u64;
        let extent = logical / BITMAP_CAPACITY as u64;
        let offset = logical % BITMAP_CAPACITY as u64;
        2 + extent * (BITMAP_CAPACITY as u64 + 1) + offset
    }

    /// Inverse of [`Self::map_page_id`]. Returns None for physical pages
    /// that do not hold a data page (meta, roots, bitmaps).
    fn logical_of(physical: u64) -> Option<PageId> {
        if physical < 2 {
            return None;
        }
        let rel = physical - 2;
        let extent = rel / (BITMAP_CAPACITY as u64 + 1);
        let offset = rel % (BITMAP_CAPACITY as u64 + 1);
        if offset == BITMAP_CAPACITY as u64 {
            return None;
        }
        Some(PageId((extent * BITMAP_CAPACITY as u64 + offset) as i32))
    }

    /// Physical position of the bitmap page of the given extent.
    fn bitmap_physical(extent: u64) -> u64 {
        2 + extent * (BITMAP_CAPACITY as u64 + 1) + BITMAP_CAPACITY as u64
    }

    /// Reads a logical page. Reads past the end of the file return a
    /// zero-filled page.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        if !page_id.is_valid() {
            return Err(LodeError::InvalidPageId(page_id.0));
        }
        let mut inner = self.inner.lock();
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical_locked(&mut inner, Self::map_page_id(page_id), &mut buf)?;
        Ok(buf)
    }

    /// Writes a logical page. I/O errors are logged and swallowed; the
    /// engine offers no durability guarantee beyond the flush path.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(LodeError::InvalidPageId(page_id.0));
        }
        let mut inner = self.inner.lock();
        self.write_physical_locked(&mut inner, Self::map_page_id(page_id), data);
        Ok(())
    }

    /// Allocates a logical page id, scanning extents in order and opening a
    /// new extent when every existing one is full.
    ///
    /// Returns None only when the meta page cannot describe another extent.
    pub fn allocate_page(&self) -> Option<PageId> {
        let mut inner = self.inner.lock();

        for extent in 0..DiskMetaPage::MAX_EXTENTS {
            if inner.meta.extent_used_pages(extent) as usize >= BITMAP_CAPACITY {
                continue;
            }
            let bitmap_pos = Self::bitmap_physical(extent as u64);
            let mut buf = [0u8; PAGE_SIZE];
            if Self::read_physical_locked(&mut inner, bitmap_pos, &mut buf).is_err() {
                return None;
            }
            let mut bitmap = BitmapPage::<PAGE_SIZE>::from_bytes(buf);
            let Some(offset) = bitmap.allocate_page() else {
                continue;
            };
            self.write_physical_locked(&mut inner, bitmap_pos, bitmap.as_bytes());

            inner.meta.note_allocated(extent);
            let meta_bytes = inner.meta.to_bytes();
            self.write_physical_locked(&mut inner, META_PHYSICAL_PAGE, &meta_bytes);

            return Some(PageId((extent * BITMAP_CAPACITY + offset as usize) as i32));
        }
        None
    }

    /// Frees a logical page id.
    ///
    /// Callers must only deallocate ids they allocated; freeing a free page
    /// is reported as false and leaves the state unchanged.
    pub fn deallocate_page(&self, page_id: PageId) -> bool {
        if !page_id.is_valid() {
            return false;
        }
        let mut inner = self.inner.lock();
        let extent = page_id.0 as usize / BITMAP_CAPACITY;
        let offset = (page_id.0 as usize % BITMAP_CAPACITY) as u32;

        let bitmap_pos = Self::bitmap_physical(extent as u64);
        let mut buf = [0u8; PAGE_SIZE];
        if Self::read_physical_locked(&mut inner, bitmap_pos, &mut buf).is_err() {
            return false;
        }
        let mut bitmap = BitmapPage::<PAGE_SIZE>::from_bytes(buf);
        if !bitmap.deallocate_page(offset) {
            warn!(page_id = page_id.0, "deallocating a page that is not allocated");
            return false;
        }
        self.write_physical_locked(&mut inner, bitmap_pos, bitmap.as_bytes());

        inner.meta.note_deallocated(extent);
        let meta_bytes = inner.meta.to_bytes();
        self.write_physical_locked(&mut inner, META_PHYSICAL_PAGE, &meta_bytes);
        true
    }

    /// Returns true if the logical page id is currently unallocated.
    pub fn is_page_free(&self, page_id: PageId) -> bool {
        if !page_id.is_valid() {
            return false;
        }
        let mut inner = self.inner.lock();
        let extent = page_id.0 as usize / BITMAP_CAPACITY;
        let offset = (page_id.0 as usize % BITMAP_CAPACITY) as u32;

        let bitmap_pos = Self::bitmap_physical(extent as u64);
        let mut buf = [0u8; PAGE_SIZE];
        if Self::read_physical_locked(&mut inner, bitmap_pos, &mut buf).is_err() {
            return false;
        }
        BitmapPage::<PAGE_SIZE>::from_bytes(buf).is_page_free(offset)
    }

    /// Reads the index roots page (physical page 1).
    pub fn read_index_roots(&self) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.inner.lock();
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical_locked(&mut inner, INDEX_ROOTS_PHYSICAL_PAGE, &mut buf)?;
        Ok(buf)
    }

    /// Applies a mutation to the index roots page under the I/O latch and
    /// writes the result back.
    pub fn update_index_roots<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut [u8; PAGE_SIZE]) -> R,
    {
        let mut inner = self.inner.lock();
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical_locked(&mut inner, INDEX_ROOTS_PHYSICAL_PAGE, &mut buf)?;
        let result = f(&mut buf);
        self.write_physical_locked(&mut inner, INDEX_ROOTS_PHYSICAL_PAGE, &buf);
        Ok(result)
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        let inner = self.inner.lock();
        inner.file.sync_all()?;
        Ok(())
    }

    fn read_physical_locked(
        inner: &mut DiskInner,
        physical: u64,
        buf: &mut [u8; PAGE_SIZE],
    ) -> Result<()> {
        let offset = physical * PAGE_SIZE as u64;
        let file_size = inner.file.metadata()?.len();
        if offset >= file_size {
            buf.fill(0);
            return Ok(());
        }
        inner.file.seek(SeekFrom::Start(offset))?;
        let mut read_total = 0;
        while read_total < PAGE_SIZE {
            let count = inner.file.read(&mut buf[read_total..])?;
            if count == 0 {
                break;
            }
            read_total += count;
        }
        // The file may end inside the page.
        buf[read_total..].fill(0);
        Ok(())
    }

    fn write_physical_locked(&self, inner: &mut DiskInner, physical: u64, data: &[u8; PAGE_SIZE]) {
        let offset = physical * PAGE_SIZE as u64;
        let result = inner
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| inner.file.write_all(data))
            .and_then(|_| {
                if self.config.fsync_enabled {
                    inner.file.sync_data()
                } else {
                    Ok(())
                }
            });
        if let Err(e) = result {
            warn!(physical, error = %e, "I/O error while writing page");
        }
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let inner = self.inner.lock();
        let _ = inner.file.sync_all();
    }
}
