//! Buffer frame management.

use lode_common::page::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// Unique identifier for a frame in the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Invalid frame ID.
    pub const INVALID: FrameId = FrameId(u32::MAX);

    /// Returns true if this is a valid frame ID.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// A frame in the buffer pool holding a single page.
///
/// The page bytes live behind a read/write latch; ownership metadata (page
/// id, pin count, dirty flag) is atomic so the pool can inspect frames
/// without touching the latch.
pub struct BufferFrame {
    /// Frame identifier.
    frame_id: FrameId,
    /// The page currently stored in this frame (INVALID_PAGE_ID = none).
    page_id: AtomicI32,
    /// Page data buffer, guarded by the per-page content latch.
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
    /// Number of outstanding fetches of this frame.
    pin_count: AtomicU32,
    /// Whether the page has been modified since it was read.
    is_dirty: AtomicBool,
}

impl BufferFrame {
    /// Creates a new empty buffer frame.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicI32::new(INVALID_PAGE_ID),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page currently stored in this frame.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId(self.page_id.load(Ordering::Acquire))
    }

    /// Sets the page stored in this frame.
    #[inline]
    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.0, Ordering::Release);
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count.
    #[inline]
    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the pin count and returns the new value.
    ///
    /// Unpinning an unpinned frame is inert and returns 0.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            self.pin_count.store(0, Ordering::Release);
            return 0;
        }
        prev - 1
    }

    /// Returns true if this frame is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Returns true if this frame is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Sets the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Acquires the read latch on the page bytes.
    #[inline]
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Acquires the write latch on the page bytes.
    #[inline]
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Copies a full page into the frame.
    #[inline]
    pub fn copy_from(&self, src: &[u8; PAGE_SIZE]) {
        self.data.write().copy_from_slice(src);
    }

    /// Zeroes the page bytes.
    #[inline]
    pub fn zero_data(&self) {
        self.data.write().fill(0);
    }

    /// Resets the frame to the empty state.
    #[inline]
    pub fn reset(&self) {
        self.page_id.store(INVALID_PAGE_ID, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.zero_data();
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFrame")
            .field("frame_id", &self.frame_id)
            .field("page_id", &self.page_id())
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}
