//! Buffer pool management for LodeDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool over the disk manager
//! - LRU eviction policy
//! - Pin counting for concurrent access
//! - Dirty page tracking with write-back on eviction

mod frame;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, PageReadGuard, PageWriteGuard};
pub use replacer::{LruReplacer, Replacer};
