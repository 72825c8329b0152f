//! Disk layer for LodeDB.
//!
//! This crate provides:
//! - Bitmap pages tracking free/used data pages inside an extent
//! - The disk meta page shadow (physical page 0)
//! - The disk manager: page-level file I/O plus extent allocation

mod bitmap;
mod manager;
mod meta;

pub use bitmap::BitmapPage;
pub use manager::{DiskManager, DiskManagerConfig, BITMAP_CAPACITY, INDEX_ROOTS_PHYSICAL_PAGE};
pub use meta::DiskMetaPage;
