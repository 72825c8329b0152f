//! Page and row identifiers for LodeDB storage.

use serde::{Deserialize, Serialize};

/// Page size in bytes (4 KB).
///
/// Every persisted structure sizes itself against this constant; the
/// bitmap page additionally supports smaller sizes through its const
/// generic parameter for testing.
pub const PAGE_SIZE: usize = 4096;

/// Sentinel for "no page".
pub const INVALID_PAGE_ID: i32 = -1;

/// Logical identifier of a page within the database file.
///
/// Logical ids are dense non-negative integers handed out by the disk
/// manager; the mapping to a physical position in the file (which also
/// contains the meta page, the index-roots page, and bitmap pages) is the
/// disk manager's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub i32);

impl PageId {
    /// Invalid page ID.
    pub const INVALID: PageId = PageId(INVALID_PAGE_ID);

    /// Returns true if this is a valid page ID.
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Identifier of a row: the page holding it plus the slot index on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowId {
    /// Page containing the row.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot: u32,
}

impl RowId {
    /// Creates a new row ID.
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    /// Invalid row ID.
    pub const INVALID: RowId = RowId {
        page_id: PageId::INVALID,
        slot: 0,
    };

    /// Returns true if this row ID points at a real page.
    pub fn is_valid(&self) -> bool {
        self.page_id.is_valid()
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot)
    }
}

/// Magic number identifying serialized catalog metadata.
pub const CATALOG_METADATA_MAGIC: u32 = 0x89AB_23C1;

/// Magic number identifying serialized table metadata.
pub const TABLE_METADATA_MAGIC: u32 = 0x54C1_77AE;

/// Magic number identifying serialized index metadata.
pub const INDEX_METADATA_MAGIC: u32 = 0x31E0_9D42;
