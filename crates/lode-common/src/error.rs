//! Error types for LodeDB.

use thiserror::Error;

/// Result type alias using LodeError.
pub type Result<T> = std::result::Result<T, LodeError>;

/// Errors that can occur in LodeDB operations.
///
/// Most storage primitives report contract violations and resource
/// exhaustion through `bool`/`Option` return values; this enum carries the
/// conditions that cross layer boundaries.
#[derive(Debug, Error)]
pub enum LodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid page id: {0}")]
    InvalidPageId(i32),

    #[error("database file full, no allocatable page in any extent")]
    DiskFull,

    #[error("buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("page full, unable to insert tuple")]
    PageFull,

    #[error("duplicate key")]
    DuplicateKey,

    #[error("key not found")]
    KeyNotFound,

    #[error("page corrupted: {page_id}, reason: {reason}")]
    PageCorrupted { page_id: i32, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result codes handed upward to the execution engine and catalog layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbStatus {
    Success,
    Failed,
    TableNotExist,
    TableAlreadyExist,
    IndexNotFound,
    IndexAlreadyExist,
    ColumnNameNotExist,
}

impl DbStatus {
    /// Returns true for the success code.
    pub fn is_success(&self) -> bool {
        matches!(self, DbStatus::Success)
    }
}
