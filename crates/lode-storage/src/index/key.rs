//! Fixed-width index keys and comparison strategies.
//!
//! B+ tree nodes store keys as fixed-width byte fields so node capacity is
//! a function of the page size and the key width alone. `GenericKey<N>` is
//! the schema-driven key (a serialized row prefix, zero-padded to `N`
//! bytes); `i32` keys exist for direct unit testing of the tree machinery.

use crate::record::{Row, Schema};
use std::cmp::Ordering;
use std::sync::Arc;

/// A fixed-width key storable inside a B+ tree node.
pub trait IndexKey: Copy + std::fmt::Debug + 'static {
    /// Encoded width in bytes.
    const ENCODED_SIZE: usize;

    /// Writes the key into `buf` (exactly `ENCODED_SIZE` bytes).
    fn write_to(&self, buf: &mut [u8]);

    /// Reads a key from `buf` (exactly `ENCODED_SIZE` bytes).
    fn read_from(buf: &[u8]) -> Self;
}

impl IndexKey for i32 {
    const ENCODED_SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
    }
}

/// Schema-driven key of `N` bytes: a serialized row, zero-padded.
///
/// Rows whose serialized form exceeds `N` cannot be indexed at this width;
/// the caller picks a width that covers its key columns.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    /// Builds a key from the serialized form of `row`.
    pub fn from_row(row: &Row) -> Self {
        let bytes = row.to_bytes();
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    /// Returns the raw key bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Decodes the row this key was built from.
    pub fn to_row(&self) -> Option<Row> {
        Row::from_bytes(&self.data)
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0u8; N] }
    }
}

impl<const N: usize> std::fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GenericKey<{}>({:02x?})", N, &self.data[..8.min(N)])
    }
}

impl<const N: usize> IndexKey for GenericKey<N> {
    const ENCODED_SIZE: usize = N;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self { data }
    }
}

/// Ordering strategy over keys, chosen at tree construction time.
pub trait KeyComparator<K>: Clone {
    /// Orders two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Comparator for plain `i32` keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct I32Comparator;

impl KeyComparator<i32> for I32Comparator {
    fn compare(&self, a: &i32, b: &i32) -> Ordering {
        a.cmp(b)
    }
}

/// Field-wise comparator for [`GenericKey`]s, ordering by the columns of
/// the index schema.
#[derive(Clone)]
pub struct SchemaComparator<const N: usize> {
    schema: Arc<Schema>,
}

impl<const N: usize> SchemaComparator<N> {
    /// Creates a comparator over the given key schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }
}

impl<const N: usize> KeyComparator<GenericKey<N>> for SchemaComparator<N> {
    fn compare(&self, a: &GenericKey<N>, b: &GenericKey<N>) -> Ordering {
        match (a.to_row(), b.to_row()) {
            (Some(row_a), Some(row_b)) => {
                let columns = self.schema.column_count();
                for i in 0..columns {
                    match (row_a.fields().get(i), row_b.fields().get(i)) {
                        (Some(fa), Some(fb)) => match fa.compare(fb) {
                            Ordering::Equal => continue,
                            other => return other,
                        },
                        _ => break,
                    }
                }
                Ordering::Equal
            }
            // Undecodable keys fall back to raw byte order.
            _ => a.as_slice().cmp(b.as_slice()),
        }
    }
}
