//! Disk-resident B+ tree index.

mod iterator;
mod key;
mod node;
mod roots;
mod tree;

pub use iterator::IndexIterator;
pub use key::{GenericKey, I32Comparator, IndexKey, KeyComparator, SchemaComparator};
pub use node::{InternalNode, LeafNode, NodeHeader};
pub use roots::IndexRootsPage;
pub use tree::BPlusTree;
