//! Storage engine for LodeDB.
//!
//! This crate provides:
//! - The record layer: columns, schemas, fields, and serialized rows
//! - Slotted table pages and the table heap built from them
//! - A disk-resident B+ tree index over fixed-width keys
//! - The persistent index-roots page
//! - No-op transaction, lock, and log hooks for the execution engine

mod heap;
mod index;
mod record;
mod txn;

pub use heap::{TableHeap, TableIterator, TablePage};
pub use index::{
    BPlusTree, GenericKey, I32Comparator, IndexIterator, IndexKey, IndexRootsPage, InternalNode,
    KeyComparator, LeafNode, SchemaComparator,
};
pub use record::{Column, Field, Row, Schema};
pub use txn::{LockManager, LogManager, Transaction};
