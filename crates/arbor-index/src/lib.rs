//! Arbor: a persistent B+ tree secondary index for integer keys.
//!
//! This crate provides:
//! - A paged index file, one per index, addressed in 4 KB pages
//! - Pinned-page access glue over the shared buffer pool
//! - The B+ tree itself: node layouts, recursive insertion with split
//!   propagation, root growth, and bounded range scans
//! - The upstream relation-scan contract used for bulk construction
//!
//! Build an index over a relation, then stream record identifiers back out
//! with a bounded scan:
//!
//! ```no_run
//! use arbor_buffer::BufferPool;
//! use arbor_common::{KeyType, StorageConfig};
//! use arbor_index::{BTreeIndex, MemRelation, Operator};
//! use std::sync::Arc;
//!
//! # fn main() -> arbor_common::Result<()> {
//! let config = StorageConfig::default();
//! let pool = Arc::new(BufferPool::auto_sized());
//!
//! let mut relation = MemRelation::new();
//! for key in 0..1000 {
//!     relation.push_keyed(key, 0, 16);
//! }
//!
//! let mut index = BTreeIndex::open(&config, pool, "orders", 0, KeyType::Int32, &mut relation)?;
//!
//! index.start_scan(25, Operator::Gt, 40, Operator::Lt)?;
//! while let Ok(rid) = index.scan_next() {
//!     println!("matched record {rid}");
//! }
//! index.end_scan()?;
//! # Ok(())
//! # }
//! ```

pub mod btree;
mod file;
mod pager;
mod relation;

pub use btree::{BTreeIndex, Operator};
pub use file::IndexFile;
pub use pager::{Pager, PinnedPage};
pub use relation::{MemRelation, RecordSource};
