//! Disk-resident B+ tree over 32-bit integer keys.
//!
//! Node storage lives entirely in the pages of one index file:
//!
//! ```text
//! page 0: meta  {relation name, key offset, key type, root page, root-is-leaf}
//! page n: leaf      {right sibling, keys[L], rids[L]}
//!      or internal  {level, keys[N], children[N + 1]}
//! ```
//!
//! Occupied keys form a strictly increasing prefix in every node; the
//! remaining key slots hold `KEY_SENTINEL`, which doubles as the occupancy
//! encoding. Leaves form a singly-linked list in ascending key order,
//! terminated by `PAGE_NO_SENTINEL`, which range scans walk.
//!
//! Insertion descends recursively and propagates splits bottom-up: a full
//! leaf splits around `(L - 1) / 2` passing its sibling's first key upward,
//! a full internal node splits around `N / 2` promoting a separator, and a
//! split that reaches the root grows the tree by one level.

pub mod constants;
pub mod index;
pub mod page;
pub mod scan;

pub use constants::{KEY_SENTINEL, LEAF_CAPACITY, NODE_CAPACITY, PAGE_NO_SENTINEL};
pub use index::BTreeIndex;
pub use page::{InternalNode, InternalNodeMut, LeafNode, LeafNodeMut, MetaPage, MetaPageMut};
pub use scan::Operator;
