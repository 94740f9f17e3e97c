//! B+ tree index driver.
//!
//! Owns the paged index file and the root bookkeeping, dispatches recursive
//! inserts, and grows a new root when a split reaches the top. All node
//! access is routed through the pager's pinned-page guards; a page is
//! unpinned dirty iff it was written under that pin.

use super::constants::{LEAF_CAPACITY, NODE_CAPACITY};
use super::page::{
    InternalNode, InternalNodeMut, LeafNode, LeafNodeMut, MetaPage, MetaPageMut, RELATION_NAME_LEN,
};
use super::scan::ScanState;
use crate::file::IndexFile;
use crate::pager::Pager;
use crate::relation::RecordSource;
use arbor_buffer::BufferPool;
use arbor_common::{ArborError, KeyType, RecordId, Result, StorageConfig};
use std::sync::Arc;

/// A child split reported up the insertion path: the separator key and the
/// page number of the new right sibling.
type SplitReport = Option<(i32, u32)>;

/// A persistent B+ tree secondary index over 32-bit integer keys.
///
/// One file per index, named `{relation_name}.{attr_byte_offset}`. Page 0
/// is the meta page; the rest are leaf and internal nodes. The index is
/// single-threaded and non-reentrant: at most one insert, scan, or
/// lifecycle call runs at a time against a handle.
pub struct BTreeIndex {
    pub(super) pager: Pager,
    index_name: String,
    header_page_no: u32,
    pub(super) root_page_no: u32,
    pub(super) root_is_leaf: bool,
    pub(super) leaf_occupancy: usize,
    pub(super) node_occupancy: usize,
    attr_byte_offset: usize,
    pub(super) scan: Option<ScanState>,
    closed: bool,
}

impl BTreeIndex {
    /// Opens the index for `relation_name` keyed on the integer attribute at
    /// `attr_byte_offset`, building it from `source` if the index file does
    /// not exist yet.
    ///
    /// On a build, records are pulled from `source` until `EndOfFile` and
    /// inserted in scan order. On a reopen, the meta page is validated
    /// against the requested parameters and the root is adopted from it.
    pub fn open(
        config: &StorageConfig,
        pool: Arc<BufferPool>,
        relation_name: &str,
        attr_byte_offset: usize,
        key_type: KeyType,
        source: &mut dyn RecordSource,
    ) -> Result<Self> {
        Self::open_with_occupancy(
            config,
            pool,
            relation_name,
            attr_byte_offset,
            key_type,
            NODE_CAPACITY,
            LEAF_CAPACITY,
            source,
        )
    }

    /// Like [`open`](Self::open), with explicit node and leaf occupancies.
    ///
    /// Smaller occupancies force splits early, which makes deep trees cheap
    /// to build in tests. Occupancies are not persisted; reopening an index
    /// built with overrides requires the same overrides.
    #[allow(clippy::too_many_arguments)]
    pub fn open_with_occupancy(
        config: &StorageConfig,
        pool: Arc<BufferPool>,
        relation_name: &str,
        attr_byte_offset: usize,
        key_type: KeyType,
        node_occupancy: usize,
        leaf_occupancy: usize,
        source: &mut dyn RecordSource,
    ) -> Result<Self> {
        let index_name = format!("{}.{}", relation_name, attr_byte_offset);
        let path = config.data_dir.join(&index_name);

        match IndexFile::open(&path, false, config.fsync_enabled) {
            Ok(file) => {
                let file = Arc::new(file);
                let file_id = pool.register_file(&index_name, file.clone());
                let pager = Pager::new(file, pool, file_id);
                let header_page_no = pager.first_page_no();

                let meta_page = pager.read_page(header_page_no)?;
                let (stored_name, stored_offset, stored_tag, root_page_no, root_is_leaf) =
                    meta_page.read(|data| {
                        let meta = MetaPage::new(data);
                        (
                            meta.relation_name(),
                            meta.attr_byte_offset(),
                            meta.key_type_tag(),
                            meta.root_page_no(),
                            meta.root_is_leaf(),
                        )
                    });
                drop(meta_page);

                let name_bytes = relation_name.as_bytes();
                let expected_name = &name_bytes[..name_bytes.len().min(RELATION_NAME_LEN)];
                if stored_name.as_bytes() != expected_name {
                    return Err(ArborError::BadIndexInfo(format!(
                        "index {} was built for relation {}, not {}",
                        index_name, stored_name, relation_name
                    )));
                }
                if stored_offset != attr_byte_offset as i32 {
                    return Err(ArborError::BadIndexInfo(format!(
                        "index {} keys attribute at byte {}, not {}",
                        index_name, stored_offset, attr_byte_offset
                    )));
                }
                if stored_tag != key_type.as_u8() {
                    return Err(ArborError::BadIndexInfo(format!(
                        "index {} stores key type tag {}, not {}",
                        index_name,
                        stored_tag,
                        key_type.as_u8()
                    )));
                }

                Ok(Self {
                    pager,
                    index_name,
                    header_page_no,
                    root_page_no,
                    root_is_leaf,
                    leaf_occupancy,
                    node_occupancy,
                    attr_byte_offset,
                    scan: None,
                    closed: false,
                })
            }
            Err(ArborError::FileNotFound(_)) => {
                let file = Arc::new(IndexFile::open(&path, true, config.fsync_enabled)?);
                let file_id = pool.register_file(&index_name, file.clone());
                let pager = Pager::new(file, pool, file_id);

                let meta_page = pager.alloc_page()?;
                let root_page = pager.alloc_page()?;
                let header_page_no = meta_page.page_no();
                let root_page_no = root_page.page_no();

                root_page.write(|data| LeafNodeMut::new(data, leaf_occupancy).init());
                meta_page.write(|data| {
                    MetaPageMut::new(data).init(
                        relation_name,
                        attr_byte_offset as i32,
                        key_type,
                        root_page_no,
                        true,
                    )
                });
                drop(root_page);
                drop(meta_page);

                let mut index = Self {
                    pager,
                    index_name,
                    header_page_no,
                    root_page_no,
                    root_is_leaf: true,
                    leaf_occupancy,
                    node_occupancy,
                    attr_byte_offset,
                    scan: None,
                    closed: false,
                };
                index.bulk_load(source)?;
                Ok(index)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the index file name, `{relation_name}.{attr_byte_offset}`.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns whether the root is currently a leaf (diagnostic).
    pub fn root_is_leaf(&self) -> bool {
        self.root_is_leaf
    }

    /// Returns the leaf occupancy in effect.
    pub fn leaf_occupancy(&self) -> usize {
        self.leaf_occupancy
    }

    /// Returns the internal-node occupancy in effect.
    pub fn node_occupancy(&self) -> usize {
        self.node_occupancy
    }

    /// Flushes the index file and releases the handle.
    ///
    /// Any in-progress scan is marked inactive first. Dropping the index
    /// performs the same shutdown, discarding errors.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(scan) = self.scan.take() {
            self.pager.unpin(scan.current_page_no, false);
        }
        self.pager.flush()
    }

    /// Inserts every record of `source` at index-creation time.
    ///
    /// Only `EndOfFile` terminates the load; any other upstream error
    /// propagates unchanged.
    fn bulk_load(&mut self, source: &mut dyn RecordSource) -> Result<()> {
        loop {
            let rid = match source.scan_next() {
                Ok(rid) => rid,
                Err(ArborError::EndOfFile) => break,
                Err(e) => return Err(e),
            };
            let key = key_at(source.record(), self.attr_byte_offset)?;
            self.insert_entry(key, rid)?;
        }
        Ok(())
    }

    /// Inserts a `(key, rid)` entry.
    ///
    /// Descends to the covering leaf, splitting on the way back up as
    /// needed; a split that reaches the root installs a new internal root
    /// and rewrites the meta page.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        let split = if self.root_is_leaf {
            self.insert_into_leaf(self.root_page_no, key, rid)?
        } else {
            self.insert_into_node(self.root_page_no, key, rid)?
        };

        if let Some((sep_key, new_page_no)) = split {
            self.grow_root(sep_key, new_page_no)?;
        }
        Ok(())
    }

    fn insert_into_leaf(&self, page_no: u32, key: i32, rid: RecordId) -> Result<SplitReport> {
        let page = self.pager.read_page(page_no)?;
        let full = page.read(|data| LeafNode::new(data, self.leaf_occupancy).is_full());

        if !full {
            page.write(|data| LeafNodeMut::new(data, self.leaf_occupancy).insert(key, rid));
            return Ok(None);
        }

        let sib = self.pager.alloc_page()?;
        let sib_page_no = sib.page_no();
        let sep_key = page.write(|left| {
            sib.write(|right| {
                LeafNodeMut::new(left, self.leaf_occupancy).split_into(
                    &mut LeafNodeMut::new(right, self.leaf_occupancy),
                    sib_page_no,
                    key,
                    rid,
                )
            })
        });

        Ok(Some((sep_key, sib_page_no)))
    }

    fn insert_into_node(&self, page_no: u32, key: i32, rid: RecordId) -> Result<SplitReport> {
        let page = self.pager.read_page(page_no)?;
        let (leaves_below, child_page_no) = page.read(|data| {
            let node = InternalNode::new(data, self.node_occupancy);
            (node.leaves_below(), node.child(node.descend_index(key)))
        });

        // The pin on this node is held while the child runs, covering the
        // active recursion path.
        let child_split = if leaves_below {
            self.insert_into_leaf(child_page_no, key, rid)?
        } else {
            self.insert_into_node(child_page_no, key, rid)?
        };

        let Some((split_key, split_page_no)) = child_split else {
            // Untouched: the guard unpins clean.
            return Ok(None);
        };

        let full = page.read(|data| InternalNode::new(data, self.node_occupancy).is_full());
        if !full {
            page.write(|data| {
                InternalNodeMut::new(data, self.node_occupancy)
                    .insert_separator(split_key, split_page_no)
            });
            return Ok(None);
        }

        let sib = self.pager.alloc_page()?;
        let sib_page_no = sib.page_no();
        let promoted = page.write(|left| {
            sib.write(|right| {
                InternalNodeMut::new(left, self.node_occupancy).split_into(
                    &mut InternalNodeMut::new(right, self.node_occupancy),
                    split_key,
                    split_page_no,
                )
            })
        });

        Ok(Some((promoted, sib_page_no)))
    }

    /// Replaces the root after a split reached it.
    ///
    /// The new root holds one separator with the old root and the new
    /// sibling as its children; its level is 1 iff the old root was a leaf.
    /// The meta page is rewritten so a reopen finds the new root.
    fn grow_root(&mut self, sep_key: i32, right_page_no: u32) -> Result<()> {
        let page = self.pager.alloc_page()?;
        let new_root_no = page.page_no();
        let level = if self.root_is_leaf { 1 } else { 0 };

        page.write(|data| {
            let mut node = InternalNodeMut::new(data, self.node_occupancy);
            node.init(level);
            node.set_key(0, sep_key);
            node.set_child(0, self.root_page_no);
            node.set_child(1, right_page_no);
        });
        drop(page);

        self.root_page_no = new_root_no;
        self.root_is_leaf = false;

        let meta_page = self.pager.read_page(self.header_page_no)?;
        meta_page.write(|data| MetaPageMut::new(data).set_root(new_root_no, false));
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Extracts the little-endian i32 key at `offset` within a record.
fn key_at(record: &[u8], offset: usize) -> Result<i32> {
    match record.get(offset..offset + 4) {
        Some(bytes) => Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(ArborError::BadIndexInfo(format!(
            "record of {} bytes has no key at byte {}",
            record.len(),
            offset
        ))),
    }
}
