//! Bounded range scans over the index.
//!
//! A scan positions on the first leaf entry satisfying the low bound, then
//! streams record identifiers by walking leaf slots and right-sibling links
//! until the high bound is crossed. Between calls the scanner holds exactly
//! one pinned leaf; every other page touched during positioning is unpinned
//! clean before the next is read.

use super::constants::{KEY_SENTINEL, PAGE_NO_SENTINEL};
use super::index::BTreeIndex;
use super::page::{InternalNode, LeafNode};
use arbor_common::{ArborError, RecordId, Result};

/// Comparison operator for a scan bound.
///
/// Only `Gt`/`Gte` are accepted for the low bound and `Lt`/`Lte` for the
/// high bound; anything else fails `start_scan` with `BadOpcodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Lte,
    Gte,
    Gt,
}

/// State of an in-progress scan.
///
/// The low bound is consumed entirely while positioning; only the high
/// bound is re-tested as the scan advances. `current_page_no` names the
/// leaf the scanner holds pinned; the pin is taken by `start_scan` and
/// released by `end_scan` (or by the index on shutdown).
#[derive(Debug, Clone, Copy)]
pub(super) struct ScanState {
    pub(super) high: i32,
    pub(super) high_op: Operator,
    pub(super) current_page_no: u32,
    pub(super) next_entry: usize,
}

/// True if `key` still satisfies the high bound.
fn within_high(key: i32, high: i32, high_op: Operator) -> bool {
    match high_op {
        Operator::Lt => key < high,
        Operator::Lte => key <= high,
        _ => false,
    }
}

impl BTreeIndex {
    /// Begins a range scan over `(low, low_op, high, high_op)`.
    ///
    /// Fails with `BadOpcodes` for operators outside `{Gt, Gte}` /
    /// `{Lt, Lte}`, `BadScanrange` when `low > high`, and `NoSuchKeyFound`
    /// when the first candidate slot in the covering leaf violates a bound
    /// (the scan is then not active and needs no `end_scan`). On success
    /// the starting leaf stays pinned until the scan ends.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: Operator,
        high: i32,
        high_op: Operator,
    ) -> Result<()> {
        if low_op != Operator::Gt && low_op != Operator::Gte {
            return Err(ArborError::BadOpcodes);
        }
        if high_op != Operator::Lt && high_op != Operator::Lte {
            return Err(ArborError::BadOpcodes);
        }
        if low > high {
            return Err(ArborError::BadScanrange);
        }

        // Restarting replaces any active scan; release its pin first.
        if let Some(scan) = self.scan.take() {
            self.pager.unpin(scan.current_page_no, false);
        }

        // Descend to the leaf covering the low bound. A separator equal to
        // the bound is advanced past, so an equal key under Gte is always
        // reachable left-to-right in the chosen leaf. Each interior page's
        // fields are read before its pin is dropped.
        let mut page = self.pager.read_page(self.root_page_no)?;
        if !self.root_is_leaf {
            loop {
                let (leaves_below, child_page_no) = page.read(|data| {
                    let node = InternalNode::new(data, self.node_occupancy);
                    (node.leaves_below(), node.child(node.scan_index(low)))
                });
                drop(page);
                page = self.pager.read_page(child_page_no)?;
                if leaves_below {
                    break;
                }
            }
        }

        // Position on the first slot satisfying the low bound.
        let leaf_occupancy = self.leaf_occupancy;
        let slot = page.read(|data| {
            let leaf = LeafNode::new(data, leaf_occupancy);
            let mut slot = leaf.lower_bound(low);
            if low_op == Operator::Gt {
                while slot < leaf_occupancy && leaf.key(slot) <= low {
                    slot += 1;
                }
            }
            slot
        });

        // The first candidate must exist and satisfy the high bound.
        let satisfied = slot < leaf_occupancy
            && page.read(|data| {
                let key = LeafNode::new(data, leaf_occupancy).key(slot);
                key != KEY_SENTINEL && within_high(key, high, high_op)
            });
        if !satisfied {
            // The guard unpins the leaf clean; the scan stays inactive.
            return Err(ArborError::NoSuchKeyFound);
        }

        let current_page_no = page.keep();
        self.scan = Some(ScanState {
            high,
            high_op,
            current_page_no,
            next_entry: slot,
        });
        Ok(())
    }

    /// Returns the next record identifier in the scan.
    ///
    /// Fails with `ScanNotInitialized` when no scan is active and with
    /// `IndexScanCompleted` once the high bound is crossed or the leaf
    /// chain ends; the scan stays active either way and must still be
    /// ended by `end_scan`.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let mut scan = self.scan.ok_or(ArborError::ScanNotInitialized)?;
        let leaf_occupancy = self.leaf_occupancy;

        // Leaf exhausted: follow the sibling link.
        let (exhausted, right_sib) =
            self.pager.with_page(scan.current_page_no, |data| {
                let leaf = LeafNode::new(data, leaf_occupancy);
                let exhausted = scan.next_entry >= leaf_occupancy
                    || leaf.key(scan.next_entry) == KEY_SENTINEL;
                (exhausted, leaf.right_sib_page_no())
            })?;

        if exhausted {
            if right_sib == PAGE_NO_SENTINEL {
                return Err(ArborError::IndexScanCompleted);
            }
            self.pager.unpin(scan.current_page_no, false);
            let page = self.pager.read_page(right_sib)?;
            scan.current_page_no = page.keep();
            scan.next_entry = 0;
            self.scan = Some(scan);
        }

        let (key, rid) = self.pager.with_page(scan.current_page_no, |data| {
            let leaf = LeafNode::new(data, leaf_occupancy);
            (leaf.key(scan.next_entry), leaf.rid(scan.next_entry))
        })?;

        if key == KEY_SENTINEL || !within_high(key, scan.high, scan.high_op) {
            return Err(ArborError::IndexScanCompleted);
        }

        scan.next_entry += 1;
        self.scan = Some(scan);
        Ok(rid)
    }

    /// Ends the active scan, releasing its leaf pin.
    ///
    /// Fails with `ScanNotInitialized` when no scan is active. Callers must
    /// end a scan even after `IndexScanCompleted`.
    pub fn end_scan(&mut self) -> Result<()> {
        let scan = self.scan.take().ok_or(ArborError::ScanNotInitialized)?;
        self.pager.unpin(scan.current_page_no, false);
        Ok(())
    }
}
