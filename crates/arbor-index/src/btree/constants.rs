//! On-page layout constants for B+ tree nodes.

use arbor_common::page::PAGE_SIZE;

/// Marks an empty key slot. Doubles as an upper bound on every real key:
/// occupied keys form a strictly increasing prefix followed only by
/// sentinels, so occupancy needs no count field.
pub const KEY_SENTINEL: i32 = i32::MAX;

/// Marks "no right sibling" in a leaf's sibling pointer.
pub const PAGE_NO_SENTINEL: u32 = 0x7FFF_FFFF;

/// Bytes per key.
pub const KEY_SIZE: usize = 4;

/// Bytes per record identifier slot (page: 4, slot: 2, reserved: 2).
pub const RID_SIZE: usize = 8;

/// Bytes per child page number.
pub const CHILD_SIZE: usize = 4;

/// Leaf header: right sibling page number.
pub const LEAF_HEADER_SIZE: usize = 4;

/// Internal header: level byte plus 3 reserved bytes.
pub const INTERNAL_HEADER_SIZE: usize = 4;

/// Maximum (key, rid) pairs in a leaf node.
pub const LEAF_CAPACITY: usize = (PAGE_SIZE - LEAF_HEADER_SIZE) / (KEY_SIZE + RID_SIZE);

/// Maximum separator keys in an internal node (which holds one more child).
pub const NODE_CAPACITY: usize =
    (PAGE_SIZE - INTERNAL_HEADER_SIZE - CHILD_SIZE) / (KEY_SIZE + CHILD_SIZE);

// Node layouts must fit the page.
const _: () = assert!(LEAF_HEADER_SIZE + LEAF_CAPACITY * (KEY_SIZE + RID_SIZE) <= PAGE_SIZE);
const _: () = assert!(
    INTERNAL_HEADER_SIZE + NODE_CAPACITY * KEY_SIZE + (NODE_CAPACITY + 1) * CHILD_SIZE <= PAGE_SIZE
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacities_at_default_page_size() {
        assert_eq!(LEAF_CAPACITY, 341);
        assert_eq!(NODE_CAPACITY, 511);
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(KEY_SENTINEL, 0x7FFF_FFFF);
        assert_eq!(PAGE_NO_SENTINEL, 0x7FFF_FFFF);
    }

    #[test]
    fn test_layouts_fill_page_exactly() {
        assert_eq!(
            LEAF_HEADER_SIZE + LEAF_CAPACITY * (KEY_SIZE + RID_SIZE),
            PAGE_SIZE
        );
        assert_eq!(
            INTERNAL_HEADER_SIZE + NODE_CAPACITY * KEY_SIZE + (NODE_CAPACITY + 1) * CHILD_SIZE,
            PAGE_SIZE
        );
    }
}
