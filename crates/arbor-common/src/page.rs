//! Page identifiers and sizing for Arbor storage.

use serde::{Deserialize, Serialize};

/// Page size in bytes (4 KB).
pub const PAGE_SIZE: usize = 4 * 1024;

/// Unique identifier for a page within the buffer manager.
///
/// Pages are addressed by the file they belong to plus their position in
/// that file. Files register with the buffer pool to obtain a stable file
/// ID, so pages of different index files never collide in the page table.
///
/// A `PageId` converts to and from a single `u64` (file ID in the high
/// half) for storage in atomics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    /// File identifier assigned by the buffer pool.
    pub file_id: u32,
    /// Page number within the file (0-indexed; page 0 is the meta page).
    pub page_num: u32,
}

impl PageId {
    /// Creates a new PageId.
    pub const fn new(file_id: u32, page_num: u32) -> Self {
        Self { file_id, page_num }
    }
}

impl From<PageId> for u64 {
    fn from(id: PageId) -> u64 {
        (id.file_id as u64) << 32 | id.page_num as u64
    }
}

impl From<u64> for PageId {
    fn from(packed: u64) -> Self {
        Self {
            file_id: (packed >> 32) as u32,
            page_num: packed as u32,
        }
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.file_id, self.page_num)
    }
}
