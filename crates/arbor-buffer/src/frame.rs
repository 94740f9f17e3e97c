//! Buffer frame management.

use arbor_common::page::{PageId, PAGE_SIZE};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Packed page ID meaning "no page loaded".
const EMPTY: u64 = u64::MAX;

/// Index of a frame within the buffer pool's frame array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

/// One page slot of the buffer pool.
///
/// The page bytes sit behind an RwLock; residency, the pin count, and the
/// dirty flag are atomics so the pool can inspect frames without touching
/// the data lock.
pub struct BufferFrame {
    /// Position in the pool's frame array.
    slot: FrameId,
    /// Packed ID of the resident page, or EMPTY.
    page: AtomicU64,
    /// Number of outstanding pins.
    pins: AtomicU32,
    /// Set when the resident page has changes not yet written out.
    dirty: AtomicBool,
    /// The page bytes.
    bytes: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl BufferFrame {
    /// Creates an empty frame.
    pub fn new(slot: FrameId) -> Self {
        Self {
            slot,
            page: AtomicU64::new(EMPTY),
            pins: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            bytes: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    /// Returns this frame's position in the pool.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.slot
    }

    /// Returns the resident page's ID, or None for an empty frame.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        match self.page.load(Ordering::Acquire) {
            EMPTY => None,
            packed => Some(PageId::from(packed)),
        }
    }

    /// Assigns (or clears, with None) the resident page.
    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        let packed = page_id.map_or(EMPTY, u64::from);
        self.page.store(packed, Ordering::Release);
    }

    /// Returns the number of outstanding pins.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pins.load(Ordering::Acquire)
    }

    /// Takes one more pin on the frame.
    #[inline]
    pub fn pin(&self) {
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases one pin and returns the count that remains.
    ///
    /// An unpin of an already-unpinned frame stays at zero rather than
    /// wrapping.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let prev = self
            .pins
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        match prev {
            Ok(count) => count - 1,
            Err(_) => 0,
        }
    }

    /// Returns true while at least one pin is outstanding.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Returns true if the resident page has unwritten changes.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Marks the resident page dirty or clean.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Locks the page bytes for reading.
    #[inline]
    pub fn data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.bytes.read()
    }

    /// Locks the page bytes for writing.
    #[inline]
    pub fn data_mut(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.bytes.write()
    }

    /// Overwrites the frame with a full page read from disk.
    #[inline]
    pub fn load(&self, src: &[u8; PAGE_SIZE]) {
        self.bytes.write().copy_from_slice(src);
    }

    /// Returns the frame to its empty state: no page, no pins, clean,
    /// zeroed bytes.
    pub fn reset(&self) {
        self.bytes.write().fill(0);
        self.page.store(EMPTY, Ordering::Release);
        self.pins.store(0, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("BufferFrame");
        dbg.field("slot", &self.slot.0);
        match self.page_id() {
            Some(page_id) => dbg.field("page", &page_id.to_string()),
            None => dbg.field("page", &"empty"),
        };
        dbg.field("pins", &self.pin_count())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
