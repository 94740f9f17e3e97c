//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::replacer::ClockReplacer;
use arbor_common::page::{PageId, PAGE_SIZE};
use arbor_common::{ArborError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use sysinfo::System;

/// Backing store for the pages of one registered file.
///
/// The buffer pool routes all page I/O through this trait: read-through on a
/// miss, write-back of dirty victims on eviction, and bulk write-out on
/// `flush_file`.
pub trait PageStore: Send + Sync {
    /// Allocates a new zeroed page at the end of the store and returns its
    /// page number.
    fn allocate_page(&self) -> Result<u32>;

    /// Reads an existing page.
    fn read_page(&self, page_no: u32) -> Result<[u8; PAGE_SIZE]>;

    /// Writes a page in place.
    fn write_page(&self, page_no: u32, data: &[u8; PAGE_SIZE]) -> Result<()>;

    /// Makes previously written pages durable.
    fn sync(&self) -> Result<()>;
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Registered file state.
struct FileRegistry {
    ids: HashMap<String, u32>,
    stores: HashMap<u32, Arc<dyn PageStore>>,
    next_id: u32,
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping
/// - Free frame list for new pages
/// - Clock replacement for eviction, with dirty victims written back to
///   their file's store before the frame is reused
/// - Pin counting with an explicit unpin-dirty discipline
///
/// Files register with the pool to obtain a stable file ID; all page
/// operations are keyed by `(file_id, page_no)` so several index files can
/// share one pool without collisions.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page ID to frame ID mapping.
    page_table: Mutex<HashMap<PageId, FrameId>>,
    /// List of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,
    /// Page replacement policy.
    replacer: ClockReplacer,
    /// Registered files and their backing stores.
    files: Mutex<FileRegistry>,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in the free list
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: Mutex::new(HashMap::with_capacity(num_frames)),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(num_frames),
            files: Mutex::new(FileRegistry {
                ids: HashMap::new(),
                stores: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    ///
    /// Queries the system for available memory and allocates 25% of it for
    /// the buffer pool, with a floor of 1,000 frames so caching stays useful
    /// on low-memory systems.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self::new(BufferPoolConfig { num_frames })
    }

    /// Registers a file with the pool and returns its stable file ID.
    ///
    /// Registering the same name twice returns the same ID with the store
    /// handle refreshed, so an index that is closed and reopened against the
    /// same pool keeps its page table entries consistent.
    pub fn register_file(&self, name: &str, store: Arc<dyn PageStore>) -> u32 {
        let mut files = self.files.lock();
        let id = match files.ids.get(name) {
            Some(&id) => id,
            None => {
                let id = files.next_id;
                files.next_id += 1;
                files.ids.insert(name.to_string(), id);
                id
            }
        };
        files.stores.insert(id, store);
        id
    }

    /// Returns the store registered for a file ID.
    fn store(&self, file_id: u32) -> Result<Arc<dyn PageStore>> {
        self.files
            .lock()
            .stores
            .get(&file_id)
            .cloned()
            .ok_or(ArborError::FileNotRegistered(file_id))
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently in the pool.
    pub fn page_count(&self) -> usize {
        self.page_table.lock().len()
    }

    /// Checks if a page is resident in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.lock().contains_key(&page_id)
    }

    /// Allocates a new page in the file and returns it pinned and zeroed.
    pub fn alloc_page(&self, file_id: u32) -> Result<(u32, &BufferFrame)> {
        let store = self.store(file_id)?;
        let page_no = store.allocate_page()?;
        let page_id = PageId::new(file_id, page_no);

        let frame = self.install_page(page_id)?;
        Ok((page_no, frame))
    }

    /// Reads a page, pinning it.
    ///
    /// Returns the resident frame if cached, otherwise reads through to the
    /// file's store.
    pub fn read_page(&self, file_id: u32, page_no: u32) -> Result<&BufferFrame> {
        let page_id = PageId::new(file_id, page_no);

        if let Some(frame) = self.fetch_resident(page_id) {
            return Ok(frame);
        }

        let store = self.store(file_id)?;
        let data = store.read_page(page_no)?;
        let frame = self.install_page(page_id)?;
        frame.load(&data);
        Ok(frame)
    }

    /// Unpins a page in the buffer pool.
    ///
    /// The dirty flag must be true iff the page was mutated under this pin.
    /// Returns false if the page is not resident.
    #[inline]
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let frame_id = match self.page_table.lock().get(&page_id) {
            Some(&fid) => fid,
            None => return false,
        };
        let frame = &self.frames[frame_id.0 as usize];

        if is_dirty {
            frame.set_dirty(true);
        }

        frame.unpin();
        true
    }

    /// Runs `f` over the data of an already-pinned resident page.
    ///
    /// Returns None if the page is not resident or not pinned. This lets a
    /// holder of a long-lived pin (the scanner) read the page repeatedly
    /// without perturbing the pin count.
    #[inline]
    pub fn with_pinned<R>(
        &self,
        page_id: PageId,
        f: impl FnOnce(&[u8; PAGE_SIZE]) -> R,
    ) -> Option<R> {
        let frame_id = *self.page_table.lock().get(&page_id)?;
        let frame = &self.frames[frame_id.0 as usize];
        if !frame.is_pinned() {
            return None;
        }
        let data = frame.data();
        Some(f(&data))
    }

    /// Flushes all dirty pages belonging to one file and syncs its store.
    ///
    /// Returns the number of pages written.
    pub fn flush_file(&self, file_id: u32) -> Result<usize> {
        let store = self.store(file_id)?;

        // Collect targets first so the page table lock is not held during I/O.
        let targets: Vec<(PageId, FrameId)> = self
            .page_table
            .lock()
            .iter()
            .filter(|(pid, _)| pid.file_id == file_id)
            .map(|(&pid, &fid)| (pid, fid))
            .collect();

        let mut flushed = 0;
        for (page_id, frame_id) in targets {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.data();
                store.write_page(page_id.page_num, &data)?;
                frame.set_dirty(false);
                flushed += 1;
            }
        }

        store.sync()?;
        Ok(flushed)
    }

    /// Pins a resident page, or returns None on a miss.
    fn fetch_resident(&self, page_id: PageId) -> Option<&BufferFrame> {
        let frame_id = *self.page_table.lock().get(&page_id)?;
        let frame = &self.frames[frame_id.0 as usize];
        frame.pin();
        self.replacer.record_access(frame_id);
        Some(frame)
    }

    /// Installs a page into a fresh frame, pinned and zeroed.
    ///
    /// If the page is already resident the existing frame is pinned and
    /// returned as-is.
    fn install_page(&self, page_id: PageId) -> Result<&BufferFrame> {
        if let Some(frame) = self.fetch_resident(page_id) {
            return Ok(frame);
        }

        let frame_id = self.allocate_frame()?;

        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_page_id(Some(page_id));
        frame.pin();
        self.replacer.record_access(frame_id);

        self.page_table.lock().insert(page_id, frame_id);
        Ok(frame)
    }

    /// Allocates a frame, evicting if necessary.
    ///
    /// Tries the free list first, then evicts an unpinned frame. A dirty
    /// victim is written back to its file's store before the frame is
    /// handed out.
    fn allocate_frame(&self) -> Result<FrameId> {
        {
            let mut free_list = self.free_list.lock();
            if let Some(frame_id) = free_list.pop() {
                return Ok(frame_id);
            }
        }

        let victim_id = self
            .replacer
            .evict(|fid| self.frames[fid.0 as usize].pin_count() == 0);

        let victim_id = victim_id.ok_or(ArborError::BufferPoolFull)?;
        let frame = &self.frames[victim_id.0 as usize];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                let store = self.store(old_page_id.file_id)?;
                let data = frame.data();
                store.write_page(old_page_id.page_num, &data)?;
                frame.set_dirty(false);
            }
            self.page_table.lock().remove(&old_page_id);
        }

        Ok(victim_id)
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_count = 0;
        let mut dirty_count = 0;
        let mut pin_count_total = 0;

        let table = self.page_table.lock();
        for &frame_id in table.values() {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                pinned_count += 1;
            }
            pin_count_total += frame.pin_count() as usize;
            if frame.is_dirty() {
                dirty_count += 1;
            }
        }

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_list.lock().len(),
            used_frames: table.len(),
            pinned_frames: pinned_count,
            pin_count_total,
            dirty_frames: dirty_count,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Sum of all pin counts (0 after every balanced operation).
    pub pin_count_total: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory page store for exercising the pool without disk I/O.
    struct MemStore {
        pages: Mutex<Vec<Box<[u8; PAGE_SIZE]>>>,
    }

    impl MemStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(Vec::new()),
            })
        }

        fn page_byte(&self, page_no: u32, offset: usize) -> u8 {
            self.pages.lock()[page_no as usize][offset]
        }
    }

    impl PageStore for MemStore {
        fn allocate_page(&self) -> Result<u32> {
            let mut pages = self.pages.lock();
            pages.push(Box::new([0u8; PAGE_SIZE]));
            Ok((pages.len() - 1) as u32)
        }

        fn read_page(&self, page_no: u32) -> Result<[u8; PAGE_SIZE]> {
            let pages = self.pages.lock();
            pages
                .get(page_no as usize)
                .map(|p| **p)
                .ok_or(ArborError::PageNotFound {
                    file: "mem".to_string(),
                    page_no,
                })
        }

        fn write_page(&self, page_no: u32, data: &[u8; PAGE_SIZE]) -> Result<()> {
            let mut pages = self.pages.lock();
            match pages.get_mut(page_no as usize) {
                Some(p) => {
                    **p = *data;
                    Ok(())
                }
                None => Err(ArborError::PageNotFound {
                    file: "mem".to_string(),
                    page_no,
                }),
            }
        }

        fn sync(&self) -> Result<()> {
            Ok(())
        }
    }

    fn create_test_pool(num_frames: usize) -> (BufferPool, Arc<MemStore>, u32) {
        let pool = BufferPool::new(BufferPoolConfig { num_frames });
        let store = MemStore::new();
        let file_id = pool.register_file("test.idx", store.clone());
        (pool, store, file_id)
    }

    #[test]
    fn test_buffer_pool_new() {
        let (pool, _, _) = create_test_pool(10);

        assert_eq!(pool.num_frames(), 10);
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.page_count(), 0);
    }

    #[test]
    fn test_buffer_pool_register_file() {
        let pool = BufferPool::new(BufferPoolConfig { num_frames: 4 });

        let a = pool.register_file("users.0", MemStore::new());
        let b = pool.register_file("orders.4", MemStore::new());
        let a_again = pool.register_file("users.0", MemStore::new());

        assert_ne!(a, b);
        assert_eq!(a, a_again);
    }

    #[test]
    fn test_buffer_pool_unregistered_file() {
        let pool = BufferPool::new(BufferPoolConfig { num_frames: 4 });
        let result = pool.read_page(99, 0);
        assert!(matches!(result, Err(ArborError::FileNotRegistered(99))));
    }

    #[test]
    fn test_buffer_pool_alloc_page() {
        let (pool, _, file_id) = create_test_pool(10);

        let (page_no, frame) = pool.alloc_page(file_id).unwrap();

        assert_eq!(page_no, 0);
        assert_eq!(frame.page_id(), Some(PageId::new(file_id, 0)));
        assert!(frame.is_pinned());
        assert!(frame.data().iter().all(|&b| b == 0));
        assert_eq!(pool.free_count(), 9);
        assert_eq!(pool.page_count(), 1);
    }

    #[test]
    fn test_buffer_pool_alloc_page_sequence() {
        let (pool, _, file_id) = create_test_pool(10);

        for expected in 0..3 {
            let (page_no, _) = pool.alloc_page(file_id).unwrap();
            assert_eq!(page_no, expected);
            pool.unpin_page(PageId::new(file_id, page_no), false);
        }
    }

    #[test]
    fn test_buffer_pool_read_resident() {
        let (pool, _, file_id) = create_test_pool(10);
        let (page_no, frame) = pool.alloc_page(file_id).unwrap();
        frame.data_mut()[0] = 0xAB;
        pool.unpin_page(PageId::new(file_id, page_no), true);

        // Still resident: read hits the cache, not the store.
        let frame = pool.read_page(file_id, page_no).unwrap();
        assert_eq!(frame.data()[0], 0xAB);
        assert!(frame.is_pinned());
        pool.unpin_page(PageId::new(file_id, page_no), false);
    }

    #[test]
    fn test_buffer_pool_read_through() {
        let (pool, store, file_id) = create_test_pool(2);

        // Write a recognizable page directly into the store.
        let page_no = store.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[10] = 0xCD;
        store.write_page(page_no, &data).unwrap();

        let frame = pool.read_page(file_id, page_no).unwrap();
        assert_eq!(frame.data()[10], 0xCD);
        pool.unpin_page(PageId::new(file_id, page_no), false);
    }

    #[test]
    fn test_buffer_pool_read_missing_page() {
        let (pool, _, file_id) = create_test_pool(2);
        assert!(pool.read_page(file_id, 42).is_err());
    }

    #[test]
    fn test_buffer_pool_unpin() {
        let (pool, _, file_id) = create_test_pool(10);

        let (page_no, frame) = pool.alloc_page(file_id).unwrap();
        assert!(frame.is_pinned());

        pool.unpin_page(PageId::new(file_id, page_no), false);
        assert!(!frame.is_pinned());
    }

    #[test]
    fn test_buffer_pool_unpin_missing_page() {
        let (pool, _, file_id) = create_test_pool(10);
        assert!(!pool.unpin_page(PageId::new(file_id, 99), false));
    }

    #[test]
    fn test_buffer_pool_dirty_eviction_writeback() {
        let (pool, store, file_id) = create_test_pool(1);

        // Dirty one page, unpin it.
        let (first, frame) = pool.alloc_page(file_id).unwrap();
        frame.data_mut()[0] = 0xEE;
        pool.unpin_page(PageId::new(file_id, first), true);

        // Allocating another page evicts the first; its data must reach the
        // store.
        let (second, _) = pool.alloc_page(file_id).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.page_byte(first, 0), 0xEE);
        assert!(!pool.contains(PageId::new(file_id, first)));

        pool.unpin_page(PageId::new(file_id, second), false);

        // Reading the evicted page back restores the written byte.
        let frame = pool.read_page(file_id, first).unwrap();
        assert_eq!(frame.data()[0], 0xEE);
        pool.unpin_page(PageId::new(file_id, first), false);
    }

    #[test]
    fn test_buffer_pool_full_all_pinned() {
        let (pool, _, file_id) = create_test_pool(2);

        pool.alloc_page(file_id).unwrap();
        pool.alloc_page(file_id).unwrap();

        let result = pool.alloc_page(file_id);
        assert!(matches!(result, Err(ArborError::BufferPoolFull)));
    }

    #[test]
    fn test_buffer_pool_with_pinned() {
        let (pool, _, file_id) = create_test_pool(10);
        let (page_no, frame) = pool.alloc_page(file_id).unwrap();
        let page_id = PageId::new(file_id, page_no);
        frame.data_mut()[7] = 0x7F;

        let byte = pool.with_pinned(page_id, |data| data[7]);
        assert_eq!(byte, Some(0x7F));

        // Pin count untouched by the read.
        assert_eq!(frame.pin_count(), 1);

        pool.unpin_page(page_id, true);
        assert_eq!(pool.with_pinned(page_id, |data| data[7]), None);
    }

    #[test]
    fn test_buffer_pool_with_pinned_nonresident() {
        let (pool, _, file_id) = create_test_pool(10);
        assert!(pool
            .with_pinned(PageId::new(file_id, 5), |_| ())
            .is_none());
    }

    #[test]
    fn test_buffer_pool_flush_file() {
        let (pool, store, file_id) = create_test_pool(10);

        for i in 0..3 {
            let (page_no, frame) = pool.alloc_page(file_id).unwrap();
            frame.data_mut()[0] = 0x10 + i as u8;
            pool.unpin_page(PageId::new(file_id, page_no), true);
        }

        let flushed = pool.flush_file(file_id).unwrap();
        assert_eq!(flushed, 3);

        for i in 0..3u32 {
            assert_eq!(store.page_byte(i, 0), 0x10 + i as u8);
        }

        // Everything is clean now.
        assert_eq!(pool.flush_file(file_id).unwrap(), 0);
    }

    #[test]
    fn test_buffer_pool_flush_file_scoped_to_file() {
        let pool = BufferPool::new(BufferPoolConfig { num_frames: 10 });
        let store_a = MemStore::new();
        let store_b = MemStore::new();
        let file_a = pool.register_file("a.idx", store_a.clone());
        let file_b = pool.register_file("b.idx", store_b.clone());

        let (pa, fa) = pool.alloc_page(file_a).unwrap();
        fa.data_mut()[0] = 0xAA;
        pool.unpin_page(PageId::new(file_a, pa), true);

        let (pb, fb) = pool.alloc_page(file_b).unwrap();
        fb.data_mut()[0] = 0xBB;
        pool.unpin_page(PageId::new(file_b, pb), true);

        assert_eq!(pool.flush_file(file_a).unwrap(), 1);
        assert_eq!(store_a.page_byte(pa, 0), 0xAA);

        // File B's page is still dirty in the pool only.
        assert_eq!(store_b.page_byte(pb, 0), 0);
        assert_eq!(pool.flush_file(file_b).unwrap(), 1);
        assert_eq!(store_b.page_byte(pb, 0), 0xBB);
    }

    #[test]
    fn test_buffer_pool_stats() {
        let (pool, _, file_id) = create_test_pool(10);

        for i in 0..5 {
            let (page_no, _) = pool.alloc_page(file_id).unwrap();
            if i % 2 == 0 {
                pool.unpin_page(PageId::new(file_id, page_no), true); // Dirty
            }
            // Odd pages remain pinned
        }

        let stats = pool.stats();
        assert_eq!(stats.total_frames, 10);
        assert_eq!(stats.free_frames, 5);
        assert_eq!(stats.used_frames, 5);
        assert_eq!(stats.pinned_frames, 2); // Pages 1, 3
        assert_eq!(stats.pin_count_total, 2);
        assert_eq!(stats.dirty_frames, 3); // Pages 0, 2, 4
    }

    #[test]
    fn test_buffer_pool_pin_balance_after_workload() {
        let (pool, _, file_id) = create_test_pool(4);

        for _ in 0..3 {
            let (page_no, _) = pool.alloc_page(file_id).unwrap();
            pool.unpin_page(PageId::new(file_id, page_no), true);
        }
        for page_no in 0..3 {
            pool.read_page(file_id, page_no).unwrap();
            pool.unpin_page(PageId::new(file_id, page_no), false);
        }

        assert_eq!(pool.stats().pin_count_total, 0);
    }
}
