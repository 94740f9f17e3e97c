//! Pinned-page access for one index file.
//!
//! The pager pairs an index file with the shared buffer pool and exposes
//! page access as scoped pins. `PinnedPage` guarantees exactly one unpin per
//! pin on every exit path and carries the dirty flag: a page is unpinned
//! dirty iff it was written under that pin.

use crate::file::IndexFile;
use arbor_buffer::{BufferFrame, BufferPool};
use arbor_common::page::{PageId, PAGE_SIZE};
use arbor_common::{ArborError, Result};
use std::cell::Cell;
use std::sync::Arc;

/// Page access for one index file, routed through the buffer pool.
pub struct Pager {
    /// The backing paged file.
    file: Arc<IndexFile>,
    /// Shared buffer pool.
    pool: Arc<BufferPool>,
    /// This file's ID within the pool.
    file_id: u32,
}

impl Pager {
    /// Creates a pager for a file already registered with the pool.
    pub fn new(file: Arc<IndexFile>, pool: Arc<BufferPool>, file_id: u32) -> Self {
        Self {
            file,
            pool,
            file_id,
        }
    }

    /// Returns the page number of the file's first page (the meta page).
    pub fn first_page_no(&self) -> u32 {
        self.file.first_page_no()
    }

    /// Returns the buffer pool this pager runs against.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Returns the backing file.
    pub fn file(&self) -> &IndexFile {
        &self.file
    }

    fn page_id(&self, page_no: u32) -> PageId {
        PageId::new(self.file_id, page_no)
    }

    /// Allocates a new page at the end of the file, pinned and zeroed.
    pub fn alloc_page(&self) -> Result<PinnedPage<'_>> {
        let (page_no, frame) = self.pool.alloc_page(self.file_id)?;
        Ok(PinnedPage::new(self, frame, page_no))
    }

    /// Reads an existing page, pinned.
    pub fn read_page(&self, page_no: u32) -> Result<PinnedPage<'_>> {
        let frame = self.pool.read_page(self.file_id, page_no)?;
        Ok(PinnedPage::new(self, frame, page_no))
    }

    /// Releases a pin kept past its guard (see `PinnedPage::keep`).
    pub fn unpin(&self, page_no: u32, dirty: bool) {
        self.pool.unpin_page(self.page_id(page_no), dirty);
    }

    /// Runs `f` over a page pinned via `PinnedPage::keep`, without touching
    /// the pin count.
    pub fn with_page<R>(&self, page_no: u32, f: impl FnOnce(&[u8; PAGE_SIZE]) -> R) -> Result<R> {
        self.pool
            .with_pinned(self.page_id(page_no), f)
            .ok_or_else(|| ArborError::PageNotFound {
                file: self.file.path().display().to_string(),
                page_no,
            })
    }

    /// Writes all of this file's dirty pages out of the pool and syncs.
    pub fn flush(&self) -> Result<()> {
        self.pool.flush_file(self.file_id)?;
        Ok(())
    }
}

/// A pinned page frame, unpinned exactly once when dropped.
///
/// The dirty flag starts clear and is set by any `write` (or an explicit
/// `mark_dirty`), so the unpin reports dirty iff the page was mutated under
/// this pin.
pub struct PinnedPage<'a> {
    pager: &'a Pager,
    frame: &'a BufferFrame,
    page_no: u32,
    dirty: Cell<bool>,
    armed: Cell<bool>,
}

impl<'a> PinnedPage<'a> {
    fn new(pager: &'a Pager, frame: &'a BufferFrame, page_no: u32) -> Self {
        Self {
            pager,
            frame,
            page_no,
            dirty: Cell::new(false),
            armed: Cell::new(true),
        }
    }

    /// Returns the page number of the pinned page.
    pub fn page_no(&self) -> u32 {
        self.page_no
    }

    /// Runs `f` over the page data.
    pub fn read<R>(&self, f: impl FnOnce(&[u8; PAGE_SIZE]) -> R) -> R {
        let data = self.frame.data();
        f(&data)
    }

    /// Runs `f` over the page data mutably, marking the pin dirty.
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> R) -> R {
        self.dirty.set(true);
        let mut data = self.frame.data_mut();
        f(&mut data)
    }

    /// Marks the pin dirty without writing through the guard.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Disarms the guard, keeping the pin alive past the guard's lifetime.
    ///
    /// The caller takes over the unpin obligation and must eventually call
    /// `Pager::unpin` with the returned page number. Used by the scanner,
    /// which holds its current leaf pinned between calls.
    pub fn keep(self) -> u32 {
        self.armed.set(false);
        self.page_no
    }
}

impl Drop for PinnedPage<'_> {
    fn drop(&mut self) {
        if self.armed.get() {
            self.pager
                .pool
                .unpin_page(self.pager.page_id(self.page_no), self.dirty.get());
        }
    }
}
