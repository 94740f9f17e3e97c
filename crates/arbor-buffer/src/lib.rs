//! Buffer management for Arbor.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable page count
//! - Clock eviction policy for cache management
//! - Pin counting with explicit unpin-dirty discipline
//! - Per-file dirty page flushing for write-back

mod frame;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, PageStore};
pub use replacer::ClockReplacer;
