//! Clock page replacement for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clock replacement algorithm.
///
/// Reference bits are atomics so access recording never takes the lock; the
/// mutex protects only the candidate set and the clock hand. A frame is an
/// eviction candidate once it has been seen by `record_access`; whether it
/// may actually be evicted is decided by the caller's predicate (pin count),
/// checked at eviction time.
pub struct ClockReplacer {
    /// Number of frames.
    num_frames: usize,
    /// Reference bits for each frame.
    reference_bits: Vec<AtomicBool>,
    /// Candidate set and clock hand.
    inner: Mutex<ClockReplacerInner>,
}

struct ClockReplacerInner {
    /// Frames known to the replacer.
    candidates: HashSet<FrameId>,
    /// Current clock hand position.
    clock_hand: usize,
}

impl ClockReplacer {
    /// Creates a new clock replacer with the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        let reference_bits: Vec<AtomicBool> =
            (0..num_frames).map(|_| AtomicBool::new(false)).collect();

        Self {
            num_frames,
            reference_bits,
            inner: Mutex::new(ClockReplacerInner {
                candidates: HashSet::new(),
                clock_hand: 0,
            }),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }

    /// Returns the number of candidate frames.
    pub fn len(&self) -> usize {
        self.inner.lock().candidates.len()
    }

    /// Returns true if no frames are known to the replacer.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().candidates.is_empty()
    }

    /// Records that the given frame was accessed, giving it a second chance.
    #[inline]
    pub fn record_access(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.reference_bits[idx].store(true, Ordering::Relaxed);
            self.inner.lock().candidates.insert(frame_id);
        }
    }

    /// Selects a victim frame for eviction.
    ///
    /// `can_evict` is consulted for each candidate whose reference bit is
    /// clear; frames it rejects (still pinned) are skipped. Returns None if
    /// no candidate is evictable.
    pub fn evict<F>(&self, can_evict: F) -> Option<FrameId>
    where
        F: Fn(FrameId) -> bool,
    {
        let mut inner = self.inner.lock();

        if inner.candidates.is_empty() {
            return None;
        }

        // Make at most two full rotations: the first pass clears reference
        // bits, the second finds a victim among the cleared frames.
        for _ in 0..(2 * self.num_frames) {
            let hand = inner.clock_hand;
            let frame_id = FrameId(hand as u32);
            inner.clock_hand = (hand + 1) % self.num_frames;

            if inner.candidates.contains(&frame_id) && can_evict(frame_id) {
                if self.reference_bits[hand].load(Ordering::Relaxed) {
                    self.reference_bits[hand].store(false, Ordering::Relaxed);
                } else {
                    inner.candidates.remove(&frame_id);
                    return Some(frame_id);
                }
            }
        }

        // Everything evictable kept its reference bit refreshed; fall back to
        // any candidate the predicate accepts.
        let victim = inner
            .candidates
            .iter()
            .copied()
            .find(|&frame_id| can_evict(frame_id));
        if let Some(frame_id) = victim {
            inner.candidates.remove(&frame_id);
            self.reference_bits[frame_id.0 as usize].store(false, Ordering::Relaxed);
        }
        victim
    }

    /// Removes a frame from the replacer.
    pub fn remove(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx < self.num_frames {
            self.inner.lock().candidates.remove(&frame_id);
            self.reference_bits[idx].store(false, Ordering::Relaxed);
        }
    }
}
