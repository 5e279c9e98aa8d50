//! Strip/tile output cache (spec section 4.9): buffers decoded tile-component strips until they
//! can be emitted to the caller in raster order, even though tiles (and the resolutions within a
//! tile) finish decoding out of order under the scheduler (spec section 4.8).
//!
//! Spec section 9's ADDED design note grounds `admit` returning `Option<RangeInclusive<u32>>`
//! (a single call can unblock a run of consecutive rows, not just one) on
//! `examples/original_source/src/lib/core/util/MinHeap.h`'s `SimpleHeap<T>::push_and_pop`, which
//! this module reimplements with `std::collections::BinaryHeap` plus `Reverse` instead of a
//! hand-rolled binary heap array.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::ops::RangeInclusive;

/// One pending strip: its starting row and the decoded sample data.
struct PendingStrip<T> {
    row: u32,
    data: T,
}

impl<T> PartialEq for PendingStrip<T> {
    fn eq(&self, other: &Self) -> bool {
        self.row == other.row
    }
}
impl<T> Eq for PendingStrip<T> {}
impl<T> PartialOrd for PendingStrip<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for PendingStrip<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.row.cmp(&other.row)
    }
}

/// Orders strips by row, lowest first, and emits the longest prefix of consecutive rows starting
/// at `next_row` once it becomes available.
pub struct StripCache<T> {
    heap: BinaryHeap<Reverse<PendingStrip<T>>>,
    next_row: u32,
    strip_height: u32,
}

impl<T> StripCache<T> {
    pub fn new(strip_height: u32) -> Self {
        StripCache {
            heap: BinaryHeap::new(),
            next_row: 0,
            strip_height: strip_height.max(1),
        }
    }

    /// Registers one finished strip starting at `row`. Returns the inclusive row range now ready
    /// for emission (possibly spanning several strips that were held back waiting for this one),
    /// draining them from the cache, or `None` if `row` is still ahead of `next_row`.
    pub fn admit(&mut self, row: u32, data: T) -> Option<(RangeInclusive<u32>, Vec<T>)> {
        self.heap.push(Reverse(PendingStrip { row, data }));
        if row != self.next_row {
            return None;
        }
        let mut drained = Vec::new();
        let start = self.next_row;
        while let Some(Reverse(top)) = self.heap.peek() {
            if top.row != self.next_row {
                break;
            }
            let Reverse(strip) = self.heap.pop().unwrap();
            drained.push(strip.data);
            self.next_row += self.strip_height;
        }
        let end = self.next_row - self.strip_height;
        Some((start..=end, drained))
    }

    pub fn pending_count(&self) -> usize {
        self.heap.len()
    }
}

/// A small pool of reusable scratch buffers, avoiding a fresh allocation per worker task (spec
/// section 4.8, "per-worker scratch-buffer pools").
pub struct BufferPool {
    free: Vec<Vec<i32>>,
    default_capacity: usize,
}

impl BufferPool {
    pub fn new(default_capacity: usize) -> Self {
        BufferPool {
            free: Vec::new(),
            default_capacity,
        }
    }

    pub fn acquire(&mut self) -> Vec<i32> {
        self.free
            .pop()
            .map(|mut v| {
                v.clear();
                v
            })
            .unwrap_or_else(|| Vec::with_capacity(self.default_capacity))
    }

    pub fn release(&mut self, buf: Vec<i32>) {
        self.free.push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_admission_releases_in_order() {
        let mut cache = StripCache::new(1);
        assert!(cache.admit(2, "c").is_none());
        assert!(cache.admit(1, "b").is_none());
        let (range, data) = cache.admit(0, "a").unwrap();
        assert_eq!(range, 0..=2);
        assert_eq!(data, vec!["a", "b", "c"]);
    }

    #[test]
    fn partial_run_emits_only_the_contiguous_prefix() {
        let mut cache = StripCache::new(1);
        assert!(cache.admit(1, "b").is_none());
        assert!(cache.admit(3, "d").is_none());
        let (range, data) = cache.admit(0, "a").unwrap();
        assert_eq!(range, 0..=1);
        assert_eq!(data, vec!["a", "b"]);
        assert_eq!(cache.pending_count(), 1);
        let (range2, data2) = cache.admit(2, "c").unwrap();
        assert_eq!(range2, 2..=3);
        assert_eq!(data2, vec!["c", "d"]);
    }

    #[test]
    fn buffer_pool_reuses_released_buffers() {
        let mut pool = BufferPool::new(16);
        let mut buf = pool.acquire();
        buf.extend_from_slice(&[1, 2, 3]);
        pool.release(buf);
        let buf2 = pool.acquire();
        assert!(buf2.is_empty());
        assert!(buf2.capacity() >= 3);
    }
}
