//! Bookkeeping for redirected allocations
//!
//! Every region handed out by the redirect path is recorded here as
//! `address -> size`, so the unmap interceptor can release the allocation we
//! actually made rather than whatever length the caller passes back. The
//! address is stored as a plain integer: the tracker never holds a live
//! handle to the memory.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Snapshot of tracker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Regions currently tracked
    pub live_regions: usize,
    /// Bytes currently tracked
    pub live_bytes: usize,
    /// High-water mark of `live_bytes`
    pub peak_bytes: usize,
    /// Regions ever inserted
    pub total_tracked: u64,
    /// Regions removed by an unmap
    pub total_released: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    regions: HashMap<usize, usize>,
    stats: TrackerStats,
}

/// Address-keyed map of live redirected regions behind a single mutex.
///
/// The lock only ever covers the map mutation itself; callers must not hold
/// it across I/O.
#[derive(Debug, Default)]
pub struct AllocationTracker {
    state: Mutex<TrackerState>,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the map consistent (each
    // operation is a single insert/remove), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record a redirected region.
    ///
    /// Returns the size previously recorded at `addr`, which can only happen
    /// if that region was released behind our back and the kernel reused the
    /// address.
    pub fn insert(&self, addr: usize, size: usize) -> Option<usize> {
        let mut state = self.lock();
        let previous = state.regions.insert(addr, size);
        let stats = &mut state.stats;
        if let Some(old) = previous {
            stats.live_bytes = stats.live_bytes.saturating_sub(old);
        } else {
            stats.live_regions += 1;
        }
        stats.live_bytes += size;
        stats.peak_bytes = stats.peak_bytes.max(stats.live_bytes);
        stats.total_tracked += 1;
        previous
    }

    /// Atomically look up and forget `addr`, returning its tracked size.
    pub fn remove_if_present(&self, addr: usize) -> Option<usize> {
        let mut state = self.lock();
        let size = state.regions.remove(&addr)?;
        let stats = &mut state.stats;
        stats.live_regions -= 1;
        stats.live_bytes = stats.live_bytes.saturating_sub(size);
        stats.total_released += 1;
        Some(size)
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.lock().regions.contains_key(&addr)
    }

    pub fn tracked_size(&self, addr: usize) -> Option<usize> {
        self.lock().regions.get(&addr).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().regions.is_empty()
    }

    pub fn stats(&self) -> TrackerStats {
        self.lock().stats
    }

    /// Forget every record and return them, sorted by address.
    ///
    /// Bookkeeping only: the regions themselves are left mapped.
    pub fn drain(&self) -> Vec<(usize, usize)> {
        let regions = {
            let mut state = self.lock();
            state.stats.live_regions = 0;
            state.stats.live_bytes = 0;
            std::mem::take(&mut state.regions)
        };
        let mut records: Vec<_> = regions.into_iter().collect();
        records.sort_unstable();
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_and_remove() {
        let tracker = AllocationTracker::new();
        assert!(tracker.is_empty());

        assert_eq!(tracker.insert(0x1000, 4096), None);
        assert!(tracker.contains(0x1000));
        assert_eq!(tracker.tracked_size(0x1000), Some(4096));
        assert_eq!(tracker.len(), 1);

        assert_eq!(tracker.remove_if_present(0x1000), Some(4096));
        assert_eq!(tracker.remove_if_present(0x1000), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_miss_does_not_disturb_records() {
        let tracker = AllocationTracker::new();
        tracker.insert(0x2000, 100);
        assert_eq!(tracker.remove_if_present(0x3000), None);
        assert_eq!(tracker.tracked_size(0x2000), Some(100));
        assert_eq!(tracker.stats().total_released, 0);
    }

    #[test]
    fn test_stats_track_peak() {
        let tracker = AllocationTracker::new();
        tracker.insert(0x1000, 300);
        tracker.insert(0x9000, 700);
        tracker.remove_if_present(0x1000);

        let stats = tracker.stats();
        assert_eq!(stats.live_regions, 1);
        assert_eq!(stats.live_bytes, 700);
        assert_eq!(stats.peak_bytes, 1000);
        assert_eq!(stats.total_tracked, 2);
        assert_eq!(stats.total_released, 1);
    }

    #[test]
    fn test_reinsert_same_address_keeps_single_record() {
        let tracker = AllocationTracker::new();
        tracker.insert(0x1000, 300);
        assert_eq!(tracker.insert(0x1000, 500), Some(300));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.stats().live_bytes, 500);
    }

    #[test]
    fn test_drain_forgets_everything() {
        let tracker = AllocationTracker::new();
        tracker.insert(0x3000, 3);
        tracker.insert(0x1000, 1);
        tracker.insert(0x2000, 2);

        let drained = tracker.drain();
        assert_eq!(drained, vec![(0x1000, 1), (0x2000, 2), (0x3000, 3)]);
        assert!(tracker.is_empty());
        assert_eq!(tracker.stats().live_bytes, 0);
        assert_eq!(tracker.stats().peak_bytes, 6);
    }

    #[test]
    fn test_concurrent_insert_remove() {
        let tracker = Arc::new(AllocationTracker::new());
        let handles: Vec<_> = (0..8usize)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for i in 0..500usize {
                        let addr = (t << 32) | (i << 12);
                        tracker.insert(addr, 4096);
                        if i % 2 == 0 {
                            assert_eq!(tracker.remove_if_present(addr), Some(4096));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = tracker.stats();
        assert_eq!(tracker.len(), 8 * 250);
        assert_eq!(stats.live_bytes, 8 * 250 * 4096);
        assert_eq!(stats.total_tracked, 8 * 500);
        assert_eq!(stats.total_released, 8 * 250);
    }
}
