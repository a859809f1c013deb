//! Lock-free fixed-capacity slot allocator used for descriptor-set, tag-storage, and
//! memory-table slot allocation. One `AtomicU64` per 64 slots; `acquire` scans for a
//! zero bit and flips it with `fetch_or`/CAS, `release` clears it with `fetch_and`.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct ConcurrentBitPool {
    words: Vec<AtomicU64>,
    capacity: usize,
}

impl ConcurrentBitPool {
    pub fn new(capacity: usize) -> Self {
        let word_count = (capacity + 63) / 64;
        let words = (0..word_count).map(|_| AtomicU64::new(0)).collect();
        ConcurrentBitPool { words, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Claims the lowest-index free slot, or `None` if the pool is exhausted.
    pub fn acquire(&self) -> Option<usize> {
        for (word_index, word) in self.words.iter().enumerate() {
            let mut current = word.load(Ordering::Relaxed);
            loop {
                let free = !current;
                if free == 0 {
                    break;
                }
                let bit = free.trailing_zeros();
                let slot = word_index * 64 + bit as usize;
                if slot >= self.capacity {
                    break;
                }
                let desired = current | (1u64 << bit);
                match word.compare_exchange_weak(
                    current,
                    desired,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Some(slot),
                    Err(observed) => current = observed,
                }
            }
        }
        None
    }

    pub fn release(&self, slot: usize) {
        debug_assert!(slot < self.capacity);
        let word_index = slot / 64;
        let bit = slot % 64;
        self.words[word_index].fetch_and(!(1u64 << bit), Ordering::AcqRel);
    }

    pub fn is_acquired(&self, slot: usize) -> bool {
        let word_index = slot / 64;
        let bit = slot % 64;
        self.words[word_index].load(Ordering::Acquire) & (1u64 << bit) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_never_hands_out_the_same_slot_twice() {
        let pool = Arc::new(ConcurrentBitPool::new(128));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                let mut acquired = Vec::new();
                for _ in 0..16 {
                    acquired.push(pool.acquire().expect("pool has capacity for all threads"));
                }
                acquired
            }));
        }
        let mut all: Vec<usize> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        let before_dedup = all.len();
        all.dedup();
        assert_eq!(all.len(), before_dedup, "every acquired slot must be unique");
    }

    #[test]
    fn exhausted_pool_returns_none() {
        let pool = ConcurrentBitPool::new(4);
        for _ in 0..4 {
            assert!(pool.acquire().is_some());
        }
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn released_slot_can_be_reacquired() {
        let pool = ConcurrentBitPool::new(4);
        let slot = pool.acquire().unwrap();
        pool.release(slot);
        assert!(!pool.is_acquired(slot));
        assert!(pool.acquire().is_some());
    }
}
