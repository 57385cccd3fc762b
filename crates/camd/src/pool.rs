// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed buffer pool for medium-sized response bodies.
//!
//! Pre-allocates N buffers of S bytes, managed via a lock-free freelist of
//! slot ids. A lease is an owned guard: the slot goes back on the freelist
//! when the guard drops, on every exit path.
//!
//! # Design
//! - **Non-blocking:** `lease()` pops the freelist; an empty freelist is a
//!   miss and returns `None` so the caller falls back to direct allocation.
//! - **Single owner:** a slot id is either on the freelist or held by exactly
//!   one [`BufferLease`].
//! - **Metrics:** hits, misses, in-use, peak, utilization.
//!
//! # Memory Budget
//! - 50 buffers x 32 KiB = 1.6 MiB (default config)

use crate::config::{BUFFER_POOL_SIZE, BUFFER_SIZE, POOL_UTILIZATION_WARN_PERCENT};
use crate::error::{Error, Result};
use crossbeam::queue::ArrayQueue;
use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Pool counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Leases served from the pool.
    pub hits: u64,
    /// Lease attempts that found the pool exhausted.
    pub misses: u64,
    /// Buffers currently leased.
    pub current_used: usize,
    /// Highest `current_used` observed.
    pub peak_used: usize,
    /// `hits + misses`.
    pub total_requests: u64,
    /// `current_used` as a percentage of capacity.
    pub utilization_percent: u32,
    /// `peak_used` as a percentage of capacity.
    pub peak_utilization_percent: u32,
}

/// Fixed set of reusable byte buffers.
pub struct BufferPool {
    slots: Box<[Mutex<Box<[u8]>>]>,
    freelist: ArrayQueue<usize>,
    buffer_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    in_use: AtomicUsize,
    peak: AtomicUsize,
    high_water_warned: AtomicBool,
}

impl BufferPool {
    /// Create a pool of `capacity` buffers, each `buffer_size` bytes.
    pub fn new(capacity: usize, buffer_size: usize) -> Result<Self> {
        if capacity == 0 || buffer_size == 0 {
            return Err(Error::invalid("buffer pool capacity and size must be non-zero"));
        }

        let slots: Box<[Mutex<Box<[u8]>>]> = (0..capacity)
            .map(|_| Mutex::new(vec![0u8; buffer_size].into_boxed_slice()))
            .collect();

        let freelist = ArrayQueue::new(capacity);
        for id in 0..capacity {
            freelist
                .push(id)
                .map_err(|_| Error::generic("freelist init failed: capacity mismatch"))?;
        }

        log::debug!(
            "[POOL] created {} buffers x {} bytes",
            capacity,
            buffer_size
        );

        Ok(Self {
            slots,
            freelist,
            buffer_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            high_water_warned: AtomicBool::new(false),
        })
    }

    /// Pool with the default geometry (50 x 32 KiB).
    pub fn with_defaults() -> Result<Self> {
        Self::new(BUFFER_POOL_SIZE, BUFFER_SIZE)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Buffers currently on the freelist.
    pub fn available(&self) -> usize {
        self.freelist.len()
    }

    /// Lease a buffer. Never blocks: returns `None` when exhausted.
    pub fn lease(&self) -> Option<BufferLease<'_>> {
        let Some(id) = self.freelist.pop() else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        self.hits.fetch_add(1, Ordering::Relaxed);
        let used = self.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(used, Ordering::AcqRel);
        self.check_utilization(used);

        #[cfg(feature = "pool-trace")]
        log::debug!("[POOL] lease id={} in_use={}", id, used);

        // The slot id came off the freelist, so no other lease holds this lock.
        let data = self.slots[id].lock();
        Some(BufferLease {
            pool: self,
            id,
            data: Some(data),
        })
    }

    fn check_utilization(&self, used: usize) {
        let percent = percent_of(used, self.capacity());
        if percent >= POOL_UTILIZATION_WARN_PERCENT {
            if !self.high_water_warned.swap(true, Ordering::Relaxed) {
                log::warn!(
                    "[POOL] utilization {}% ({}/{} buffers in use)",
                    percent,
                    used,
                    self.capacity()
                );
            }
        } else {
            self.high_water_warned.store(false, Ordering::Relaxed);
        }
    }

    fn release(&self, id: usize) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        if self.freelist.push(id).is_err() {
            // Only reachable if a slot id were duplicated; keep running.
            log::error!("[POOL] freelist full on release of id={}", id);
        }

        #[cfg(feature = "pool-trace")]
        log::debug!("[POOL] release id={}", id);
    }

    pub fn stats(&self) -> PoolStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let current_used = self.in_use.load(Ordering::Acquire);
        let peak_used = self.peak.load(Ordering::Acquire);
        PoolStats {
            hits,
            misses,
            current_used,
            peak_used,
            total_requests: hits + misses,
            utilization_percent: percent_of(current_used, self.capacity()),
            peak_utilization_percent: percent_of(peak_used, self.capacity()),
        }
    }

    /// Zero hit/miss counters; peak restarts from the current in-use count.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.peak
            .store(self.in_use.load(Ordering::Acquire), Ordering::Release);
    }
}

fn percent_of(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part * 100) / whole) as u32
}

/// Exclusive lease on one pool buffer; returned to the pool on drop.
pub struct BufferLease<'a> {
    pool: &'a BufferPool,
    id: usize,
    data: Option<MutexGuard<'a, Box<[u8]>>>,
}

impl BufferLease<'_> {
    /// Slot id (stable for the lease lifetime).
    pub fn id(&self) -> usize {
        self.id
    }

    /// Copy `content` into the start of the buffer and return the filled prefix.
    pub fn fill(&mut self, content: &[u8]) -> Result<&[u8]> {
        let buf: &mut [u8] = self;
        if content.len() > buf.len() {
            return Err(Error::buffer_too_small(format!(
                "content {} bytes exceeds pool buffer {} bytes",
                content.len(),
                buf.len()
            )));
        }
        buf[..content.len()].copy_from_slice(content);
        Ok(&buf[..content.len()])
    }
}

impl Deref for BufferLease<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.data {
            Some(guard) => &guard[..],
            None => &[],
        }
    }
}

impl DerefMut for BufferLease<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.data {
            Some(guard) => &mut guard[..],
            None => &mut [],
        }
    }
}

impl Drop for BufferLease<'_> {
    fn drop(&mut self) {
        // Unlock the slot before it becomes visible on the freelist.
        drop(self.data.take());
        self.pool.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_pool_creation() {
        let pool = BufferPool::new(4, 1024).expect("pool");
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.buffer_size(), 1024);
        assert!(BufferPool::new(0, 1024).is_err());
        assert!(BufferPool::new(4, 0).is_err());
    }

    #[test]
    fn test_lease_returns_on_drop() {
        let pool = BufferPool::new(2, 64).expect("pool");
        {
            let lease = pool.lease().expect("lease");
            assert_eq!(lease.len(), 64);
            assert_eq!(pool.available(), 1);
            assert_eq!(pool.stats().current_used, 1);
        }
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.stats().current_used, 0);
    }

    #[test]
    fn test_lease_returns_on_error_path() {
        fn fails(pool: &BufferPool) -> Result<()> {
            let mut lease = pool.lease().ok_or_else(|| Error::generic("exhausted"))?;
            lease.fill(&[0u8; 128])?;
            Ok(())
        }

        let pool = BufferPool::new(1, 64).expect("pool");
        let err = fails(&pool).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BufferTooSmall);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_pool_exhaustion_graceful_failure() {
        let pool = BufferPool::new(3, 32).expect("pool");
        let a = pool.lease().expect("a");
        let b = pool.lease().expect("b");
        let c = pool.lease().expect("c");

        assert!(pool.lease().is_none());
        assert!(pool.lease().is_none());

        let stats = pool.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.total_requests, 5);
        assert_eq!(stats.utilization_percent, 100);

        drop(b);
        let d = pool.lease().expect("slot freed by b");
        drop((a, c, d));
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.stats().peak_used, 3);
    }

    #[test]
    fn test_fill_copies_prefix() {
        let pool = BufferPool::new(1, 16).expect("pool");
        let mut lease = pool.lease().expect("lease");
        let filled = lease.fill(b"hello").expect("fits").to_vec();
        assert_eq!(filled, b"hello");
        assert_eq!(&lease[..5], b"hello");
    }

    #[test]
    fn test_reset_stats() {
        let pool = BufferPool::new(2, 16).expect("pool");
        let held = pool.lease().expect("lease");
        let _ = pool.lease();
        let _ = pool.lease();
        pool.reset_stats();
        let stats = pool.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.current_used, 1);
        assert_eq!(stats.peak_used, 1);
        drop(held);
    }

    #[test]
    fn test_concurrent_leases_are_exclusive() {
        let pool = Arc::new(BufferPool::new(8, 32).expect("pool"));
        let seen = Arc::new(Mutex::new(HashSet::new()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let pool = Arc::clone(&pool);
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Some(mut lease) = pool.lease() {
                            assert!(seen.lock().insert(lease.id()), "slot leased twice");
                            lease[0] = t as u8;
                            std::thread::yield_now();
                            assert_eq!(lease[0], t as u8);
                            assert!(seen.lock().remove(&lease.id()));
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread");
        }
        assert_eq!(pool.available(), 8);
        let stats = pool.stats();
        assert_eq!(stats.total_requests, 8 * 500);
        assert_eq!(stats.current_used, 0);
    }
}
