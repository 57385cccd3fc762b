// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Buffer pool under concurrent lease/release.

use camd::response_builder::BuildStrategy;
use camd::{BufferPool, SmartResponseBuilder};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

#[test]
fn test_concurrent_leases_never_share_a_slot() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;

    let pool = BufferPool::new(4, 256).expect("pool");
    let held = parking_lot::Mutex::new(HashSet::new());
    let served = AtomicUsize::new(0);
    let barrier = Barrier::new(THREADS);

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let (pool, held, served, barrier) = (&pool, &held, &served, &barrier);
            s.spawn(move || {
                barrier.wait();
                for round in 0..ROUNDS {
                    let Some(mut lease) = pool.lease() else {
                        std::thread::yield_now();
                        continue;
                    };
                    assert!(held.lock().insert(lease.id()), "slot leased twice");

                    let stamp = [t as u8, round as u8];
                    let filled = lease.fill(&stamp).expect("fill").to_vec();
                    assert_eq!(filled, stamp);
                    served.fetch_add(1, Ordering::Relaxed);

                    assert!(held.lock().remove(&lease.id()));
                }
            });
        }
    });

    let stats = pool.stats();
    assert_eq!(pool.available(), 4);
    assert_eq!(stats.current_used, 0);
    assert!(stats.peak_used <= 4);
    assert_eq!(stats.hits, served.load(Ordering::Relaxed) as u64);
    assert_eq!(stats.total_requests, (THREADS * ROUNDS) as u64);
    assert_eq!(stats.hits + stats.misses, stats.total_requests);
}

#[test]
fn test_exhausted_pool_falls_back_to_heap() {
    let pool = Arc::new(BufferPool::new(1, 1024).expect("pool"));
    let builder = SmartResponseBuilder::with_threshold(Arc::clone(&pool), 1024);

    let held = pool.lease().expect("only buffer");
    let body = vec![b'x'; 512];
    let built = builder.build_auto(&body).expect("built without pool");
    assert_eq!(built.strategy, BuildStrategy::PoolFallback);
    assert_eq!(built.body, body);
    drop(held);

    let built = builder.build_auto(&body).expect("built from pool");
    assert_eq!(built.strategy, BuildStrategy::Pooled);
    assert_eq!(built.body, body);
    assert_eq!(pool.available(), 1);
    assert_eq!(pool.stats().misses, 1);

    let large = vec![b'y'; 4096];
    let built = builder.build_auto(&large).expect("built directly");
    assert_eq!(built.strategy, BuildStrategy::Direct);
    assert_eq!(builder.stats().fallback, 1);
}
