// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Allocation-strategy selection for outgoing envelope bytes.
//!
//! Small and medium responses are staged through a leased pool buffer;
//! large ones, and anything arriving while the pool is exhausted, are
//! allocated directly. The returned body never aliases a pool buffer.

use crate::config::POOL_THRESHOLD;
use crate::error::{Error, ErrorKind, Result};
use crate::pool::BufferPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How a response body was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    /// Staged through a leased pool buffer.
    Pooled,
    /// Above the threshold; allocated directly.
    Direct,
    /// Pool exhausted or buffer too small; allocated directly.
    PoolFallback,
}

/// Owned response body plus the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltResponse {
    pub body: Vec<u8>,
    pub strategy: BuildStrategy,
}

impl BuiltResponse {
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Counters per strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderStats {
    pub pooled: u64,
    pub direct: u64,
    pub fallback: u64,
}

/// Size estimate used for strategy selection.
pub fn estimate_size(content: &[u8]) -> usize {
    content.len()
}

pub struct SmartResponseBuilder {
    pool: Arc<BufferPool>,
    threshold: usize,
    pooled: AtomicU64,
    direct: AtomicU64,
    fallback: AtomicU64,
}

impl SmartResponseBuilder {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self::with_threshold(pool, POOL_THRESHOLD)
    }

    pub fn with_threshold(pool: Arc<BufferPool>, threshold: usize) -> Self {
        Self {
            pool,
            threshold,
            pooled: AtomicU64::new(0),
            direct: AtomicU64::new(0),
            fallback: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Produce an owned copy of `content`.
    ///
    /// `estimated` selects the strategy; the body length is always
    /// `content.len()`.
    pub fn build(&self, content: &[u8], estimated: usize) -> Result<BuiltResponse> {
        if estimated > self.threshold {
            self.direct.fetch_add(1, Ordering::Relaxed);
            return Ok(BuiltResponse {
                body: content.to_vec(),
                strategy: BuildStrategy::Direct,
            });
        }

        match self.build_pooled(content) {
            Ok(body) => {
                self.pooled.fetch_add(1, Ordering::Relaxed);
                Ok(BuiltResponse {
                    body,
                    strategy: BuildStrategy::Pooled,
                })
            }
            Err(e) if matches!(e.kind(), ErrorKind::Memory | ErrorKind::BufferTooSmall) => {
                log::warn!(
                    "[BUILDER] pool path unavailable for {} bytes ({}), allocating directly",
                    content.len(),
                    e
                );
                self.fallback.fetch_add(1, Ordering::Relaxed);
                Ok(BuiltResponse {
                    body: content.to_vec(),
                    strategy: BuildStrategy::PoolFallback,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Convenience: estimate from the content itself.
    pub fn build_auto(&self, content: &[u8]) -> Result<BuiltResponse> {
        self.build(content, estimate_size(content))
    }

    fn build_pooled(&self, content: &[u8]) -> Result<Vec<u8>> {
        let mut lease = self
            .pool
            .lease()
            .ok_or_else(|| Error::new(ErrorKind::Memory, "buffer pool exhausted"))?;
        let staged = lease.fill(content)?;
        Ok(staged.to_vec())
    }

    pub fn stats(&self) -> BuilderStats {
        BuilderStats {
            pooled: self.pooled.load(Ordering::Relaxed),
            direct: self.direct.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(capacity: usize, size: usize) -> SmartResponseBuilder {
        let pool = Arc::new(BufferPool::new(capacity, size).expect("pool"));
        SmartResponseBuilder::with_threshold(pool, size)
    }

    #[test]
    fn test_small_content_uses_pool_and_returns_buffer() {
        let b = builder(2, 64);
        let out = b.build_auto(b"<env/>").expect("build");
        assert_eq!(out.strategy, BuildStrategy::Pooled);
        assert_eq!(out.body, b"<env/>");
        assert_eq!(b.pool().available(), 2);
        assert_eq!(b.pool().stats().hits, 1);
    }

    #[test]
    fn test_large_content_goes_direct() {
        let b = builder(2, 16);
        let content = vec![b'x'; 100];
        let out = b.build_auto(&content).expect("build");
        assert_eq!(out.strategy, BuildStrategy::Direct);
        assert_eq!(out.len(), 100);
        assert_eq!(b.pool().stats().total_requests, 0);
    }

    #[test]
    fn test_exhausted_pool_falls_back() {
        let b = builder(1, 64);
        let _held = b.pool().lease().expect("lease");
        let out = b.build_auto(b"abc").expect("fallback never fails");
        assert_eq!(out.strategy, BuildStrategy::PoolFallback);
        assert_eq!(out.body, b"abc");
        assert_eq!(b.stats().fallback, 1);
        assert_eq!(b.pool().stats().misses, 1);
    }

    #[test]
    fn test_underestimate_falls_back_on_small_buffer() {
        let b = builder(1, 8);
        let content = vec![b'y'; 20];
        let out = b.build(&content, 4).expect("build");
        assert_eq!(out.strategy, BuildStrategy::PoolFallback);
        assert_eq!(out.body, content);
        assert_eq!(b.pool().available(), 1);
    }

    #[test]
    fn test_body_is_exact_length_with_embedded_nul() {
        let b = builder(1, 64);
        let out = b.build_auto(b"a\0b").expect("build");
        assert_eq!(out.len(), 3);
    }
}
