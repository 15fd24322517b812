//! Read Routing Module
//!
//! Round-robin selection over the ordered replica list. There is no health
//! awareness: a down replica is picked on its turn and the read fails.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};

/// Round-robin selector over replica indexes
pub struct ReadRouter {
    /// Number of replicas
    len: usize,
    /// Index handed out by the next call
    cursor: AtomicUsize,
    /// Total reads routed
    routed: AtomicUsize,
}

impl ReadRouter {
    /// Create a router over `len` replicas
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::Config("read router needs at least one replica".into()));
        }

        Ok(Self {
            len,
            cursor: AtomicUsize::new(0),
            routed: AtomicUsize::new(0),
        })
    }

    /// Take the current index and advance, wrapping to zero
    pub fn next(&self) -> usize {
        self.routed.fetch_add(1, Ordering::Relaxed);

        // The closure always returns Some, so this cannot fail
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % self.len))
        {
            Ok(prev) | Err(prev) => prev,
        }
    }

    /// Get stats about the router state
    pub fn stats(&self) -> ReadRouterStats {
        ReadRouterStats {
            replica_count: self.len,
            next_index: self.cursor.load(Ordering::Acquire),
            total_reads_routed: self.routed.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about read routing
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReadRouterStats {
    /// Number of replicas in rotation
    pub replica_count: usize,
    /// Index the next read will use
    pub next_index: usize,
    /// Total reads routed
    pub total_reads_routed: usize,
}
