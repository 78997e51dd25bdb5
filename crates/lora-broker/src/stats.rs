// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters updated by the uplink pipeline and downlink dispatch.
#[derive(Debug)]
pub struct BrokerStats {
    /// Uplink copies received from routers.
    pub uplinks_received: AtomicU64,

    /// Copies folded into another caller's window.
    pub duplicates_absorbed: AtomicU64,

    /// Deduplicated uplinks delivered to a handler.
    pub uplinks_forwarded: AtomicU64,

    /// Batches dropped on a terminal error.
    pub uplinks_failed: AtomicU64,

    pub downlinks_dispatched: AtomicU64,
    pub downlinks_failed: AtomicU64,

    pub created: Instant,
}

impl BrokerStats {
    pub fn new() -> Self {
        Self {
            uplinks_received: AtomicU64::new(0),
            duplicates_absorbed: AtomicU64::new(0),
            uplinks_forwarded: AtomicU64::new(0),
            uplinks_failed: AtomicU64::new(0),
            downlinks_dispatched: AtomicU64::new(0),
            downlinks_failed: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> BrokerStatsSnapshot {
        BrokerStatsSnapshot {
            uplinks_received: self.uplinks_received.load(Ordering::Relaxed),
            duplicates_absorbed: self.duplicates_absorbed.load(Ordering::Relaxed),
            uplinks_forwarded: self.uplinks_forwarded.load(Ordering::Relaxed),
            uplinks_failed: self.uplinks_failed.load(Ordering::Relaxed),
            downlinks_dispatched: self.downlinks_dispatched.load(Ordering::Relaxed),
            downlinks_failed: self.downlinks_failed.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

impl Default for BrokerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of broker statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStatsSnapshot {
    pub uplinks_received: u64,
    pub duplicates_absorbed: u64,
    pub uplinks_forwarded: u64,
    pub uplinks_failed: u64,
    pub downlinks_dispatched: u64,
    pub downlinks_failed: u64,
    pub uptime_secs: u64,
}

impl BrokerStatsSnapshot {
    /// Average number of received copies per forwarded uplink.
    pub fn duplication_factor(&self) -> f64 {
        if self.uplinks_forwarded > 0 {
            self.uplinks_received as f64 / self.uplinks_forwarded as f64
        } else {
            0.0
        }
    }
}
