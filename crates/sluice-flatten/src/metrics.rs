//! Engine counters.
//!
//! Lock-free and cheap; read them through `snapshot`. Wire these up to a
//! metrics exporter in the binary layer if you need more.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct EngineStats {
    started: AtomicU64,
    completed: AtomicU64,
    superseded: AtomicU64,
    dropped: AtomicU64,
    relayed: AtomicU64,
    active: AtomicUsize,
    backlog_peak: AtomicUsize,
}

/// Point-in-time copy of an engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Projector calls that produced a sub-stream.
    pub started: u64,
    /// Activations whose sub-stream ran to completion.
    pub completed: u64,
    /// Switch activations retired by a newer value.
    pub superseded: u64,
    /// Exhaust values discarded without projection.
    pub dropped: u64,
    /// Chunks pushed to the outbound port.
    pub relayed: u64,
    /// Activations live right now.
    pub active: usize,
    /// Largest merge backlog seen.
    pub backlog_peak: usize,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            relayed: self.relayed.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            backlog_peak: self.backlog_peak.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_active(&self, active: usize) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Record a backlog length; updates the peak if higher.
    pub(crate) fn record_backlog(&self, len: usize) {
        let mut cur = self.backlog_peak.load(Ordering::Relaxed);
        while len > cur {
            match self.backlog_peak.compare_exchange(
                cur,
                len,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
        tracing::trace!(backlog = len, peak = self.backlog_peak.load(Ordering::Relaxed), "backlog");
    }
}
