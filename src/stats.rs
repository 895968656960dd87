//! Bridge counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of bridge activity since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Inbound calls that reached the engine.
    pub native_calls: u64,
    /// Method resolutions that queried the engine.
    pub resolutions: u64,
    /// Virtual calls answered by a managed override.
    pub virtual_dispatches: u64,
    /// Virtual calls left to the native default.
    pub virtual_fallthroughs: u64,
    /// Signal deliveries that reached a managed handler.
    pub signal_deliveries: u64,
    /// Marshaling failures on any path.
    pub marshal_errors: u64,
    /// Outbound calls dropped because of an error.
    pub dropped_outbound: u64,
    /// Releases queued from other threads and not yet applied.
    pub pending_releases: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub native_calls: AtomicU64,
    pub virtual_dispatches: AtomicU64,
    pub virtual_fallthroughs: AtomicU64,
    pub signal_deliveries: AtomicU64,
    pub marshal_errors: AtomicU64,
    pub dropped_outbound: AtomicU64,
}

impl StatsCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, resolutions: u64, pending_releases: usize) -> BridgeStats {
        BridgeStats {
            native_calls: self.native_calls.load(Ordering::Relaxed),
            resolutions,
            virtual_dispatches: self.virtual_dispatches.load(Ordering::Relaxed),
            virtual_fallthroughs: self.virtual_fallthroughs.load(Ordering::Relaxed),
            signal_deliveries: self.signal_deliveries.load(Ordering::Relaxed),
            marshal_errors: self.marshal_errors.load(Ordering::Relaxed),
            dropped_outbound: self.dropped_outbound.load(Ordering::Relaxed),
            pending_releases: pending_releases as u64,
        }
    }
}
