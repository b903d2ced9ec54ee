//! Atomic counters for aggregator observability.
//!
//! One [`Metrics`] value is shared between an [`Aggregator`](crate::Aggregator)
//! handle and its dispatcher. Counters are bumped silently at the call site;
//! call [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    events_received: AtomicU64,
    events_unmatched: AtomicU64,
    aggregations_created: AtomicU64,
    aggregations_evicted: AtomicU64,
    aggregations_active: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_deferred: AtomicU64,
    notifications_dropped: AtomicU64,
    sweeps: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_unmatched: AtomicU64::new(0),
            aggregations_created: AtomicU64::new(0),
            aggregations_evicted: AtomicU64::new(0),
            aggregations_active: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_deferred: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
        }
    }

    pub(crate) fn inc_events_received(&self, count: u64) {
        self.events_received.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn inc_events_unmatched(&self) {
        self.events_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_aggregations_created(&self) {
        self.aggregations_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "aggregations_created", "counter incremented");
    }

    pub(crate) fn inc_aggregations_evicted(&self, count: u64) {
        self.aggregations_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn set_aggregations_active(&self, count: u64) {
        self.aggregations_active.store(count, Ordering::Relaxed);
    }

    pub(crate) fn inc_notifications_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "notifications_sent", "counter incremented");
    }

    pub(crate) fn inc_notifications_deferred(&self) {
        self.notifications_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_notifications_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_sweeps(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            events_received = self.events_received(),
            events_unmatched = self.events_unmatched(),
            aggregations_created = self.aggregations_created(),
            aggregations_evicted = self.aggregations_evicted(),
            aggregations_active = self.aggregations_active(),
            notifications_sent = self.notifications_sent(),
            notifications_deferred = self.notifications_deferred(),
            notifications_dropped = self.notifications_dropped(),
            sweeps = self.sweeps(),
        );
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Events that no rule claimed.
    pub fn events_unmatched(&self) -> u64 {
        self.events_unmatched.load(Ordering::Relaxed)
    }

    pub fn aggregations_created(&self) -> u64 {
        self.aggregations_created.load(Ordering::Relaxed)
    }

    pub fn aggregations_evicted(&self) -> u64 {
        self.aggregations_evicted.load(Ordering::Relaxed)
    }

    /// Size of the fingerprint table after the last mutation.
    pub fn aggregations_active(&self) -> u64 {
        self.aggregations_active.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    /// Sends that failed with a retryable error.
    pub fn notifications_deferred(&self) -> u64 {
        self.notifications_deferred.load(Ordering::Relaxed)
    }

    /// Sends that failed permanently and were discarded.
    pub fn notifications_dropped(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.events_received(), 0);
        m.inc_events_received(3);
        m.inc_events_unmatched();
        assert_eq!(m.events_received(), 3);
        assert_eq!(m.events_unmatched(), 1);

        m.inc_notifications_sent();
        m.inc_notifications_deferred();
        m.inc_notifications_deferred();
        m.inc_notifications_dropped();
        assert_eq!(m.notifications_sent(), 1);
        assert_eq!(m.notifications_deferred(), 2);
        assert_eq!(m.notifications_dropped(), 1);
    }

    #[test]
    fn active_gauge_is_overwritten() {
        let m = Metrics::new();
        m.set_aggregations_active(5);
        m.set_aggregations_active(2);
        assert_eq!(m.aggregations_active(), 2);
    }
}
