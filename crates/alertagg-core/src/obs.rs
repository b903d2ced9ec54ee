//! Structured observability hooks for the aggregator lifecycle.
//!
//! Each function emits one event with a stable `event = "..."` key so log
//! pipelines can filter on it. Unmatched events are deliberately not logged.

use tracing::{debug, info, warn};

use crate::event::Fingerprint;

/// Emit event: a new aggregation was created for `fingerprint`.
pub fn emit_aggregation_created(fingerprint: Fingerprint, rule: &str) {
    info!(event = "aggregation.created", fingerprint = %fingerprint, rule = %rule);
}

/// Emit event: a summary was delivered.
pub fn emit_notification_sent(fingerprint: Fingerprint, event_count: usize) {
    info!(event = "notification.sent", fingerprint = %fingerprint, events = event_count);
}

/// Emit event: a retryable failure left the aggregation unsent.
pub fn emit_notification_deferred(fingerprint: Fingerprint, error: &dyn std::fmt::Display) {
    debug!(event = "notification.deferred", fingerprint = %fingerprint, error = %error);
}

/// Emit event: a permanent failure; the notification is discarded (warning level).
pub fn emit_notification_dropped(fingerprint: Fingerprint, error: &dyn std::fmt::Display) {
    warn!(event = "notification.dropped", fingerprint = %fingerprint, error = %error);
}

pub fn emit_rules_replaced(count: usize) {
    info!(event = "rules.replaced", count = count);
}

pub fn emit_sweep_completed(active: usize, evicted: usize) {
    debug!(event = "sweep.completed", active = active, evicted = evicted);
}

pub fn emit_aggregator_stopped(active: usize) {
    info!(event = "aggregator.stopped", active = active);
}
