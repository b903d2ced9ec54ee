//! Per-fingerprint aggregation state.
//!
//! An [`AggregationInstance`] accumulates the events of one fingerprint and
//! tracks whether its notification has gone out. Dispatch state only moves
//! from [`DispatchState::Unsent`] to [`DispatchState::Sent`].

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::event::{Event, Events, Fingerprint};
use crate::obs;
use crate::rule::AggregationRule;
use crate::sink::{EventSummary, SummaryReceiver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Unsent,
    Sent,
}

/// Result of one [`AggregationInstance::send_notification`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Already sent; the receiver was not called.
    Skipped,
    Delivered,
    /// Retryable failure; the instance stays unsent.
    Deferred,
    /// Permanent failure; the instance is marked sent anyway.
    Dropped,
}

#[derive(Debug)]
pub struct AggregationInstance {
    fingerprint: Fingerprint,
    rule: Arc<AggregationRule>,
    events: Events,
    ends_at: DateTime<Utc>,
    state: DispatchState,
}

impl AggregationInstance {
    pub fn new(fingerprint: Fingerprint, rule: Arc<AggregationRule>, now: DateTime<Utc>) -> Self {
        Self {
            fingerprint,
            rule,
            events: Events::new(),
            ends_at: now,
            state: DispatchState::Unsent,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The rule that claimed the first event. Never re-evaluated.
    pub fn rule(&self) -> &Arc<AggregationRule> {
        &self.rule
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    /// Append an event. Duplicates are kept.
    pub fn ingest(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Push the expiry forward to `at`; earlier values are ignored.
    pub fn extend_expiry(&mut self, at: DateTime<Utc>) {
        if at > self.ends_at {
            self.ends_at = at;
        }
    }

    /// Keep only events created strictly after `now`. If that leaves nothing,
    /// the instance is marked sent. An already empty instance is untouched.
    pub fn tidy(&mut self, now: DateTime<Utc>) {
        if self.events.is_empty() {
            return;
        }

        self.events.retain(|e| e.created_at > now);

        if self.events.is_empty() {
            self.state = DispatchState::Sent;
        }
    }

    /// Whether the instance holds no events and its grace period has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.events.is_empty() && now >= self.ends_at
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            rule: Arc::clone(&self.rule),
            fingerprint: self.fingerprint,
            events: self.events.clone(),
        }
    }

    /// Hand the full event sequence to `receiver` unless already sent.
    pub async fn send_notification<R>(&mut self, receiver: &R) -> SendOutcome
    where
        R: SummaryReceiver + ?Sized,
    {
        if self.state == DispatchState::Sent {
            return SendOutcome::Skipped;
        }

        let outcome = match receiver.receive(&self.summary()).await {
            Ok(()) => {
                obs::emit_notification_sent(self.fingerprint, self.events.len());
                SendOutcome::Delivered
            }
            Err(e) if e.is_retryable() => {
                obs::emit_notification_deferred(self.fingerprint, &e);
                return SendOutcome::Deferred;
            }
            Err(e) => {
                obs::emit_notification_dropped(self.fingerprint, &e);
                SendOutcome::Dropped
            }
        };

        self.state = DispatchState::Sent;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use crate::event::labels;
    use crate::fakes::RecordingReceiver;
    use crate::rule::{Filters, DEFAULT_REPEAT_RATE};
    use chrono::Duration;

    fn instance(now: DateTime<Utc>) -> AggregationInstance {
        let rule = Arc::new(AggregationRule::new(Filters::default(), DEFAULT_REPEAT_RATE));
        let fp = Event::new("x", labels([("service", "db")])).fingerprint();
        AggregationInstance::new(fp, rule, now)
    }

    fn event_at(at: DateTime<Utc>) -> Event {
        Event::new("x", labels([("service", "db")])).created_at(at)
    }

    #[test]
    fn starts_unsent_and_empty() {
        let inst = instance(Utc::now());
        assert_eq!(inst.state(), DispatchState::Unsent);
        assert!(inst.events().is_empty());
    }

    #[test]
    fn ingest_keeps_duplicates_in_order() {
        let now = Utc::now();
        let mut inst = instance(now);
        let e = event_at(now);
        inst.ingest(e.clone());
        inst.ingest(e.clone());
        inst.ingest(event_at(now + Duration::seconds(1)));
        assert_eq!(inst.events().len(), 3);
        assert_eq!(inst.events()[0], e);
        assert_eq!(inst.events()[1], e);
    }

    #[test]
    fn tidy_keeps_only_future_dated_events() {
        let now = Utc::now();
        let mut inst = instance(now);
        let future = event_at(now + Duration::minutes(5));
        inst.ingest(event_at(now - Duration::minutes(5)));
        inst.ingest(event_at(now));
        inst.ingest(future.clone());

        inst.tidy(now);

        assert_eq!(inst.events(), &[future]);
        assert_eq!(inst.state(), DispatchState::Unsent);
    }

    #[test]
    fn tidy_that_empties_forces_sent() {
        let now = Utc::now();
        let mut inst = instance(now);
        inst.ingest(event_at(now - Duration::seconds(1)));

        inst.tidy(now);

        assert!(inst.events().is_empty());
        assert_eq!(inst.state(), DispatchState::Sent);
    }

    #[test]
    fn tidy_on_empty_instance_leaves_state_alone() {
        let now = Utc::now();
        let mut inst = instance(now);
        inst.tidy(now);
        assert_eq!(inst.state(), DispatchState::Unsent);
    }

    #[test]
    fn expiry_only_moves_forward() {
        let now = Utc::now();
        let mut inst = instance(now);
        inst.extend_expiry(now + Duration::minutes(5));
        inst.extend_expiry(now + Duration::minutes(1));
        assert_eq!(inst.ends_at(), now + Duration::minutes(5));
    }

    #[test]
    fn expired_requires_empty_and_past_deadline() {
        let now = Utc::now();
        let mut inst = instance(now);
        inst.extend_expiry(now + Duration::minutes(5));
        assert!(!inst.is_expired(now));
        assert!(inst.is_expired(now + Duration::minutes(5)));

        inst.ingest(event_at(now + Duration::hours(1)));
        assert!(!inst.is_expired(now + Duration::minutes(10)));
    }

    #[tokio::test]
    async fn successful_send_marks_sent_and_never_resends() {
        let now = Utc::now();
        let receiver = RecordingReceiver::new();
        let mut inst = instance(now);
        inst.ingest(event_at(now));

        assert_eq!(inst.send_notification(&receiver).await, SendOutcome::Delivered);
        assert_eq!(inst.state(), DispatchState::Sent);

        inst.ingest(event_at(now));
        assert_eq!(inst.send_notification(&receiver).await, SendOutcome::Skipped);
        assert_eq!(inst.send_notification(&receiver).await, SendOutcome::Skipped);
        assert_eq!(receiver.call_count(), 1);
    }

    #[tokio::test]
    async fn retryable_failure_stays_unsent() {
        let now = Utc::now();
        let receiver = RecordingReceiver::failing(NotificationError::Retryable("busy".into()));
        let mut inst = instance(now);
        inst.ingest(event_at(now));

        assert_eq!(inst.send_notification(&receiver).await, SendOutcome::Deferred);
        assert_eq!(inst.state(), DispatchState::Unsent);

        inst.ingest(event_at(now));
        assert_eq!(inst.send_notification(&receiver).await, SendOutcome::Deferred);
        let received = receiver.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].events.len(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_dropped_and_marked_sent() {
        let now = Utc::now();
        let receiver = RecordingReceiver::failing(NotificationError::Permanent("gone".into()));
        let mut inst = instance(now);
        inst.ingest(event_at(now));

        assert_eq!(inst.send_notification(&receiver).await, SendOutcome::Dropped);
        assert_eq!(inst.state(), DispatchState::Sent);
        assert_eq!(inst.send_notification(&receiver).await, SendOutcome::Skipped);
        assert_eq!(receiver.call_count(), 1);
    }

    #[tokio::test]
    async fn sweep_emptied_instance_never_sends() {
        let now = Utc::now();
        let receiver = RecordingReceiver::failing(NotificationError::Retryable("busy".into()));
        let mut inst = instance(now);
        inst.ingest(event_at(now));
        inst.send_notification(&receiver).await;
        assert_eq!(inst.state(), DispatchState::Unsent);

        inst.tidy(now + Duration::seconds(1));
        assert_eq!(inst.state(), DispatchState::Sent);

        receiver.set_failure(None);
        inst.ingest(event_at(now));
        assert_eq!(inst.send_notification(&receiver).await, SendOutcome::Skipped);
        assert_eq!(receiver.call_count(), 1);
    }
}
