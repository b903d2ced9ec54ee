//! Notification sink boundary.
//!
//! The aggregator hands each aggregation's summary to a [`SummaryReceiver`]
//! and classifies the outcome with [`NotificationError::is_retryable`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::NotificationError;
use crate::event::{Event, Fingerprint};
use crate::rule::AggregationRule;

/// What a receiver is told about one aggregation: its rule and every event
/// accumulated so far, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub rule: Arc<AggregationRule>,
    pub fingerprint: Fingerprint,
    pub events: Vec<Event>,
}

/// Downstream consumer of aggregation summaries.
#[async_trait]
pub trait SummaryReceiver: Send + Sync {
    async fn receive(&self, summary: &EventSummary) -> Result<(), NotificationError>;
}

#[async_trait]
impl<T: SummaryReceiver + ?Sized> SummaryReceiver for Arc<T> {
    async fn receive(&self, summary: &EventSummary) -> Result<(), NotificationError> {
        (**self).receive(summary).await
    }
}

/// Receiver that writes each summary as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReceiver;

#[async_trait]
impl SummaryReceiver for LogReceiver {
    async fn receive(&self, summary: &EventSummary) -> Result<(), NotificationError> {
        let events = serde_json::to_string(&summary.events)
            .map_err(|e| NotificationError::Permanent(e.to_string()))?;
        info!(
            event = "notification",
            rule = %summary.rule.display_name(),
            fingerprint = %summary.fingerprint,
            count = summary.events.len(),
            events = %events,
        );
        Ok(())
    }
}
