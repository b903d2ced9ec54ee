//! In-memory receiver fake (testing only).
//!
//! [`RecordingReceiver`] keeps every summary it is handed and answers with a
//! scripted outcome, so tests can assert exactly what was dispatched.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::NotificationError;
use crate::sink::{EventSummary, SummaryReceiver};

#[derive(Debug, Default)]
pub struct RecordingReceiver {
    received: Mutex<Vec<EventSummary>>,
    failure: Mutex<Option<NotificationError>>,
}

impl RecordingReceiver {
    /// A receiver that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A receiver that records every summary and then fails with `error`.
    pub fn failing(error: NotificationError) -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            failure: Mutex::new(Some(error)),
        }
    }

    /// Change the outcome of subsequent calls. `None` means success.
    pub fn set_failure(&self, error: Option<NotificationError>) {
        *self.failure.lock().unwrap() = error;
    }

    /// Summaries received so far, in call order.
    pub fn received(&self) -> Vec<EventSummary> {
        self.received.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl SummaryReceiver for RecordingReceiver {
    async fn receive(&self, summary: &EventSummary) -> Result<(), NotificationError> {
        self.received.lock().unwrap().push(summary.clone());
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
