//! Single-writer aggregation actor.
//!
//! [`Aggregator::new`] returns two halves:
//! - [`Aggregator`], the handle producers call. Each call becomes a request
//!   message carrying a `oneshot` reply channel and waits for the answer.
//! - [`Dispatcher`], the worker. Its [`run`](Dispatcher::run) loop is the only
//!   code that touches the rule list and the fingerprint table, multiplexing
//!   ingestion requests, rule replacements and a periodic sweep.
//!
//! # Usage
//!
//! ```rust,ignore
//! let (aggregator, dispatcher) = Aggregator::new(AggregatorConfig::default());
//! tokio::spawn(dispatcher.run(LogReceiver));
//!
//! aggregator.set_rules(rules).await?;
//! aggregator.receive(events).await?;
//! aggregator.close().await;
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument};

use crate::config::AggregatorConfig;
use crate::error::{AggregatorError, Result};
use crate::event::{Events, Fingerprint};
use crate::instance::{AggregationInstance, SendOutcome};
use crate::metrics::Metrics;
use crate::obs;
use crate::rule::{first_match, AggregationRules};
use crate::sink::SummaryReceiver;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

struct AggregateEventsRequest {
    events: Events,
    respond_to: oneshot::Sender<Result<()>>,
}

struct ReplaceRulesRequest {
    rules: AggregationRules,
    respond_to: oneshot::Sender<()>,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Rule list plus fingerprint table.
///
/// Owned by a [`Dispatcher`]; never shared. Public so hosts with their own
/// event loop can drive it directly.
#[derive(Debug)]
pub struct AggregatorState {
    rules: AggregationRules,
    aggregates: HashMap<Fingerprint, AggregationInstance>,
    eviction_grace: chrono::Duration,
    metrics: Arc<Metrics>,
}

impl AggregatorState {
    pub fn new(eviction_grace: Duration, metrics: Arc<Metrics>) -> Self {
        let eviction_grace = chrono::Duration::from_std(eviction_grace)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        Self {
            rules: AggregationRules::new(),
            aggregates: HashMap::new(),
            eviction_grace,
            metrics,
        }
    }

    pub fn rules(&self) -> &AggregationRules {
        &self.rules
    }

    pub fn aggregation(&self, fingerprint: Fingerprint) -> Option<&AggregationInstance> {
        self.aggregates.get(&fingerprint)
    }

    /// Number of live aggregations.
    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// Route a batch to its aggregations, notifying each one right after the
    /// event lands. Fails without touching anything if no rules are set.
    ///
    /// Events no rule claims are dropped silently.
    pub async fn aggregate<R>(
        &mut self,
        events: Events,
        receiver: &R,
        now: DateTime<Utc>,
    ) -> Result<()>
    where
        R: SummaryReceiver + ?Sized,
    {
        if self.rules.is_empty() {
            return Err(AggregatorError::NoRules);
        }

        debug!(events = events.len(), "aggregating batch");
        self.metrics.inc_events_received(events.len() as u64);
        let expires_at = now
            .checked_add_signed(self.eviction_grace)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        for event in events {
            let Some(rule) = first_match(&self.rules, &event) else {
                self.metrics.inc_events_unmatched();
                continue;
            };

            let fingerprint = event.fingerprint();
            let instance = match self.aggregates.entry(fingerprint) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    obs::emit_aggregation_created(fingerprint, &rule.display_name());
                    self.metrics.inc_aggregations_created();
                    entry.insert(AggregationInstance::new(fingerprint, Arc::clone(rule), now))
                }
            };

            instance.ingest(event);
            instance.extend_expiry(expires_at);

            match instance.send_notification(receiver).await {
                SendOutcome::Delivered => self.metrics.inc_notifications_sent(),
                SendOutcome::Deferred => self.metrics.inc_notifications_deferred(),
                SendOutcome::Dropped => self.metrics.inc_notifications_dropped(),
                SendOutcome::Skipped => {}
            }
        }

        self.metrics.set_aggregations_active(self.aggregates.len() as u64);
        Ok(())
    }

    /// Swap in a new rule list. Existing aggregations keep their rule.
    pub fn replace_rules(&mut self, rules: AggregationRules) {
        obs::emit_rules_replaced(rules.len());
        self.rules = rules;
    }

    /// Tidy every aggregation, then evict the expired ones. Returns the
    /// number evicted.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        for instance in self.aggregates.values_mut() {
            instance.tidy(now);
        }

        let before = self.aggregates.len();
        self.aggregates.retain(|_, instance| !instance.is_expired(now));
        let evicted = before - self.aggregates.len();

        self.metrics.inc_sweeps();
        self.metrics.inc_aggregations_evicted(evicted as u64);
        self.metrics.set_aggregations_active(self.aggregates.len() as u64);
        obs::emit_sweep_completed(self.aggregates.len(), evicted);
        evicted
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Producer-facing handle. Every call is serviced by the [`Dispatcher`] in
/// the order its request is accepted.
pub struct Aggregator {
    aggregate_tx: mpsc::Sender<AggregateEventsRequest>,
    rules_tx: mpsc::Sender<ReplaceRulesRequest>,
    closed_rx: oneshot::Receiver<()>,
    metrics: Arc<Metrics>,
}

impl Aggregator {
    /// Create an aggregator with no rules and an empty table.
    ///
    /// The returned [`Dispatcher`] must be driven for any call to complete.
    pub fn new(config: AggregatorConfig) -> (Self, Dispatcher) {
        let capacity = config.request_buffer.max(1);
        let (aggregate_tx, aggregate_rx) = mpsc::channel(capacity);
        let (rules_tx, rules_rx) = mpsc::channel(capacity);
        let (closed_tx, closed_rx) = oneshot::channel();
        let metrics = Arc::new(Metrics::new());

        let dispatcher = Dispatcher {
            state: AggregatorState::new(config.eviction_grace, Arc::clone(&metrics)),
            sweep_interval: config.sweep_interval.max(MIN_SWEEP_INTERVAL),
            aggregate_rx,
            rules_rx,
            closed_tx,
        };

        let aggregator = Self {
            aggregate_tx,
            rules_tx,
            closed_rx,
            metrics,
        };

        (aggregator, dispatcher)
    }

    /// Create an aggregator and spawn its dispatcher on the current runtime.
    pub fn spawn<R>(config: AggregatorConfig, receiver: R) -> Self
    where
        R: SummaryReceiver + 'static,
    {
        let (aggregator, dispatcher) = Self::new(config);
        tokio::spawn(dispatcher.run(receiver));
        aggregator
    }

    /// Ingest a batch and wait until the dispatcher has processed all of it.
    ///
    /// Returns [`AggregatorError::NoRules`] if no rules are configured, in
    /// which case nothing in the batch is processed.
    pub async fn receive(&self, events: Events) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.aggregate_tx
            .send(AggregateEventsRequest { events, respond_to })
            .await
            .map_err(|_| AggregatorError::Closed)?;
        response.await.map_err(|_| AggregatorError::Closed)?
    }

    /// Replace the whole rule list and wait for the dispatcher to apply it.
    pub async fn set_rules(&self, rules: AggregationRules) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.rules_tx
            .send(ReplaceRulesRequest { rules, respond_to })
            .await
            .map_err(|_| AggregatorError::Closed)?;
        response.await.map_err(|_| AggregatorError::Closed)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Close both request channels and wait for the dispatcher to finish
    /// the requests already queued.
    pub async fn close(self) {
        let Self {
            aggregate_tx,
            rules_tx,
            closed_rx,
            ..
        } = self;
        drop(rules_tx);
        drop(aggregate_tx);
        // An error means the dispatcher is already gone.
        closed_rx.await.ok();
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// The worker half of an [`Aggregator`].
pub struct Dispatcher {
    state: AggregatorState,
    sweep_interval: Duration,
    aggregate_rx: mpsc::Receiver<AggregateEventsRequest>,
    rules_rx: mpsc::Receiver<ReplaceRulesRequest>,
    closed_tx: oneshot::Sender<()>,
}

impl Dispatcher {
    /// Service requests and sweeps until both request channels are closed.
    ///
    /// Ready sources are picked without priority. A sweep never overlaps a
    /// request; it runs between them.
    #[instrument(skip_all, name = "aggregator_dispatch")]
    pub async fn run<R>(mut self, receiver: R)
    where
        R: SummaryReceiver,
    {
        info!(sweep_interval_ms = self.sweep_interval.as_millis() as u64, "aggregator started");

        let mut sweep_timer = tokio::time::interval(self.sweep_interval);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        sweep_timer.tick().await;

        let mut aggregate_open = true;
        let mut rules_open = true;

        while aggregate_open || rules_open {
            tokio::select! {
                request = self.aggregate_rx.recv(), if aggregate_open => match request {
                    Some(AggregateEventsRequest { events, respond_to }) => {
                        let result = self.state.aggregate(events, &receiver, Utc::now()).await;
                        // The caller may have given up waiting.
                        let _ = respond_to.send(result);
                    }
                    None => aggregate_open = false,
                },
                request = self.rules_rx.recv(), if rules_open => match request {
                    Some(ReplaceRulesRequest { rules, respond_to }) => {
                        self.state.replace_rules(rules);
                        let _ = respond_to.send(());
                    }
                    None => rules_open = false,
                },
                _ = sweep_timer.tick() => {
                    self.state.sweep(Utc::now());
                }
            }
        }

        obs::emit_aggregator_stopped(self.state.len());
        let _ = self.closed_tx.send(());
    }
}
