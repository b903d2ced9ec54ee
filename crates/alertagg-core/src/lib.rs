//! alertagg core library
//!
//! Groups a stream of events into rule-scoped aggregations keyed by a label
//! fingerprint and sends one notification per aggregation. All shared state
//! lives in a single actor; see [`aggregator`].

pub mod aggregator;
pub mod config;
pub mod error;
pub mod event;
pub mod fakes;
pub mod instance;
pub mod metrics;
pub mod obs;
pub mod rule;
pub mod sink;
pub mod telemetry;

pub use aggregator::{Aggregator, AggregatorState, Dispatcher};
pub use config::{AggregatorConfig, RulesFile};
pub use error::{AggregatorError, ConfigError, NotificationError, Result};
pub use event::{labels, Event, Events, Fingerprint, Labels, Payload};
pub use instance::{AggregationInstance, DispatchState, SendOutcome};
pub use metrics::Metrics;
pub use rule::{AggregationRule, AggregationRules, Filter, Filters, DEFAULT_REPEAT_RATE};
pub use sink::{EventSummary, LogReceiver, SummaryReceiver};
pub use telemetry::init_tracing;

/// alertagg version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
