//! Error taxonomy for alertagg.
//!
//! Only [`AggregatorError::NoRules`] ever crosses the ingestion boundary in
//! normal operation. Notification outcomes are absorbed by the aggregator.

/// Errors returned by the [`Aggregator`](crate::aggregator::Aggregator) handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregatorError {
    #[error("no aggregation rules configured")]
    NoRules,

    #[error("aggregator is closed")]
    Closed,
}

/// Failure reported by a [`SummaryReceiver`](crate::sink::SummaryReceiver).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    /// Transient failure; the aggregation stays eligible for a later send.
    #[error("retryable notification failure: {0}")]
    Retryable(String),

    /// The notification will never succeed and is dropped.
    #[error("permanent notification failure: {0}")]
    Permanent(String),
}

impl NotificationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, NotificationError::Retryable(_))
    }
}

/// Errors produced while loading rules and aggregator settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid rules file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid filter {name}={pattern:?}: {source}")]
    InvalidFilter {
        name: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type for aggregator operations.
pub type Result<T> = std::result::Result<T, AggregatorError>;
