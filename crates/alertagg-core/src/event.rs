//! Event model and fingerprinting.
//!
//! An [`Event`] is immutable once ingested. Its [`Fingerprint`] is derived
//! from the label set alone, so two events with identical labels always land
//! in the same aggregation even if they describe distinct occurrences.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity attributes of an event. Sorted, so iteration order is stable.
pub type Labels = BTreeMap<String, String>;

/// Free-form detail carried alongside the labels; never fingerprinted.
pub type Payload = BTreeMap<String, String>;

/// Ordered sequence of events, in arrival order.
pub type Events = Vec<Event>;

const LABEL_SEPARATOR: u8 = 0xff;

/// 64-bit grouping key computed from an event's labels.
///
/// Collisions between unrelated label sets are not detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint a label set.
    ///
    /// Each pair contributes `key 0xff value 0xff` to a SHA-256 stream; the
    /// first eight digest bytes are the fingerprint. `0xff` cannot appear in
    /// UTF-8, so the encoding is unambiguous.
    pub fn from_labels(labels: &Labels) -> Self {
        let mut hasher = Sha256::new();
        for (name, value) in labels {
            hasher.update(name.as_bytes());
            hasher.update([LABEL_SEPARATOR]);
            hasher.update(value.as_bytes());
            hasher.update([LABEL_SEPARATOR]);
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Fingerprint(u64::from_be_bytes(prefix))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Fingerprint {
    fn from(value: u64) -> Self {
        Fingerprint(value)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_be_bytes()))
    }
}

/// A single occurrence reported by a producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Short human-readable description.
    #[serde(default)]
    pub summary: String,
    /// Longer explanation of the condition.
    #[serde(default)]
    pub description: String,
    /// Identity attributes used for rule matching and fingerprinting.
    #[serde(default)]
    pub labels: Labels,
    /// Extra detail passed through to notifications.
    #[serde(default)]
    pub payload: Payload,
    /// When the producer created the event. Defaults to the time of decoding.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Create an event with the given labels, created now.
    pub fn new(summary: impl Into<String>, labels: Labels) -> Self {
        Self {
            summary: summary.into(),
            description: String::new(),
            labels,
            payload: Payload::new(),
            created_at: Utc::now(),
        }
    }

    /// Override the creation timestamp.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_labels(&self.labels)
    }
}

/// Build a [`Labels`] map from string pairs.
pub fn labels<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
