//! Aggregator settings and the TOML rules file.
//!
//! ```toml
//! [aggregator]
//! sweep_interval_secs = 1
//! eviction_grace_secs = 300
//!
//! [[rules]]
//! name = "database"
//! repeat_rate_secs = 7200
//! filters = [{ name = "service", value = "db" }]
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rule::{AggregationRule, AggregationRules};

/// Serde adapter storing a [`Duration`] as whole seconds.
pub(crate) mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Runtime settings for the aggregator actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Period of the tidy sweep over all aggregations.
    #[serde(rename = "sweep_interval_secs", with = "serde_secs")]
    pub sweep_interval: Duration,
    /// How long an emptied aggregation lingers after its last ingest before
    /// it is evicted from the fingerprint table.
    #[serde(rename = "eviction_grace_secs", with = "serde_secs")]
    pub eviction_grace: Duration,
    /// Capacity of each request channel.
    pub request_buffer: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            eviction_grace: Duration::from_secs(5 * 60),
            request_buffer: 1,
        }
    }
}

/// Contents of a rules file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub rules: Vec<AggregationRule>,
}

impl RulesFile {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Rules in file order, ready for [`Aggregator::set_rules`](crate::Aggregator::set_rules).
    pub fn into_rules(self) -> AggregationRules {
        self.rules.into_iter().map(Arc::new).collect()
    }
}
