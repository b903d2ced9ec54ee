//! Aggregation rules and label filters.
//!
//! Rules are evaluated in configured order and the first rule whose
//! [`Filters`] handle an event claims it. Matching is a pure predicate.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::serde_secs;
use crate::error::ConfigError;
use crate::event::Event;

/// Default interval between repeated notifications for one aggregation.
pub const DEFAULT_REPEAT_RATE: Duration = Duration::from_secs(2 * 60 * 60);

/// Serialized form of a [`Filter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterSpec {
    name: String,
    value: String,
}

/// Matches one label by exact name and a whole-value regular expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "FilterSpec", into = "FilterSpec")]
pub struct Filter {
    name: String,
    pattern: String,
    value: Regex,
}

impl Filter {
    /// Compile a filter. `pattern` must match the entire label value.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let pattern = pattern.into();
        let value = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            ConfigError::InvalidFilter {
                name: name.clone(),
                pattern: pattern.clone(),
                source,
            }
        })?;
        Ok(Self {
            name,
            pattern,
            value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handles(&self, event: &Event) -> bool {
        event
            .label(&self.name)
            .is_some_and(|value| self.value.is_match(value))
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.pattern == other.pattern
    }
}

impl TryFrom<FilterSpec> for Filter {
    type Error = ConfigError;

    fn try_from(spec: FilterSpec) -> Result<Self, Self::Error> {
        Filter::new(spec.name, spec.value)
    }
}

impl From<Filter> for FilterSpec {
    fn from(filter: Filter) -> Self {
        FilterSpec {
            name: filter.name,
            value: filter.pattern,
        }
    }
}

/// Conjunction of filters. An empty set handles every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(Vec<Filter>);

impl Filters {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self(filters)
    }

    pub fn handles(&self, event: &Event) -> bool {
        self.0.iter().all(|f| f.handles(event))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Filter> for Filters {
    fn from_iter<I: IntoIterator<Item = Filter>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Scope for a family of aggregations: which events it claims and how often
/// it may repeat a notification.
///
/// `repeat_rate` is carried for configuration and reporting; the dispatch
/// state machine sends at most once per aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRule {
    /// Label used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub filters: Filters,
    #[serde(
        rename = "repeat_rate_secs",
        with = "serde_secs",
        default = "default_repeat_rate"
    )]
    pub repeat_rate: Duration,
}

fn default_repeat_rate() -> Duration {
    DEFAULT_REPEAT_RATE
}

impl AggregationRule {
    pub fn new(filters: Filters, repeat_rate: Duration) -> Self {
        Self {
            name: None,
            filters,
            repeat_rate,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether this rule claims `event`.
    pub fn handles(&self, event: &Event) -> bool {
        self.filters.handles(event)
    }

    /// Name for logging; falls back to a filter listing.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None if self.filters.is_empty() => "*".to_string(),
            None => self
                .filters
                .iter()
                .map(|f| format!("{}=~{}", f.name(), f.pattern()))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Ordered rule list. Rules are shared read-only with the aggregations they own.
pub type AggregationRules = Vec<Arc<AggregationRule>>;

/// Return the first rule in `rules` that handles `event`.
pub fn first_match<'a>(
    rules: &'a [Arc<AggregationRule>],
    event: &Event,
) -> Option<&'a Arc<AggregationRule>> {
    rules.iter().find(|rule| rule.handles(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::labels;

    fn rule(filters: &[(&str, &str)]) -> Arc<AggregationRule> {
        let filters = filters
            .iter()
            .map(|(n, v)| Filter::new(*n, *v).unwrap())
            .collect();
        Arc::new(AggregationRule::new(filters, DEFAULT_REPEAT_RATE))
    }

    #[test]
    fn test_filter_requires_whole_value_match() {
        let f = Filter::new("service", "db").unwrap();
        assert!(f.handles(&Event::new("x", labels([("service", "db")]))));
        assert!(!f.handles(&Event::new("x", labels([("service", "db-replica")]))));
        assert!(!f.handles(&Event::new("x", labels([("host", "db")]))));
    }

    #[test]
    fn test_filter_regex_alternation_is_anchored() {
        let f = Filter::new("service", "db|cache").unwrap();
        assert!(f.handles(&Event::new("x", labels([("service", "cache")]))));
        assert!(!f.handles(&Event::new("x", labels([("service", "dbx")]))));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = Filter::new("service", "(").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFilter { .. }));
    }

    #[test]
    fn test_filters_are_a_conjunction() {
        let r = rule(&[("service", "db"), ("severity", "critical")]);
        assert!(r.handles(&Event::new(
            "x",
            labels([("service", "db"), ("severity", "critical")])
        )));
        assert!(!r.handles(&Event::new("x", labels([("service", "db")]))));
    }

    #[test]
    fn test_empty_filters_handle_everything() {
        let r = rule(&[]);
        assert!(r.handles(&Event::new("x", labels([]))));
        assert_eq!(r.display_name(), "*");
    }

    #[test]
    fn test_first_match_wins_in_order() {
        let specific = rule(&[("service", "db")]);
        let catch_all = rule(&[]);
        let rules = vec![specific.clone(), catch_all.clone()];
        let event = Event::new("x", labels([("service", "db")]));
        let owner = first_match(&rules, &event).unwrap();
        assert!(Arc::ptr_eq(owner, &specific));

        let other = Event::new("x", labels([("service", "web")]));
        let owner = first_match(&rules, &other).unwrap();
        assert!(Arc::ptr_eq(owner, &catch_all));
    }

    #[test]
    fn test_no_match_returns_none() {
        let rules = vec![rule(&[("service", "db")])];
        assert!(first_match(&rules, &Event::new("x", labels([("service", "web")]))).is_none());
    }

    #[test]
    fn test_filter_serializes_as_source_pattern() {
        let r = rule(&[("service", "db|cache")]);
        let json = serde_json::to_value(r.as_ref()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "filters": [{"name": "service", "value": "db|cache"}],
                "repeat_rate_secs": 7200
            })
        );
    }
}
