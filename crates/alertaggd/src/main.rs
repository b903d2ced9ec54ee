//! alertaggd - feeds events from stdin through the aggregator
//!
//! Each stdin line is one batch: a JSON event object or an array of them.
//! Notifications are written to the log. On EOF or Ctrl-C the aggregator is
//! closed and final counters are flushed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alertagg_core::{Aggregator, AggregatorConfig, Event, Events, LogReceiver, RulesFile};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "alertaggd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Aggregate newline-delimited JSON events into notifications", long_about = None)]
struct Cli {
    /// Rules file (TOML)
    #[arg(long, env = "ALERTAGG_RULES")]
    rules: PathBuf,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override the sweep interval from the rules file
    #[arg(long, env = "ALERTAGG_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    /// Override the eviction grace period from the rules file
    #[arg(long, env = "ALERTAGG_EVICTION_GRACE_SECS")]
    eviction_grace_secs: Option<u64>,
}

impl Cli {
    fn aggregator_config(&self, mut config: AggregatorConfig) -> AggregatorConfig {
        if let Some(secs) = self.sweep_interval_secs {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.eviction_grace_secs {
            config.eviction_grace = Duration::from_secs(secs);
        }
        config
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    Many(Events),
    One(Event),
}

/// Decode one input line. Blank lines yield `None`.
fn parse_batch(line: &str) -> serde_json::Result<Option<Events>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(match serde_json::from_str(line)? {
        Batch::Many(events) => events,
        Batch::One(event) => vec![event],
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    alertagg_core::init_tracing(cli.json, level);

    let file = RulesFile::load(&cli.rules)
        .with_context(|| format!("Failed to load rules from {}", cli.rules.display()))?;
    let config = cli.aggregator_config(file.aggregator.clone());
    let rules = file.into_rules();
    info!(rules = rules.len(), path = %cli.rules.display(), "rules loaded");

    let aggregator = Aggregator::spawn(config, LogReceiver);
    aggregator
        .set_rules(rules)
        .await
        .context("Failed to install rules")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("stdin closed");
                    break;
                };
                match parse_batch(&line) {
                    Ok(Some(events)) => {
                        if let Err(e) = aggregator.receive(events).await {
                            warn!(error = %e, "batch rejected");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "skipping malformed line"),
                }
            }
            _ = &mut shutdown => {
                info!("interrupt received");
                break;
            }
        }
    }

    let metrics = Arc::clone(aggregator.metrics());
    aggregator.close().await;
    metrics.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_event() {
        let events = parse_batch(r#"{"summary": "disk full", "labels": {"service": "db"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label("service"), Some("db"));
    }

    #[test]
    fn parse_array_is_one_batch() {
        let events = parse_batch(
            r#"[{"labels": {"service": "db"}}, {"labels": {"service": "web"}}]"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].label("service"), Some("web"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_batch("   ").unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(parse_batch("{not json").is_err());
    }

    #[test]
    fn cli_overrides_file_settings() {
        let cli = Cli::parse_from([
            "alertaggd",
            "--rules",
            "rules.toml",
            "--sweep-interval-secs",
            "10",
        ]);
        let config = cli.aggregator_config(AggregatorConfig::default());
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.eviction_grace, AggregatorConfig::default().eviction_grace);
    }
}
