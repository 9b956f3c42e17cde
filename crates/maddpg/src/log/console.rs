//! Console logging backend.

use super::MetricLogger;
use std::collections::{BTreeMap, HashMap};

/// Logger that prints metrics via tracing, one line per agent.
///
/// Metric names of the form `agent/metric` are grouped by their prefix.
pub struct ConsoleLogger;

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self
    }

    fn format_groups(metrics: &HashMap<String, f64>) -> Vec<String> {
        let mut groups: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
        for (name, value) in metrics {
            let (group, metric) = name.split_once('/').unwrap_or(("", name.as_str()));
            groups.entry(group).or_default().push((metric, *value));
        }

        groups
            .into_iter()
            .map(|(group, mut entries)| {
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let body = entries
                    .iter()
                    .map(|(metric, value)| format!("{}={:.4}", metric, value))
                    .collect::<Vec<_>>()
                    .join(", ");
                if group.is_empty() {
                    body
                } else {
                    format!("[{}] {}", group, body)
                }
            })
            .collect()
    }
}

impl MetricLogger for ConsoleLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        tracing::info!("Update {}: {} = {:.4}", step, name, value);
    }

    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        for line in Self::format_groups(metrics) {
            tracing::info!("Update {}: {}", step, line);
        }
    }
}
