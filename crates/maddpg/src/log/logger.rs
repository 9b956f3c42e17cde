//! Metric logger traits and composites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Trait for logging training metrics to various backends.
pub trait MetricLogger: Send + Sync {
    /// Log a scalar value (e.g. a loss).
    fn log_scalar(&self, name: &str, value: f64, step: u64);

    /// Log a set of metrics collected in a map.
    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64);

    /// Close the logger and flush any pending writes.
    fn close(&self) {}
}

impl<L: MetricLogger + ?Sized> MetricLogger for Arc<L> {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        (**self).log_scalar(name, value, step);
    }

    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        (**self).log_metrics(metrics, step);
    }

    fn close(&self) {
        (**self).close();
    }
}

/// A logger that does nothing (default).
pub struct NoOpLogger;

impl MetricLogger for NoOpLogger {
    fn log_scalar(&self, _name: &str, _value: f64, _step: u64) {}
    fn log_metrics(&self, _metrics: &HashMap<String, f64>, _step: u64) {}
}

/// A composite logger that dispatches to multiple backends.
pub struct CompositeLogger {
    loggers: Vec<Box<dyn MetricLogger>>,
}

impl CompositeLogger {
    pub fn new(loggers: Vec<Box<dyn MetricLogger>>) -> Self {
        Self { loggers }
    }

    pub fn add(&mut self, logger: Box<dyn MetricLogger>) {
        self.loggers.push(logger);
    }
}

impl MetricLogger for CompositeLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        for logger in &self.loggers {
            logger.log_scalar(name, value, step);
        }
    }

    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        for logger in &self.loggers {
            logger.log_metrics(metrics, step);
        }
    }

    fn close(&self) {
        for logger in &self.loggers {
            logger.close();
        }
    }
}

/// Keeps every logged value in memory, in arrival order per name.
#[derive(Default)]
pub struct HistoryLogger {
    history: Mutex<HashMap<String, Vec<(u64, f64)>>>,
}

impl HistoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values logged under `name`
    pub fn series(&self, name: &str) -> Vec<(u64, f64)> {
        self.history
            .lock()
            .map(|h| h.get(name).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Most recent value logged under `name`
    pub fn last(&self, name: &str) -> Option<f64> {
        self.series(name).last().map(|&(_, v)| v)
    }
}

impl MetricLogger for HistoryLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        if let Ok(mut history) = self.history.lock() {
            history
                .entry(name.to_string())
                .or_default()
                .push((step, value));
        }
    }

    fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
        for (name, value) in metrics {
            self.log_scalar(name, *value, step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_logger() {
        let logger = HistoryLogger::new();
        logger.log_scalar("agent_0/critic_loss", 1.5, 1);
        logger.log_scalar("agent_0/critic_loss", 0.5, 2);
        assert_eq!(logger.series("agent_0/critic_loss"), vec![(1, 1.5), (2, 0.5)]);
        assert_eq!(logger.last("agent_0/critic_loss"), Some(0.5));
        assert_eq!(logger.last("missing"), None);
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(HistoryLogger::new());
        let b = Arc::new(HistoryLogger::new());
        let mut composite = CompositeLogger::new(vec![Box::new(a.clone())]);
        composite.add(Box::new(b.clone()));
        composite.add(Box::new(NoOpLogger));

        let mut metrics = HashMap::new();
        metrics.insert("actor_loss".to_string(), -0.25);
        composite.log_metrics(&metrics, 7);

        assert_eq!(a.last("actor_loss"), Some(-0.25));
        assert_eq!(b.series("actor_loss"), vec![(7, -0.25)]);
    }
}
