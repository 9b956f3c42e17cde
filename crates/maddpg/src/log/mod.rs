//! Metric logging.
//!
//! Provides:
//! - `MetricLogger` trait for composable backends
//! - `ConsoleLogger` for lightweight tracing output
//! - `HistoryLogger` for in-memory series
//! - `CompositeLogger` for multi-backend logging

mod console;
mod logger;

pub use console::ConsoleLogger;
pub use logger::{CompositeLogger, HistoryLogger, MetricLogger, NoOpLogger};
