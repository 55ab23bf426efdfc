//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! Engine code only emits [`MetricsEvent`]s through `sink::record`; the
//! counters behind them are never touched directly.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventPerf, EventReport, EventState, TableCounters, TableSummary};
pub use sink::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink};
