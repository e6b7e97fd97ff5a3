//! Metrics sink boundary.
//!
//! The engine reports its own activity (denials, level transitions) but
//! must never let observability failures affect admission decisions, so
//! the sink is fire-and-forget: implementations swallow their own errors.
//! The default sink emits `tracing` events; a deployment that wants real
//! metrics plugs in its own implementation.

use tracing::debug;

/// Fire-and-forget metrics recorder.
pub trait MetricsSink: Send + Sync {
    /// Record a metric sample. Implementations must not fail or block.
    fn record(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// Default sink: emits each sample as a `tracing` debug event.
#[derive(Debug, Default)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn record(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        debug!(metric = name, value, ?tags, "metric");
    }
}

/// Sink that drops every sample. For tests and minimal deployments.
#[derive(Debug, Default)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn record(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
}
