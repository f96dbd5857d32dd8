//! Batch handler metrics.
//!
//! Registered on a caller-supplied [`Registry`] so tests and multiple
//! services in one process never collide on the global registry.

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use std::time::Duration;

/// Outcome label values
const RESULT_OK: &str = "ok";
const RESULT_FAILED: &str = "failed";

/// Message kind label values
const KIND_FORWARDED: &str = "forwarded";
const KIND_FILTERED: &str = "filtered";

/// Metrics recorded per inbound batch.
#[derive(Clone)]
pub struct BatchMetrics {
    duration: HistogramVec,
    messages: IntCounterVec,
    failures: IntCounter,
}

impl BatchMetrics {
    /// Create the metrics and register them on `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "quoting_batch_duration_seconds",
                "Time to process one inbound batch",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["result"],
        )?;
        let messages = IntCounterVec::new(
            Opts::new("quoting_batch_messages_total", "Inbound messages by handling kind"),
            &["kind"],
        )?;
        let failures = IntCounter::new(
            "quoting_batch_failures_total",
            "Batches aborted by an infrastructure failure",
        )?;

        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(messages.clone()))?;
        registry.register(Box::new(failures.clone()))?;

        Ok(Self { duration, messages, failures })
    }

    pub fn observe_batch(&self, elapsed: Duration, ok: bool) {
        self.duration_for(ok).observe(elapsed.as_secs_f64());
    }

    /// Count forwarded and filtered messages of one batch
    pub fn record_messages(&self, forwarded: usize, filtered: usize) {
        self.messages.with_label_values(&[KIND_FORWARDED]).inc_by(forwarded as u64);
        self.messages.with_label_values(&[KIND_FILTERED]).inc_by(filtered as u64);
    }

    pub fn record_failure(&self) {
        self.failures.inc();
    }

    pub fn forwarded_total(&self) -> u64 {
        self.messages.with_label_values(&[KIND_FORWARDED]).get()
    }

    pub fn filtered_total(&self) -> u64 {
        self.messages.with_label_values(&[KIND_FILTERED]).get()
    }

    pub fn failures_total(&self) -> u64 {
        self.failures.get()
    }

    /// Number of batches observed with the given outcome
    pub fn batches_observed(&self, ok: bool) -> u64 {
        self.duration_for(ok).get_sample_count()
    }

    fn duration_for(&self, ok: bool) -> Histogram {
        let result = if ok { RESULT_OK } else { RESULT_FAILED };
        self.duration.with_label_values(&[result])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_count() {
        let registry = Registry::new();
        let metrics = BatchMetrics::new(&registry).unwrap();

        metrics.record_messages(2, 1);
        metrics.record_messages(3, 0);
        metrics.observe_batch(Duration::from_millis(5), true);
        metrics.observe_batch(Duration::from_millis(7), false);
        metrics.record_failure();

        assert_eq!(metrics.forwarded_total(), 5);
        assert_eq!(metrics.filtered_total(), 1);
        assert_eq!(metrics.failures_total(), 1);
        assert_eq!(metrics.batches_observed(true), 1);
        assert_eq!(metrics.batches_observed(false), 1);

        let names: Vec<String> =
            registry.gather().iter().map(|family| family.get_name().to_string()).collect();
        assert!(names.contains(&"quoting_batch_duration_seconds".to_string()));
        assert!(names.contains(&"quoting_batch_failures_total".to_string()));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        BatchMetrics::new(&registry).unwrap();

        assert!(BatchMetrics::new(&registry).is_err());
    }
}
