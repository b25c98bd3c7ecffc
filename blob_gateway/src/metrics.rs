//! Metrics for blob gateway operations.

use std::time::Instant;

use opentelemetry::{
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Metrics for blob gateway operations.
#[derive(Clone)]
pub struct BlobMetrics {
    /// Histogram for operation latencies.
    pub operations: Histogram<f64>,

    /// Counter for operation errors.
    pub errors: Counter<u64>,

    /// Objects that fell back to the canonical locator because signing failed.
    pub signing_fallbacks: Counter<u64>,
}

impl BlobMetrics {
    /// Create new metrics from a meter.
    pub fn new(meter: &Meter) -> Self {
        let operations = meter
            .f64_histogram("blob_gateway_operation_duration_seconds")
            .with_unit("s")
            .with_description("Duration of blob gateway operations in seconds")
            .build();

        let errors = meter
            .u64_counter("blob_gateway_errors_total")
            .with_description("Total number of blob gateway errors")
            .build();

        let signing_fallbacks = meter
            .u64_counter("blob_gateway_signing_fallbacks_total")
            .with_description("Listed blobs served with an unsigned locator after a signing failure")
            .build();

        Self {
            operations,
            errors,
            signing_fallbacks,
        }
    }

    pub fn from_global() -> Self {
        Self::new(&opentelemetry::global::meter("blob-gateway"))
    }

    pub fn record_error(&self, op: &'static str) {
        self.errors.add(1, &[KeyValue::new("op", op)]);
    }
}

/// Timer for measuring operation duration.
pub struct Timer {
    start: Instant,
    histogram: Histogram<f64>,
    labels: Vec<KeyValue>,
}

impl Timer {
    /// Start a new timer with labels.
    pub fn start_with_labels(histogram: &Histogram<f64>, labels: &[KeyValue]) -> Self {
        Self {
            start: Instant::now(),
            histogram: histogram.clone(),
            labels: labels.to_vec(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.record(duration, &self.labels);
    }
}
