//! Metrics for the bridge.
//!
//! Recorded through the `metrics` facade; the binary embedding this crate
//! decides which exporter (if any) receives them.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metrics collector, labelled by bridge name and queue
#[derive(Debug, Clone)]
pub struct BridgeMetrics {
    bridge_name: String,
    queue: String,
}

impl BridgeMetrics {
    pub fn new(bridge_name: impl Into<String>, queue: impl Into<String>) -> Self {
        Self::register_metrics();

        Self {
            bridge_name: bridge_name.into(),
            queue: queue.into(),
        }
    }

    fn register_metrics() {
        describe_counter!(
            "sensor_bridge_messages_received_total",
            "Total number of deliveries received from the broker"
        );
        describe_counter!(
            "sensor_bridge_messages_invalid_total",
            "Total number of deliveries dropped by payload validation"
        );
        describe_counter!(
            "sensor_bridge_forwards_total",
            "Total number of forwarded readings by final outcome"
        );
        describe_counter!(
            "sensor_bridge_forward_retries_total",
            "Total number of forward retries"
        );
        describe_counter!(
            "sensor_bridge_processing_panics_total",
            "Total number of deliveries whose processing panicked"
        );

        describe_histogram!(
            "sensor_bridge_processing_duration_seconds",
            "Time spent processing each delivery"
        );

        describe_gauge!(
            "sensor_bridge_inflight_messages",
            "Current number of deliveries being processed"
        );
        describe_gauge!(
            "sensor_bridge_health",
            "Bridge health status (1 = consuming, 0 = stopped)"
        );
    }

    pub fn record_received(&self) {
        counter!(
            "sensor_bridge_messages_received_total",
            "bridge" => self.bridge_name.clone(),
            "queue" => self.queue.clone(),
        )
        .increment(1);
    }

    /// Record a delivery dropped at the parse or validate stage
    pub fn record_invalid(&self, stage: &'static str) {
        counter!(
            "sensor_bridge_messages_invalid_total",
            "bridge" => self.bridge_name.clone(),
            "queue" => self.queue.clone(),
            "stage" => stage,
        )
        .increment(1);
    }

    /// Record the final outcome of one forwarded reading
    pub fn record_outcome(&self, outcome: &'static str) {
        counter!(
            "sensor_bridge_forwards_total",
            "bridge" => self.bridge_name.clone(),
            "queue" => self.queue.clone(),
            "outcome" => outcome,
        )
        .increment(1);
    }

    pub fn record_retry(&self) {
        counter!(
            "sensor_bridge_forward_retries_total",
            "bridge" => self.bridge_name.clone(),
            "queue" => self.queue.clone(),
        )
        .increment(1);
    }

    pub fn record_panic(&self) {
        counter!(
            "sensor_bridge_processing_panics_total",
            "bridge" => self.bridge_name.clone(),
            "queue" => self.queue.clone(),
        )
        .increment(1);
    }

    pub fn record_processing_time(&self, duration: Duration) {
        histogram!(
            "sensor_bridge_processing_duration_seconds",
            "bridge" => self.bridge_name.clone(),
            "queue" => self.queue.clone(),
        )
        .record(duration.as_secs_f64());
    }

    pub fn increment_inflight(&self) {
        gauge!(
            "sensor_bridge_inflight_messages",
            "bridge" => self.bridge_name.clone(),
            "queue" => self.queue.clone(),
        )
        .increment(1.0);
    }

    pub fn decrement_inflight(&self) {
        gauge!(
            "sensor_bridge_inflight_messages",
            "bridge" => self.bridge_name.clone(),
            "queue" => self.queue.clone(),
        )
        .decrement(1.0);
    }

    pub fn set_health(&self, healthy: bool) {
        gauge!(
            "sensor_bridge_health",
            "bridge" => self.bridge_name.clone(),
            "queue" => self.queue.clone(),
        )
        .set(if healthy { 1.0 } else { 0.0 });
    }
}

/// Tracks one delivery from receipt to settlement
///
/// Keeps the in-flight gauge balanced even when processing unwinds.
pub(crate) struct ProcessingTimer {
    start: std::time::Instant,
    metrics: BridgeMetrics,
}

impl ProcessingTimer {
    pub(crate) fn start(metrics: BridgeMetrics) -> Self {
        metrics.increment_inflight();
        Self {
            start: std::time::Instant::now(),
            metrics,
        }
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        self.metrics.record_processing_time(self.start.elapsed());
        self.metrics.decrement_inflight();
    }
}
