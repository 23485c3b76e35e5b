//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count evaluated requests and drops per origin (asn, country, tsp)
//! - Count fail-open events per pipeline stage and upstream failures
//! - Render the Prometheus text format for the metrics endpoint
//!
//! # Metrics
//! - `origin_gate_requests_total` (counter): requests by asn, country, tsp
//! - `origin_gate_drops_total` (counter): rejected requests by asn, country, tsp
//! - `origin_gate_fail_open_total` (counter): fail-open events by stage
//! - `origin_gate_upstream_errors_total` (counter): forwarding failures
//!
//! # Design Decisions
//! - The recorder is owned by the gateway and injected, not installed globally
//! - Updates are atomic increments; recording never blocks a request

use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::origin::OriginMetadata;

pub const REQUESTS_TOTAL: &str = "origin_gate_requests_total";
pub const DROPS_TOTAL: &str = "origin_gate_drops_total";
pub const FAIL_OPEN_TOTAL: &str = "origin_gate_fail_open_total";
pub const UPSTREAM_ERRORS_TOTAL: &str = "origin_gate_upstream_errors_total";

/// Thread-safe counting collaborator used by the request pipeline.
pub trait TrafficMetrics: Send + Sync {
    fn record_request(&self, origin: &OriginMetadata);
    fn record_drop(&self, origin: &OriginMetadata);
    fn record_fail_open(&self, stage: &'static str);
    fn record_upstream_error(&self);
    /// Current values in the Prometheus text exposition format.
    fn render(&self) -> String;
}

/// Prometheus-backed metrics.
pub struct PrometheusMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        recorder.describe_counter(
            KeyName::from_const_str(REQUESTS_TOTAL),
            None,
            SharedString::const_str("Evaluated requests by ASN, country, and TSP"),
        );
        recorder.describe_counter(
            KeyName::from_const_str(DROPS_TOTAL),
            None,
            SharedString::const_str("Dropped requests by ASN, country, and TSP"),
        );
        recorder.describe_counter(
            KeyName::from_const_str(FAIL_OPEN_TOTAL),
            None,
            SharedString::const_str("Requests admitted because a lookup stage failed"),
        );
        recorder.describe_counter(
            KeyName::from_const_str(UPSTREAM_ERRORS_TOTAL),
            None,
            SharedString::const_str("Requests that could not be forwarded upstream"),
        );

        Self { recorder, handle }
    }

    fn increment(&self, name: &'static str, labels: Vec<Label>) {
        let key = Key::from_parts(name, labels);
        self.recorder.register_counter(&key, &metadata()).increment(1);
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

fn origin_labels(origin: &OriginMetadata) -> Vec<Label> {
    vec![
        Label::new("asn", origin.asn.clone()),
        Label::new("country", origin.country.clone()),
        Label::new("tsp", origin.tsp.clone()),
    ]
}

impl TrafficMetrics for PrometheusMetrics {
    fn record_request(&self, origin: &OriginMetadata) {
        self.increment(REQUESTS_TOTAL, origin_labels(origin));
    }

    fn record_drop(&self, origin: &OriginMetadata) {
        self.increment(DROPS_TOTAL, origin_labels(origin));
    }

    fn record_fail_open(&self, stage: &'static str) {
        self.increment(FAIL_OPEN_TOTAL, vec![Label::new("stage", stage)]);
    }

    fn record_upstream_error(&self) {
        self.increment(UPSTREAM_ERRORS_TOTAL, Vec::new());
    }

    fn render(&self) -> String {
        self.handle.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_labelled_by_origin() {
        let metrics = PrometheusMetrics::new();
        let origin = OriginMetadata::normalized("AS44244", "IR", "irancell", "");

        metrics.record_request(&origin);
        metrics.record_request(&origin);
        metrics.record_drop(&origin);

        let text = metrics.render();
        assert!(text.contains(
            r#"origin_gate_requests_total{asn="AS44244",country="IR",tsp="irancell"} 2"#
        ));
        assert!(text.contains(
            r#"origin_gate_drops_total{asn="AS44244",country="IR",tsp="irancell"} 1"#
        ));
    }

    #[test]
    fn test_fail_open_by_stage() {
        let metrics = PrometheusMetrics::new();
        metrics.record_fail_open("origin");
        metrics.record_upstream_error();

        let text = metrics.render();
        assert!(text.contains(r#"origin_gate_fail_open_total{stage="origin"} 1"#));
        assert!(text.contains("origin_gate_upstream_errors_total 1"));
    }

    #[test]
    fn test_recorders_are_independent() {
        let a = PrometheusMetrics::new();
        let b = PrometheusMetrics::new();
        a.record_upstream_error();
        assert!(!b.render().contains("origin_gate_upstream_errors_total 1"));
    }
}
