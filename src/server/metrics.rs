//! Prometheus counters for the request and monitoring paths.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub requests: IntCounterVec,
    pub observations_scored: IntCounter,
    pub groups_enqueued: IntCounter,
    pub groups_dropped: IntCounter,
    pub queue_free_slots: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("clf_http_requests_total", "HTTP requests by endpoint and status"),
            &["endpoint", "status"],
        )?;
        let observations_scored = IntCounter::new(
            "clf_observations_scored_total",
            "Observations scored by the model",
        )?;
        let groups_enqueued = IntCounter::new(
            "clf_monitoring_groups_enqueued_total",
            "Record groups handed to the monitoring queue",
        )?;
        let groups_dropped = IntCounter::new(
            "clf_monitoring_groups_dropped_total",
            "Record groups that could not be enqueued",
        )?;

        let queue_free_slots = IntGauge::new(
            "clf_monitoring_queue_free_slots",
            "Free slots in the monitoring queue after the last dispatch",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(observations_scored.clone()))?;
        registry.register(Box::new(groups_enqueued.clone()))?;
        registry.register(Box::new(groups_dropped.clone()))?;
        registry.register(Box::new(queue_free_slots.clone()))?;

        Ok(Self {
            registry,
            requests,
            observations_scored,
            groups_enqueued,
            groups_dropped,
            queue_free_slots,
        })
    }

    pub fn record_request(&self, endpoint: &str, status: u16) {
        let status = status.to_string();
        self.requests
            .with_label_values(&[endpoint, status.as_str()])
            .inc();
    }

    /// Render all metrics in the text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
