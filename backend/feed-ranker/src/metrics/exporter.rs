//! Prometheus metrics for the ranking request path

use super::{MetricsEvent, MetricsSink};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};

static RANK_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_ranker_requests_total",
        "Ranking requests by outcome",
        &["outcome"]
    )
    .expect("Failed to register ranking requests metric")
});

static RANK_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_ranker_request_duration_seconds",
        "End-to-end ranking latency",
        &["outcome"],
        vec![0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register ranking latency metric")
});

static CANDIDATES_PER_REQUEST: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "feed_ranker_candidates_per_request",
        "Number of candidates in each ranking request",
        vec![1.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0]
    )
    .expect("Failed to register candidates metric")
});

static INVALID_SCORES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_ranker_invalid_scores_total",
        "Candidates demoted because their ensemble score was not finite"
    )
    .expect("Failed to register invalid scores metric")
});

static EVENTS_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_ranker_metrics_events_dropped_total",
        "Metrics events dropped because the emitter channel was full"
    )
    .expect("Failed to register dropped events metric")
});

static REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "feed_ranker_requests_in_flight",
        "Ranking requests currently holding a concurrency slot"
    )
    .expect("Failed to register in-flight metric")
});

static MODEL_RELOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_ranker_model_reloads_total",
        "Model artifact reloads (success/error)",
        &["model", "status"]
    )
    .expect("Failed to register model reloads metric")
});

/// Record an event dropped by the emitter
pub fn record_event_dropped() {
    EVENTS_DROPPED_TOTAL.inc();
}

/// Set number of requests holding a slot
pub fn set_in_flight(count: usize) {
    REQUESTS_IN_FLIGHT.set(count as i64);
}

/// Record model reload result (success/error)
pub fn record_model_reload(model: &str, status: &str) {
    MODEL_RELOADS_TOTAL.with_label_values(&[model, status]).inc();
}

/// Render the default registry in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Sink publishing request events to the default Prometheus registry
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSink;

impl MetricsSink for PrometheusSink {
    fn record(&self, event: &MetricsEvent) {
        let outcome = event.outcome.as_str();
        RANK_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
        RANK_LATENCY_SECONDS
            .with_label_values(&[outcome])
            .observe(event.latency.as_secs_f64());
        CANDIDATES_PER_REQUEST.observe(event.candidate_count as f64);
        INVALID_SCORES_TOTAL.inc_by(event.invalid_scores as u64);
    }
}
