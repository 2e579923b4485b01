//! Request Metrics
//!
//! One [`MetricsEvent`] per finished request, handed to a bounded channel so the
//! response path never waits on metrics. A background task fans events out to
//! the registered sinks.

pub mod exporter;
pub mod stats;

pub use self::exporter::{encode_metrics, PrometheusSink};
pub use self::stats::{LatencySample, RequestStats, StatsSummary};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Success,
    Malformed,
    ResourceExhausted,
    Timeout,
    Failed,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::Malformed => "malformed",
            RequestOutcome::ResourceExhausted => "resource_exhausted",
            RequestOutcome::Timeout => "timeout",
            RequestOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsEvent {
    pub request_id: Uuid,
    pub user_id: String,
    pub latency: Duration,
    pub candidate_count: usize,
    /// Candidates demoted by the invalid-score fallback
    pub invalid_scores: usize,
    pub outcome: RequestOutcome,
    pub finished_at: DateTime<Utc>,
}

/// Consumer of finished-request events; called from the drain task only.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &MetricsEvent);
}

/// Non-blocking producer handle. Cheap to clone.
#[derive(Clone)]
pub struct MetricsEmitter {
    tx: mpsc::Sender<MetricsEvent>,
    dropped: Arc<AtomicU64>,
}

impl MetricsEmitter {
    /// Emitter plus the receiving end, for callers that drive the drain loop themselves.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MetricsEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Spawn the drain task on the current runtime.
    pub fn spawn(capacity: usize, sinks: Vec<Arc<dyn MetricsSink>>) -> (Self, JoinHandle<()>) {
        let (emitter, rx) = Self::channel(capacity);
        let handle = tokio::spawn(drain(rx, sinks));
        (emitter, handle)
    }

    /// Never blocks. Events are dropped and counted when the channel is full or closed.
    pub fn emit(&self, event: MetricsEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) | Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                exporter::record_event_dropped();
                debug!(request_id = %event.request_id, "Metrics channel unavailable, dropping event");
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Deliver every event to every sink until all emitters are gone.
pub async fn drain(mut rx: mpsc::Receiver<MetricsEvent>, sinks: Vec<Arc<dyn MetricsSink>>) {
    while let Some(event) = rx.recv().await {
        for sink in &sinks {
            sink.record(&event);
        }
    }
    info!("Metrics channel closed, drain task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(outcome: RequestOutcome) -> MetricsEvent {
        MetricsEvent {
            request_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            latency: Duration::from_millis(4),
            candidate_count: 3,
            invalid_scores: 0,
            outcome,
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_every_sink() {
        let mut first = MockMetricsSink::new();
        first
            .expect_record()
            .withf(|event| event.outcome == RequestOutcome::Success)
            .times(2)
            .return_const(());
        let mut second = MockMetricsSink::new();
        second.expect_record().times(2).return_const(());

        let (emitter, rx) = MetricsEmitter::channel(8);
        emitter.emit(event(RequestOutcome::Success));
        emitter.emit(event(RequestOutcome::Success));
        drop(emitter);

        let sinks: Vec<Arc<dyn MetricsSink>> = vec![Arc::new(first), Arc::new(second)];
        drain(rx, sinks).await;
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (emitter, rx) = MetricsEmitter::channel(1);

        emitter.emit(event(RequestOutcome::Success));
        emitter.emit(event(RequestOutcome::Timeout));
        emitter.emit(event(RequestOutcome::Failed));

        assert_eq!(emitter.dropped(), 2);
        drop(rx);
    }

    #[tokio::test]
    async fn test_closed_channel_counts_drops() {
        let (emitter, rx) = MetricsEmitter::channel(4);
        drop(rx);

        emitter.emit(event(RequestOutcome::Success));
        assert_eq!(emitter.dropped(), 1);
    }

    #[tokio::test]
    async fn test_spawned_drain_feeds_stats() {
        let stats = Arc::new(RequestStats::default());
        let sinks: Vec<Arc<dyn MetricsSink>> = vec![stats.clone()];
        let (emitter, handle) = MetricsEmitter::spawn(16, sinks);

        emitter.emit(event(RequestOutcome::Success));
        emitter.emit(event(RequestOutcome::Timeout));
        drop(emitter);
        handle.await.unwrap();

        let summary = stats.summary();
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.successful_requests, 1);
    }
}
