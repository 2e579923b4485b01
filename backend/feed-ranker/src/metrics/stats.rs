//! In-memory request statistics backing the status and summary endpoints

use super::{MetricsEvent, MetricsSink, RequestOutcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Latency samples kept for `/metrics/latency`
pub const RECENT_SAMPLES: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct LatencySample {
    pub user_id: String,
    pub latency_ms: f64,
    pub candidate_count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub invalid_scores: u64,
    pub last_request_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Totals {
    total: u64,
    successful: u64,
    invalid_scores: u64,
    latency_sum_ms: f64,
    min_latency_ms: Option<f64>,
    max_latency_ms: f64,
    last_request_at: Option<DateTime<Utc>>,
    recent: VecDeque<LatencySample>,
}

#[derive(Default)]
pub struct RequestStats {
    inner: Mutex<Totals>,
}

impl RequestStats {
    pub fn summary(&self) -> StatsSummary {
        let totals = self.inner.lock();
        let avg = if totals.total == 0 {
            0.0
        } else {
            totals.latency_sum_ms / totals.total as f64
        };

        StatsSummary {
            total_requests: totals.total,
            successful_requests: totals.successful,
            failed_requests: totals.total - totals.successful,
            avg_latency_ms: round2(avg),
            min_latency_ms: round2(totals.min_latency_ms.unwrap_or(0.0)),
            max_latency_ms: round2(totals.max_latency_ms),
            invalid_scores: totals.invalid_scores,
            last_request_at: totals.last_request_at,
        }
    }

    /// Most recent successful requests, newest first
    pub fn recent(&self, limit: usize) -> Vec<LatencySample> {
        self.inner
            .lock()
            .recent
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

impl MetricsSink for RequestStats {
    fn record(&self, event: &MetricsEvent) {
        let latency_ms = event.latency.as_secs_f64() * 1000.0;
        let mut totals = self.inner.lock();

        totals.total += 1;
        totals.latency_sum_ms += latency_ms;
        totals.invalid_scores += event.invalid_scores as u64;
        totals.min_latency_ms = Some(match totals.min_latency_ms {
            Some(min) => min.min(latency_ms),
            None => latency_ms,
        });
        totals.max_latency_ms = totals.max_latency_ms.max(latency_ms);
        totals.last_request_at = Some(event.finished_at);

        if event.outcome == RequestOutcome::Success {
            totals.successful += 1;

            if totals.recent.len() == RECENT_SAMPLES {
                totals.recent.pop_front();
            }
            totals.recent.push_back(LatencySample {
                user_id: event.user_id.clone(),
                latency_ms,
                candidate_count: event.candidate_count,
                timestamp: event.finished_at,
            });
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
