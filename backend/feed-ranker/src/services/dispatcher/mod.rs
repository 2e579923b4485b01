/// Request Dispatcher
///
/// Entry point for one ranking request:
/// `Received -> FeaturesBuilt -> Scoring -> Ranked -> Responded`, or `Failed`.
///
/// Requests are validated, admitted through [`AdmissionControl`], then scored on
/// the blocking pool against a snapshot of both artifacts. The dispatcher
/// future owns the concurrency slot, so a fired timeout frees it even while the
/// abandoned model call runs to completion in the background.
pub mod admission;

pub use admission::{AdmissionControl, AdmissionPermit, AdmissionPolicy};

use crate::error::{RankerError, Result};
use crate::metrics::{MetricsEmitter, MetricsEvent, RequestOutcome};
use crate::models::{RankedResult, RequestPhase, ScoringRequest};
use crate::services::ranking::{EnsembleScorer, ModelRegistry, RankingEngine};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub max_in_flight: usize,
    pub admission: AdmissionPolicy,
    pub request_timeout: Duration,
    pub max_candidates: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            admission: AdmissionPolicy::Reject,
            request_timeout: Duration::from_millis(50),
            max_candidates: 1000,
        }
    }
}

pub struct RequestDispatcher {
    registry: Arc<ModelRegistry>,
    scorer: EnsembleScorer,
    admission: AdmissionControl,
    request_timeout: Duration,
    max_candidates: usize,
    metrics: MetricsEmitter,
}

impl RequestDispatcher {
    pub fn new(
        registry: Arc<ModelRegistry>,
        scorer: EnsembleScorer,
        settings: DispatcherSettings,
        metrics: MetricsEmitter,
    ) -> Self {
        info!(
            max_in_flight = settings.max_in_flight,
            admission = ?settings.admission,
            timeout_ms = settings.request_timeout.as_millis() as u64,
            "Request dispatcher initialized"
        );

        Self {
            registry,
            scorer,
            admission: AdmissionControl::new(settings.max_in_flight, settings.admission),
            request_timeout: settings.request_timeout,
            max_candidates: settings.max_candidates,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn in_flight(&self) -> usize {
        self.admission.in_flight()
    }

    pub fn queued(&self) -> usize {
        self.admission.queued()
    }

    pub fn capacity(&self) -> usize {
        self.admission.capacity()
    }

    pub fn metrics(&self) -> &MetricsEmitter {
        &self.metrics
    }

    /// Rank one request end to end and emit exactly one metrics event for it.
    pub async fn dispatch(&self, request: ScoringRequest) -> Result<RankedResult> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let user_id = request.user_id.clone();
        let candidate_count = request.candidates.len();

        debug!(
            %request_id,
            user_id = %user_id,
            candidates = candidate_count,
            phase = %RequestPhase::Received,
            "Ranking request received"
        );

        let result = self.execute(request_id, request).await;
        let latency = started.elapsed();

        let (outcome, invalid_scores) = match &result {
            Ok(ranked) => {
                debug!(
                    %request_id,
                    phase = %RequestPhase::Responded,
                    latency_ms = latency.as_secs_f64() * 1000.0,
                    invalid_scores = ranked.invalid_scores,
                    "Ranking request completed"
                );
                (RequestOutcome::Success, ranked.invalid_scores)
            }
            Err(e) => {
                warn!(
                    %request_id,
                    user_id = %user_id,
                    phase = %RequestPhase::Failed,
                    error = %e,
                    "Ranking request failed"
                );
                (Self::outcome_for(e), 0)
            }
        };

        self.metrics.emit(MetricsEvent {
            request_id,
            user_id,
            latency,
            candidate_count,
            invalid_scores,
            outcome,
            finished_at: Utc::now(),
        });

        result
    }

    /// Emit the metrics event for a request the HTTP layer refused before dispatch.
    pub fn record_rejected(
        &self,
        user_id: impl Into<String>,
        candidate_count: usize,
        error: &RankerError,
        latency: Duration,
    ) {
        let request_id = Uuid::new_v4();
        let user_id = user_id.into();
        warn!(
            %request_id,
            user_id = %user_id,
            phase = %RequestPhase::Failed,
            error = %error,
            "Ranking request rejected before dispatch"
        );

        self.metrics.emit(MetricsEvent {
            request_id,
            user_id,
            latency,
            candidate_count,
            invalid_scores: 0,
            outcome: Self::outcome_for(error),
            finished_at: Utc::now(),
        });
    }

    async fn execute(&self, request_id: Uuid, request: ScoringRequest) -> Result<RankedResult> {
        self.validate(&request)?;

        let _permit = self.admission.acquire().await?;
        let timeout = request.timeout.unwrap_or(self.request_timeout);

        let models = self.registry.snapshot()?;
        let schema = self.registry.schema().clone();
        let scorer = self.scorer;

        let scoring = tokio::task::spawn_blocking(move || {
            let features = EnsembleScorer::build_features(&schema, &request);
            debug!(%request_id, phase = %RequestPhase::FeaturesBuilt, width = features.width());

            debug!(
                %request_id,
                phase = %RequestPhase::Scoring,
                lambdamart = %models.lambdamart.version(),
                ctr = %models.ctr.version()
            );
            let scored = scorer.score_batch(&models, &request, &features);

            let ranked = RankingEngine::rank(scored.candidates, request.limit);
            debug!(%request_id, phase = %RequestPhase::Ranked, returned = ranked.len());
            ranked
        });

        match tokio::time::timeout(timeout, scoring).await {
            Ok(joined) => Ok(joined?),
            Err(_) => Err(RankerError::Timeout(timeout)),
        }
    }

    fn validate(&self, request: &ScoringRequest) -> Result<()> {
        if request.user_id.trim().is_empty() {
            return Err(malformed("user_id is required"));
        }
        if request.candidates.is_empty() {
            return Err(malformed("candidate list is empty"));
        }
        if request.candidates.len() > self.max_candidates {
            return Err(malformed(format!(
                "{} candidates exceeds the limit of {}",
                request.candidates.len(),
                self.max_candidates
            )));
        }
        if request.limit == Some(0) {
            return Err(malformed("limit must be positive"));
        }
        if request.timeout == Some(Duration::ZERO) {
            return Err(malformed("timeout must be positive"));
        }

        let mut seen = HashSet::with_capacity(request.candidates.len());
        for candidate in &request.candidates {
            if candidate.item_id.trim().is_empty() {
                return Err(malformed("item_id must not be blank"));
            }
            if !seen.insert(candidate.item_id.as_str()) {
                return Err(malformed(format!(
                    "duplicate item_id '{}'",
                    candidate.item_id
                )));
            }
        }

        Ok(())
    }

    fn outcome_for(error: &RankerError) -> RequestOutcome {
        match error {
            RankerError::MalformedRequest(_) => RequestOutcome::Malformed,
            RankerError::ResourceExhausted { .. } => RequestOutcome::ResourceExhausted,
            RankerError::Timeout(_) => RequestOutcome::Timeout,
            _ => RequestOutcome::Failed,
        }
    }
}

fn malformed(message: impl Into<String>) -> RankerError {
    RankerError::MalformedRequest(message.into())
}
