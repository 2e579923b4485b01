use super::AppState;
use crate::error::{RankerError, Result};
use crate::models::{CandidateItem, FeatureMap, RankedItem, ScoringRequest};
use actix_web::{post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Request body for POST /rank
#[derive(Debug, Deserialize)]
pub struct RankRequest {
    pub user_id: String,

    /// Candidate item ids in the caller's order
    pub item_ids: Vec<String>,

    #[serde(default)]
    pub user_features: FeatureMap,

    /// Shared by every candidate (impressions, avg_hour, ...)
    #[serde(default)]
    pub context_features: FeatureMap,

    /// Per-item overrides keyed by item id
    #[serde(default)]
    pub candidate_features: HashMap<String, FeatureMap>,

    /// Return only the top N after ranking
    pub limit: Option<usize>,

    /// Overrides the service default timeout
    pub timeout_ms: Option<u64>,
}

impl RankRequest {
    pub fn into_scoring_request(mut self) -> Result<ScoringRequest> {
        if let Some(unknown) = self
            .candidate_features
            .keys()
            .find(|id| !self.item_ids.contains(id))
        {
            return Err(RankerError::MalformedRequest(format!(
                "candidate_features references unknown item '{}'",
                unknown
            )));
        }

        let candidates = self
            .item_ids
            .into_iter()
            .map(|item_id| {
                let features = self.candidate_features.remove(&item_id).unwrap_or_default();
                CandidateItem::new(item_id).with_features(features)
            })
            .collect();

        let mut request = ScoringRequest::new(self.user_id, candidates)
            .with_user_features(self.user_features)
            .with_context(self.context_features);
        request.limit = self.limit;
        request.timeout = self.timeout_ms.map(Duration::from_millis);

        Ok(request)
    }
}

#[derive(Debug, Serialize)]
pub struct RankResponse {
    pub ranked_items: Vec<RankedItem>,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// POST /rank
/// Rank candidate items for a user with the LambdaMART + CTR ensemble
///
/// Bodies rejected here still produce a metrics event, like dispatcher failures.
#[post("/rank")]
pub async fn rank_items(
    state: web::Data<AppState>,
    body: std::result::Result<web::Json<RankRequest>, actix_web::Error>,
) -> actix_web::Result<HttpResponse> {
    let started = Instant::now();

    let body = match body {
        Ok(body) => body.into_inner(),
        Err(err) => {
            let error = RankerError::MalformedRequest(err.to_string());
            state
                .dispatcher
                .record_rejected("", 0, &error, started.elapsed());
            return Err(err);
        }
    };

    let user_id = body.user_id.clone();
    let candidate_count = body.item_ids.len();
    let request = match body.into_scoring_request() {
        Ok(request) => request,
        Err(error) => {
            state.dispatcher.record_rejected(
                user_id,
                candidate_count,
                &error,
                started.elapsed(),
            );
            return Err(error.into());
        }
    };

    debug!(
        user_id = %request.user_id,
        candidates = request.candidates.len(),
        "Handling rank request"
    );

    let ranked = state.dispatcher.dispatch(request).await?;

    Ok(HttpResponse::Ok().json(RankResponse {
        ranked_items: ranked.items,
        latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        timestamp: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> RankRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_minimal_body() {
        let request = body(serde_json::json!({
            "user_id": "U13740",
            "item_ids": ["N55189", "N42782"]
        }))
        .into_scoring_request()
        .unwrap();

        assert_eq!(request.user_id, "U13740");
        assert_eq!(request.candidates.len(), 2);
        assert_eq!(request.candidates[0].item_id, "N55189");
        assert!(request.limit.is_none());
        assert!(request.timeout.is_none());
    }

    #[test]
    fn test_candidate_features_attached() {
        let request = body(serde_json::json!({
            "user_id": "u1",
            "item_ids": ["A", "B"],
            "context_features": {"avg_hour": 14.0},
            "candidate_features": {"B": {"impressions": 3.0}},
            "limit": 1,
            "timeout_ms": 25
        }))
        .into_scoring_request()
        .unwrap();

        assert!(request.candidates[0].features.is_empty());
        assert_eq!(request.candidates[1].features.get("impressions"), Some(&3.0));
        assert_eq!(request.context.get("avg_hour"), Some(&14.0));
        assert_eq!(request.limit, Some(1));
        assert_eq!(request.timeout, Some(Duration::from_millis(25)));
    }

    #[test]
    fn test_unknown_candidate_features_rejected() {
        let result = body(serde_json::json!({
            "user_id": "u1",
            "item_ids": ["A"],
            "candidate_features": {"Z": {"impressions": 3.0}}
        }))
        .into_scoring_request();

        assert!(matches!(result, Err(RankerError::MalformedRequest(_))));
    }
}
