use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Named numeric features as they arrive on the wire.
pub type FeatureMap = HashMap<String, f32>;

/// One item under consideration for a single request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateItem {
    pub item_id: String,
    #[serde(default)]
    pub features: FeatureMap,
}

impl CandidateItem {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            features: FeatureMap::new(),
        }
    }

    pub fn with_features(mut self, features: FeatureMap) -> Self {
        self.features = features;
        self
    }
}

/// Per-call scoring input. Lives only for the duration of one dispatch.
#[derive(Debug, Clone, Default)]
pub struct ScoringRequest {
    pub user_id: String,
    pub candidates: Vec<CandidateItem>,
    /// Features shared by every candidate (time of day, impressions, ...)
    pub context: FeatureMap,
    /// User-level features; overridden by context and candidate features
    pub user_features: FeatureMap,
    /// Truncate the ranked list after ordering
    pub limit: Option<usize>,
    /// Overrides the configured per-request timeout
    pub timeout: Option<Duration>,
}

impl ScoringRequest {
    pub fn new(user_id: impl Into<String>, candidates: Vec<CandidateItem>) -> Self {
        Self {
            user_id: user_id.into(),
            candidates,
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: FeatureMap) -> Self {
        self.context = context;
        self
    }

    pub fn with_user_features(mut self, user_features: FeatureMap) -> Self {
        self.user_features = user_features;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Candidate after ensemble scoring, before ordering.
///
/// `score == None` means the invalid-score fallback was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub item_id: String,
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    pub item_id: String,
    pub score: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedResult {
    pub items: Vec<RankedItem>,
    /// Candidates demoted by the invalid-score fallback
    pub invalid_scores: usize,
}

impl RankedResult {
    pub fn item_ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.item_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lifecycle of one request inside the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    FeaturesBuilt,
    Scoring,
    Ranked,
    Responded,
    Failed,
}

impl RequestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPhase::Received => "received",
            RequestPhase::FeaturesBuilt => "features_built",
            RequestPhase::Scoring => "scoring",
            RequestPhase::Ranked => "ranked",
            RequestPhase::Responded => "responded",
            RequestPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
