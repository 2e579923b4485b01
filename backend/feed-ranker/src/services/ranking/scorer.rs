/// Ensemble Scoring
///
/// Builds one feature vector per candidate and combines the LambdaMART and CTR
/// outputs with a static weighted sum. A candidate whose score cannot be
/// trusted is marked for the invalid-score fallback instead of failing the
/// whole request.
use super::registry::EnsembleModels;
use crate::error::{RankerError, Result};
use crate::models::{ScoredCandidate, ScoringRequest};
use crate::services::features::{FeatureSchema, FeatureVectorBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub lambdamart: f32,
    pub ctr: f32,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            lambdamart: 0.5,
            ctr: 0.5,
        }
    }
}

impl EnsembleWeights {
    pub fn new(lambdamart: f32, ctr: f32) -> Result<Self> {
        let weights = Self { lambdamart, ctr };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lambdamart.is_finite() || !self.ctr.is_finite() {
            return Err(RankerError::InvalidConfig(format!(
                "ensemble weights must be finite (lambdamart={}, ctr={})",
                self.lambdamart, self.ctr
            )));
        }
        if self.lambdamart == 0.0 && self.ctr == 0.0 {
            return Err(RankerError::InvalidConfig(
                "at least one ensemble weight must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Weighted sum of both raw scores.
    ///
    /// `None` when either input is non-finite or the sum overflows.
    pub fn combine(&self, lambdamart: f32, ctr: f32) -> Option<f32> {
        if !lambdamart.is_finite() || !ctr.is_finite() {
            return None;
        }
        let combined = self.lambdamart * lambdamart + self.ctr * ctr;
        combined.is_finite().then_some(combined)
    }
}

/// Dense vectors for every candidate of one request, row-major in input order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    width: usize,
    values: Vec<f32>,
}

impl FeatureBatch {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.values.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.values[index * self.width..(index + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks_exact(self.width.max(1))
    }
}

/// Ensemble scorer; holds only the static weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleScorer {
    weights: EnsembleWeights,
}

/// Per-request scoring output
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    pub candidates: Vec<ScoredCandidate>,
    pub invalid_scores: usize,
}

impl EnsembleScorer {
    pub fn new(weights: EnsembleWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    /// Layers user, context and candidate features into one vector per candidate.
    pub fn build_features(schema: &FeatureSchema, request: &ScoringRequest) -> FeatureBatch {
        let width = schema.width();
        let mut values = vec![0.0; width * request.candidates.len()];

        for (candidate, row) in request
            .candidates
            .iter()
            .zip(values.chunks_exact_mut(width.max(1)))
        {
            FeatureVectorBuilder::build_into(
                schema,
                &[&request.user_features, &request.context, &candidate.features],
                row,
            );
        }

        FeatureBatch { width, values }
    }

    /// Scores every row with both models and combines the results.
    ///
    /// Candidates keep their input order. Both evaluations for a row complete
    /// before they are combined.
    pub fn score_batch(
        &self,
        models: &EnsembleModels,
        request: &ScoringRequest,
        features: &FeatureBatch,
    ) -> ScoredBatch {
        let mut invalid_scores = 0;

        let candidates = request
            .candidates
            .iter()
            .zip(features.rows())
            .map(|(candidate, row)| {
                let lambdamart = models.lambdamart.score(row);
                let ctr = models.ctr.score(row);

                let score = match (lambdamart, ctr) {
                    (Ok(lm), Ok(ctr)) => {
                        let combined = self.weights.combine(lm, ctr);
                        if combined.is_none() {
                            debug!(
                                item_id = %candidate.item_id,
                                lambdamart = lm,
                                ctr = ctr,
                                "Non-finite ensemble score, demoting candidate"
                            );
                        }
                        combined
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(
                            item_id = %candidate.item_id,
                            error = %e,
                            "Model evaluation failed for candidate, demoting"
                        );
                        None
                    }
                };

                if score.is_none() {
                    invalid_scores += 1;
                }

                ScoredCandidate {
                    item_id: candidate.item_id.clone(),
                    score,
                }
            })
            .collect();

        ScoredBatch {
            candidates,
            invalid_scores,
        }
    }

    /// Convenience for callers that do not need the intermediate batch.
    pub fn score_candidates(
        &self,
        models: &EnsembleModels,
        schema: &FeatureSchema,
        request: &ScoringRequest,
    ) -> ScoredBatch {
        let features = Self::build_features(schema, request);
        self.score_batch(models, request, &features)
    }
}
