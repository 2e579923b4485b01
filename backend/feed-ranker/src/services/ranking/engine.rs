use crate::models::{RankedItem, RankedResult, ScoredCandidate};
use std::cmp::Ordering;

/// Score reported for candidates that took the invalid-score fallback
pub const FALLBACK_SCORE: f32 = f32::MIN;

/// Orders scored candidates for the response.
///
/// Valid scores sort descending; ties keep request order. Fallback candidates
/// follow every valid one, also in request order. The output is always a
/// permutation of the input unless `limit` truncates it.
pub struct RankingEngine;

impl RankingEngine {
    pub fn rank(candidates: Vec<ScoredCandidate>, limit: Option<usize>) -> RankedResult {
        let invalid_scores = candidates.iter().filter(|c| c.score.is_none()).count();

        let mut ordered = candidates;
        // Vec::sort_by is stable
        ordered.sort_by(|a, b| Self::compare(a.score, b.score));

        let take = limit.unwrap_or(ordered.len());
        let items = ordered
            .into_iter()
            .take(take)
            .map(|candidate| RankedItem {
                item_id: candidate.item_id,
                score: candidate.score.unwrap_or(FALLBACK_SCORE),
                fallback: candidate.score.is_none(),
            })
            .collect();

        RankedResult {
            items,
            invalid_scores,
        }
    }

    fn compare(a: Option<f32>, b: Option<f32>) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}
