/// Ranking Module
///
/// Two-model ensemble over a shared feature schema.
///
/// # Architecture
/// - **Artifact Layer**: LightGBM text (LambdaMART) and ONNX (deep CTR) artifacts
///   behind [`ScoringArtifact`], validated against the feature schema at load
/// - **Registry**: hot-swappable slots handing out per-request snapshots
/// - **Scoring Layer**: weighted-sum ensemble with per-candidate fallback
/// - **Ranking**: stable descending order, fallbacks last
pub mod engine;
pub mod gbdt;
pub mod model;
pub mod onnx;
pub mod registry;
pub mod scorer;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{RankingEngine, FALLBACK_SCORE};
pub use model::{ArtifactHandle, ArtifactInfo, ArtifactLoader, LoadedArtifact, ModelKind, ScoringArtifact};
pub use registry::{EnsembleModels, ModelRegistry};
pub use scorer::{EnsembleScorer, EnsembleWeights, FeatureBatch, ScoredBatch};
