pub mod dispatcher;
pub mod features;
pub mod ranking;

pub use dispatcher::RequestDispatcher;
pub use features::{FeatureSchema, FeatureVectorBuilder};
pub use ranking::{
    ArtifactLoader, EnsembleScorer, EnsembleWeights, ModelKind, ModelRegistry, RankingEngine,
};
