pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{RankerError, Result};
pub use services::{
    ArtifactLoader, EnsembleScorer, EnsembleWeights, FeatureSchema, ModelKind, ModelRegistry,
    RankingEngine, RequestDispatcher,
};
