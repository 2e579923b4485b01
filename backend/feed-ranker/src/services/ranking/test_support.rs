//! In-memory artifacts for unit tests.

use super::model::{LoadedArtifact, ModelKind, ScoringArtifact};
use crate::error::{RankerError, Result};
use crate::services::features::FeatureSchema;
use crate::services::ranking::ModelRegistry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Returns the same score for every vector
pub(crate) struct FixedArtifact {
    width: usize,
    score: f32,
}

impl FixedArtifact {
    pub(crate) fn new(width: usize, score: f32) -> Self {
        Self { width, score }
    }
}

impl ScoringArtifact for FixedArtifact {
    fn input_width(&self) -> usize {
        self.width
    }

    fn format(&self) -> &'static str {
        "fixed"
    }

    fn predict(&self, _features: &[f32]) -> Result<f32> {
        Ok(self.score)
    }
}

/// Returns scripted outputs in call order, then errors once exhausted
pub(crate) struct ScriptedArtifact {
    width: usize,
    outputs: Vec<f32>,
    calls: AtomicUsize,
}

impl ScriptedArtifact {
    pub(crate) fn new(width: usize, outputs: Vec<f32>) -> Self {
        Self {
            width,
            outputs,
            calls: AtomicUsize::new(0),
        }
    }
}

impl ScoringArtifact for ScriptedArtifact {
    fn input_width(&self) -> usize {
        self.width
    }

    fn format(&self) -> &'static str {
        "scripted"
    }

    fn predict(&self, _features: &[f32]) -> Result<f32> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.outputs
            .get(call)
            .copied()
            .ok_or_else(|| RankerError::Internal(format!("no scripted output for call {}", call)))
    }
}

/// Echoes the first feature back; sleeps first when it equals `SLOW_MARKER`
pub(crate) struct EchoArtifact {
    width: usize,
    delay: Duration,
}

pub(crate) const SLOW_MARKER: f32 = 999.0;

impl EchoArtifact {
    pub(crate) fn new(width: usize, delay: Duration) -> Self {
        Self { width, delay }
    }
}

impl ScoringArtifact for EchoArtifact {
    fn input_width(&self) -> usize {
        self.width
    }

    fn format(&self) -> &'static str {
        "echo"
    }

    fn predict(&self, features: &[f32]) -> Result<f32> {
        let first = features.first().copied().unwrap_or_default();
        if first == SLOW_MARKER {
            std::thread::sleep(self.delay);
        }
        Ok(first)
    }
}

pub(crate) fn two_feature_schema() -> Arc<FeatureSchema> {
    Arc::new(FeatureSchema::default_schema())
}

/// Registry with both members installed from in-memory artifacts
pub(crate) fn registry_with(
    lambdamart: Box<dyn ScoringArtifact>,
    ctr: Box<dyn ScoringArtifact>,
) -> Arc<ModelRegistry> {
    let schema = two_feature_schema();
    let registry = ModelRegistry::new(schema.clone());
    registry
        .install(LoadedArtifact::new(ModelKind::LambdaMart, lambdamart, "test", None, &schema).unwrap())
        .unwrap();
    registry
        .install(LoadedArtifact::new(ModelKind::Ctr, ctr, "test", None, &schema).unwrap())
        .unwrap();
    Arc::new(registry)
}
