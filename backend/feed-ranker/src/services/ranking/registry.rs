/// Model Registry
///
/// Owns the current artifact for each ensemble member. Requests take an
/// `Arc` snapshot at scoring start; reloads build the replacement off-lock and
/// publish it with a single pointer swap, so a request sees either the old or
/// the new artifact, never a mix.
use super::model::{ArtifactHandle, ArtifactInfo, ArtifactLoader, LoadedArtifact, ModelKind};
use crate::error::{RankerError, Result};
use crate::services::features::FeatureSchema;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

struct ModelSlot {
    kind: ModelKind,
    current: RwLock<Option<ArtifactHandle>>,
    source: RwLock<Option<PathBuf>>,
}

impl ModelSlot {
    fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            current: RwLock::new(None),
            source: RwLock::new(None),
        }
    }

    fn get(&self) -> Option<ArtifactHandle> {
        self.current.read().clone()
    }

    /// Returns the artifact that was replaced
    fn publish(&self, handle: ArtifactHandle) -> Option<ArtifactHandle> {
        if let Some(path) = &handle.info().path {
            *self.source.write() = Some(path.clone());
        }
        self.current.write().replace(handle)
    }
}

/// Both ensemble members captured at one instant
#[derive(Debug, Clone)]
pub struct EnsembleModels {
    pub lambdamart: ArtifactHandle,
    pub ctr: ArtifactHandle,
}

pub struct ModelRegistry {
    schema: Arc<FeatureSchema>,
    lambdamart: ModelSlot,
    ctr: ModelSlot,
}

impl ModelRegistry {
    /// Empty registry; not ready until both artifacts are installed
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self {
            schema,
            lambdamart: ModelSlot::new(ModelKind::LambdaMart),
            ctr: ModelSlot::new(ModelKind::Ctr),
        }
    }

    /// Load both artifacts; any failure is fatal for startup.
    pub fn load(
        schema: Arc<FeatureSchema>,
        lambdamart_path: impl AsRef<Path>,
        ctr_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let registry = Self::new(schema);
        registry.load_from(ModelKind::LambdaMart, lambdamart_path)?;
        registry.load_from(ModelKind::Ctr, ctr_path)?;
        Ok(registry)
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    fn slot(&self, kind: ModelKind) -> &ModelSlot {
        match kind {
            ModelKind::LambdaMart => &self.lambdamart,
            ModelKind::Ctr => &self.ctr,
        }
    }

    /// Load an artifact from disk and swap it in
    pub fn load_from(&self, kind: ModelKind, path: impl AsRef<Path>) -> Result<ArtifactInfo> {
        let handle = ArtifactLoader::load(kind, path, &self.schema)?;
        Ok(self.publish(handle))
    }

    /// Validate an in-memory artifact and swap it in
    pub fn install(&self, artifact: LoadedArtifact) -> Result<ArtifactInfo> {
        if artifact.info().schema_version != self.schema.version {
            return Err(RankerError::SchemaMismatch {
                model: artifact.kind().to_string(),
                schema_version: self.schema.version.clone(),
                detail: format!(
                    "artifact was validated against schema {}",
                    artifact.info().schema_version
                ),
            });
        }
        Ok(self.publish(Arc::new(artifact)))
    }

    fn publish(&self, handle: ArtifactHandle) -> ArtifactInfo {
        let info = handle.info().clone();
        let previous = self.slot(info.kind).publish(handle);

        info!(
            model = %info.kind,
            version = %info.version,
            previous_version = previous.as_ref().map(|p| p.version().to_string()),
            "Published model artifact"
        );

        info
    }

    /// Reload from `path`, or from the last path this slot was loaded from.
    ///
    /// On failure the currently published artifact stays in place.
    pub fn reload(&self, kind: ModelKind, path: Option<PathBuf>) -> Result<ArtifactInfo> {
        let slot = self.slot(kind);
        let path = match path.or_else(|| slot.source.read().clone()) {
            Some(path) => path,
            None => {
                return Err(RankerError::MalformedRequest(format!(
                    "no source path known for {} artifact",
                    kind
                )))
            }
        };

        self.load_from(kind, &path).map_err(|e| {
            warn!(model = %kind, path = %path.display(), error = %e, "Reload failed, keeping current artifact");
            e
        })
    }

    pub fn get(&self, kind: ModelKind) -> Option<ArtifactHandle> {
        self.slot(kind).get()
    }

    /// Snapshot both artifacts for one request
    pub fn snapshot(&self) -> Result<EnsembleModels> {
        let lambdamart = self.lambdamart.get();
        let ctr = self.ctr.get();

        match (lambdamart, ctr) {
            (Some(lambdamart), Some(ctr)) => Ok(EnsembleModels { lambdamart, ctr }),
            (lambdamart, ctr) => {
                let missing: Vec<&str> = [
                    (lambdamart.is_none(), self.lambdamart.kind),
                    (ctr.is_none(), self.ctr.kind),
                ]
                .iter()
                .filter(|(absent, _)| *absent)
                .map(|(_, kind)| kind.as_str())
                .collect();

                Err(RankerError::ModelUnavailable(format!(
                    "artifact not loaded: {}",
                    missing.join(", ")
                )))
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        ModelKind::ALL.iter().all(|kind| self.slot(*kind).get().is_some())
    }

    pub fn status(&self) -> Vec<ArtifactInfo> {
        ModelKind::ALL
            .iter()
            .filter_map(|kind| self.slot(*kind).get())
            .map(|handle| handle.info().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::features::{FeatureKind, FeatureSpec};
    use crate::services::ranking::gbdt::tests::LAMBDAMART_MODEL;
    use crate::services::ranking::test_support::FixedArtifact;
    use std::io::Write;

    fn schema() -> Arc<FeatureSchema> {
        Arc::new(
            FeatureSchema::new(
                "mind-v1",
                vec![
                    FeatureSpec::new("impressions", FeatureKind::Count, 0.0),
                    FeatureSpec::new("avg_hour", FeatureKind::Continuous, 0.0),
                ],
            )
            .unwrap(),
        )
    }

    fn fixed(kind: ModelKind, score: f32, version: &str, schema: &FeatureSchema) -> LoadedArtifact {
        LoadedArtifact::new(kind, Box::new(FixedArtifact::new(2, score)), version, None, schema)
            .unwrap()
    }

    fn write_model(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_registry_not_ready() {
        let registry = ModelRegistry::new(schema());
        assert!(!registry.is_ready());
        assert!(registry.status().is_empty());

        let err = registry.snapshot().unwrap_err();
        assert!(matches!(err, RankerError::ModelUnavailable(_)));
        assert!(err.to_string().contains("lambdamart, ctr"));
    }

    #[test]
    fn test_partial_registry_is_unavailable() {
        let schema = schema();
        let registry = ModelRegistry::new(schema.clone());
        registry
            .install(fixed(ModelKind::LambdaMart, 0.5, "v1", &schema))
            .unwrap();

        assert!(!registry.is_ready());
        let err = registry.snapshot().unwrap_err();
        assert!(err.to_string().contains("ctr"));
        assert!(!err.to_string().contains("lambdamart"));
    }

    #[test]
    fn test_swap_does_not_affect_existing_snapshot() {
        let schema = schema();
        let registry = ModelRegistry::new(schema.clone());
        registry
            .install(fixed(ModelKind::LambdaMart, 0.5, "v1", &schema))
            .unwrap();
        registry.install(fixed(ModelKind::Ctr, 0.5, "v1", &schema)).unwrap();

        let before = registry.snapshot().unwrap();
        registry.install(fixed(ModelKind::Ctr, 0.9, "v2", &schema)).unwrap();
        let after = registry.snapshot().unwrap();

        // In-flight snapshot keeps the old artifact
        assert_eq!(before.ctr.version(), "v1");
        assert_eq!(before.ctr.score(&[0.0, 0.0]).unwrap(), 0.5);

        // New snapshot sees the replacement; the other member is untouched
        assert_eq!(after.ctr.version(), "v2");
        assert_eq!(after.ctr.score(&[0.0, 0.0]).unwrap(), 0.9);
        assert!(Arc::ptr_eq(&before.lambdamart, &after.lambdamart));
    }

    #[test]
    fn test_install_rejects_foreign_schema_version() {
        let other = FeatureSchema::new(
            "other-v9",
            vec![
                FeatureSpec::new("impressions", FeatureKind::Count, 0.0),
                FeatureSpec::new("avg_hour", FeatureKind::Continuous, 0.0),
            ],
        )
        .unwrap();

        let registry = ModelRegistry::new(schema());
        let result = registry.install(fixed(ModelKind::Ctr, 0.5, "v1", &other));
        assert!(matches!(result, Err(RankerError::SchemaMismatch { .. })));
        assert!(registry.get(ModelKind::Ctr).is_none());
    }

    #[test]
    fn test_load_and_reload_from_disk() {
        let lm = write_model(LAMBDAMART_MODEL);
        let ctr = write_model(LAMBDAMART_MODEL);

        let registry = ModelRegistry::load(schema(), lm.path(), ctr.path()).unwrap();
        assert!(registry.is_ready());
        assert_eq!(registry.status().len(), 2);

        let before = registry.get(ModelKind::Ctr).unwrap();
        let info = registry.reload(ModelKind::Ctr, None).unwrap();
        let after = registry.get(ModelKind::Ctr).unwrap();

        assert_eq!(info.kind, ModelKind::Ctr);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_failed_reload_keeps_current_artifact() {
        let lm = write_model(LAMBDAMART_MODEL);
        let ctr = write_model(LAMBDAMART_MODEL);
        let registry = ModelRegistry::load(schema(), lm.path(), ctr.path()).unwrap();
        let before = registry.get(ModelKind::LambdaMart).unwrap();

        let broken = write_model("tree\nmax_feature_idx=1\n");
        let result = registry.reload(ModelKind::LambdaMart, Some(broken.path().to_path_buf()));
        assert!(matches!(result, Err(RankerError::ArtifactLoad { .. })));

        let current = registry.get(ModelKind::LambdaMart).unwrap();
        assert!(Arc::ptr_eq(&before, &current));
        assert!(registry.is_ready());
    }

    #[test]
    fn test_reload_without_known_source() {
        let schema = schema();
        let registry = ModelRegistry::new(schema.clone());
        registry.install(fixed(ModelKind::Ctr, 0.5, "v1", &schema)).unwrap();

        let result = registry.reload(ModelKind::Ctr, None);
        assert!(matches!(result, Err(RankerError::MalformedRequest(_))));
    }

    #[test]
    fn test_load_fails_when_either_artifact_missing() {
        let lm = write_model(LAMBDAMART_MODEL);
        let result = ModelRegistry::load(schema(), lm.path(), "/nonexistent/ctr.onnx");
        assert!(matches!(result, Err(RankerError::ArtifactLoad { .. })));
    }
}
