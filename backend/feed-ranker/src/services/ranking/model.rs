/// Model Artifact Loading
///
/// Loads the two immutable scoring artifacts (LambdaMART and deep CTR),
/// validates them against the active [`FeatureSchema`] and exposes a pure
/// scoring function per artifact.
use super::gbdt::GbdtArtifact;
use super::onnx::OnnxArtifact;
use crate::error::{RankerError, Result};
use crate::services::features::FeatureSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

/// A trained, read-only scoring function over a fixed-width vector.
pub trait ScoringArtifact: Send + Sync {
    /// Number of features the artifact was trained on
    fn input_width(&self) -> usize;

    /// Training-time feature names, when the format records them
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    fn format(&self) -> &'static str;

    /// Raw model output for one vector of exactly `input_width()` features
    fn predict(&self, features: &[f32]) -> Result<f32>;
}

/// The two ensemble members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    LambdaMart,
    Ctr,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::LambdaMart, ModelKind::Ctr];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LambdaMart => "lambdamart",
            ModelKind::Ctr => "ctr",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = RankerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lambdamart" | "lm" => Ok(ModelKind::LambdaMart),
            "ctr" | "deepctr" => Ok(ModelKind::Ctr),
            other => Err(RankerError::MalformedRequest(format!(
                "unknown model '{}'",
                other
            ))),
        }
    }
}

/// Metadata reported for a loaded artifact
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub kind: ModelKind,
    pub version: String,
    pub format: &'static str,
    pub path: Option<PathBuf>,
    pub input_width: usize,
    pub schema_version: String,
    pub loaded_at: DateTime<Utc>,
}

/// A validated artifact. Shared read-only across requests through [`ArtifactHandle`].
pub struct LoadedArtifact {
    artifact: Box<dyn ScoringArtifact>,
    info: ArtifactInfo,
}

pub type ArtifactHandle = Arc<LoadedArtifact>;

impl LoadedArtifact {
    /// Validate an artifact against the schema and wrap it.
    pub fn new(
        kind: ModelKind,
        artifact: Box<dyn ScoringArtifact>,
        version: impl Into<String>,
        path: Option<PathBuf>,
        schema: &FeatureSchema,
    ) -> Result<Self> {
        validate_against_schema(kind, artifact.as_ref(), schema)?;

        Ok(Self {
            info: ArtifactInfo {
                kind,
                version: version.into(),
                format: artifact.format(),
                path,
                input_width: artifact.input_width(),
                schema_version: schema.version.clone(),
                loaded_at: Utc::now(),
            },
            artifact,
        })
    }

    /// Score one feature vector. Only a wrong vector length is a scoring error.
    pub fn score(&self, features: &[f32]) -> Result<f32> {
        let expected = self.info.input_width;
        if features.len() != expected {
            return Err(RankerError::Scoring {
                expected,
                actual: features.len(),
            });
        }
        self.artifact.predict(features)
    }

    pub fn info(&self) -> &ArtifactInfo {
        &self.info
    }

    pub fn kind(&self) -> ModelKind {
        self.info.kind
    }

    pub fn version(&self) -> &str {
        &self.info.version
    }
}

impl fmt::Debug for LoadedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedArtifact")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

fn validate_against_schema(
    kind: ModelKind,
    artifact: &dyn ScoringArtifact,
    schema: &FeatureSchema,
) -> Result<()> {
    let mismatch = |detail: String| RankerError::SchemaMismatch {
        model: kind.to_string(),
        schema_version: schema.version.clone(),
        detail,
    };

    if artifact.input_width() != schema.width() {
        return Err(mismatch(format!(
            "artifact expects {} features, schema defines {}",
            artifact.input_width(),
            schema.width()
        )));
    }

    if let Some(names) = artifact.feature_names() {
        if let Some((position, (trained, served))) = names
            .iter()
            .zip(schema.names())
            .enumerate()
            .find(|(_, (trained, served))| trained.as_str() != *served)
        {
            return Err(mismatch(format!(
                "feature {} is '{}' in the artifact but '{}' in the schema",
                position, trained, served
            )));
        }
    }

    Ok(())
}

/// Reads artifacts from disk, picking the format from the file extension.
pub struct ArtifactLoader;

impl ArtifactLoader {
    /// `.onnx` files go through tract; anything else is read as a LightGBM text dump.
    pub fn load<P: AsRef<Path>>(
        kind: ModelKind,
        path: P,
        schema: &FeatureSchema,
    ) -> Result<ArtifactHandle> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RankerError::artifact_load(
                kind.as_str(),
                path,
                "file not found",
            ));
        }

        let artifact: Box<dyn ScoringArtifact> = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("onnx") => Box::new(
                OnnxArtifact::load(path)
                    .map_err(|e| RankerError::artifact_load(kind.as_str(), path, e))?,
            ),
            _ => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| RankerError::artifact_load(kind.as_str(), path, e))?;
                Box::new(
                    GbdtArtifact::parse(&text)
                        .map_err(|e| RankerError::artifact_load(kind.as_str(), path, e))?,
                )
            }
        };

        let version = Self::version_for(path);
        debug!(
            model = %kind,
            format = artifact.format(),
            input_width = artifact.input_width(),
            "Parsed model artifact"
        );

        let loaded = LoadedArtifact::new(
            kind,
            artifact,
            version,
            Some(path.to_path_buf()),
            schema,
        )?;

        info!(
            model = %kind,
            version = %loaded.version(),
            path = %path.display(),
            schema_version = %schema.version,
            "Loaded model artifact"
        );

        Ok(Arc::new(loaded))
    }

    /// `<file stem>@<mtime seconds>`, or just the stem when mtime is unavailable
    fn version_for(path: &Path) -> String {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("artifact");

        let modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok());

        match modified {
            Some(since_epoch) => format!("{}@{}", stem, since_epoch.as_secs()),
            None => stem.to_string(),
        }
    }
}
