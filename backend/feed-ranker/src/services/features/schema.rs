/// Feature Schema
///
/// Ordered, versioned definition of the numeric inputs both ranking models
/// were trained on. Loaded once and shared by the vector builder and by
/// artifact validation.
use crate::error::{RankerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Version tag of the built-in schema (MIND preprocessing output)
pub const DEFAULT_SCHEMA_VERSION: &str = "mind-v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Continuous,
    Count,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
    #[serde(default)]
    pub fill_value: f32,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, kind: FeatureKind, fill_value: f32) -> Self {
        Self {
            name: name.into(),
            kind,
            fill_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: String,
    pub features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    /// Build and validate a schema
    pub fn new(version: impl Into<String>, features: Vec<FeatureSpec>) -> Result<Self> {
        let schema = Self {
            version: version.into(),
            features,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Load a schema definition from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RankerError::InvalidSchema(format!("cannot read {}: {}", path.display(), e))
        })?;
        let schema: FeatureSchema = serde_json::from_str(&raw).map_err(|e| {
            RankerError::InvalidSchema(format!("cannot parse {}: {}", path.display(), e))
        })?;
        schema.validate()?;

        info!(
            version = %schema.version,
            width = schema.width(),
            path = %path.display(),
            "Loaded feature schema"
        );

        Ok(schema)
    }

    /// Columns emitted by the offline preprocessing job and fed to both trainers
    pub fn default_schema() -> Self {
        Self {
            version: DEFAULT_SCHEMA_VERSION.to_string(),
            features: vec![
                FeatureSpec::new("impressions", FeatureKind::Count, 1.0),
                FeatureSpec::new("avg_hour", FeatureKind::Continuous, 0.0),
            ],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(RankerError::InvalidSchema(
                "schema version must not be empty".to_string(),
            ));
        }
        if self.features.is_empty() {
            return Err(RankerError::InvalidSchema(
                "schema must declare at least one feature".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.features.len());
        for spec in &self.features {
            if spec.name.trim().is_empty() {
                return Err(RankerError::InvalidSchema(
                    "feature name must not be empty".to_string(),
                ));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(RankerError::InvalidSchema(format!(
                    "duplicate feature '{}'",
                    spec.name
                )));
            }
            if !spec.fill_value.is_finite() {
                return Err(RankerError::InvalidSchema(format!(
                    "fill value for '{}' must be finite",
                    spec.name
                )));
            }
            match spec.kind {
                FeatureKind::Count if spec.fill_value < 0.0 => {
                    return Err(RankerError::InvalidSchema(format!(
                        "count feature '{}' cannot have a negative fill value",
                        spec.name
                    )));
                }
                FeatureKind::Binary if spec.fill_value != 0.0 && spec.fill_value != 1.0 => {
                    return Err(RankerError::InvalidSchema(format!(
                        "binary feature '{}' must fill with 0 or 1",
                        spec.name
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn width(&self) -> usize {
        self.features.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|spec| spec.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|spec| spec.name == name)
    }

    pub fn fill_values(&self) -> Vec<f32> {
        self.features.iter().map(|spec| spec.fill_value).collect()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::default_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_schema_matches_training_columns() {
        let schema = FeatureSchema::default_schema();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.width(), 2);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["impressions", "avg_hour"]);
        assert_eq!(schema.position("avg_hour"), Some(1));
        assert_eq!(schema.position("clicks"), None);
    }

    #[test]
    fn test_duplicate_feature_rejected() {
        let result = FeatureSchema::new(
            "v1",
            vec![
                FeatureSpec::new("impressions", FeatureKind::Count, 0.0),
                FeatureSpec::new("impressions", FeatureKind::Count, 0.0),
            ],
        );
        assert!(matches!(result, Err(RankerError::InvalidSchema(_))));
    }

    #[test]
    fn test_fill_value_policy() {
        let negative_count = FeatureSchema::new(
            "v1",
            vec![FeatureSpec::new("impressions", FeatureKind::Count, -1.0)],
        );
        assert!(negative_count.is_err());

        let bad_binary = FeatureSchema::new(
            "v1",
            vec![FeatureSpec::new("is_following", FeatureKind::Binary, 0.5)],
        );
        assert!(bad_binary.is_err());

        let nan_fill = FeatureSchema::new(
            "v1",
            vec![FeatureSpec::new("avg_hour", FeatureKind::Continuous, f32::NAN)],
        );
        assert!(nan_fill.is_err());

        assert!(FeatureSchema::new("v1", vec![]).is_err());
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "version": "mind-v2",
                "features": [
                    {{"name": "impressions", "kind": "count", "fill_value": 1.0}},
                    {{"name": "avg_hour", "kind": "continuous"}},
                    {{"name": "title_len", "kind": "count", "fill_value": 0.0}}
                ]
            }}"#
        )
        .unwrap();

        let schema = FeatureSchema::from_path(file.path()).unwrap();
        assert_eq!(schema.version, "mind-v2");
        assert_eq!(schema.width(), 3);
        assert_eq!(schema.fill_values(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = FeatureSchema::from_path("/nonexistent/schema.json");
        assert!(matches!(result, Err(RankerError::InvalidSchema(_))));
    }
}
