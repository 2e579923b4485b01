use super::FeatureSchema;
use crate::models::FeatureMap;

/// Dense vector construction shared with the training pipeline.
///
/// Stateless: every call depends only on the schema and the input maps.
pub struct FeatureVectorBuilder;

impl FeatureVectorBuilder {
    /// Build a dense vector in schema order from layered feature maps.
    ///
    /// Later layers override earlier ones. Missing or non-finite values take the
    /// schema fill value; names outside the schema are ignored.
    pub fn build(schema: &FeatureSchema, layers: &[&FeatureMap]) -> Vec<f32> {
        let mut vector = vec![0.0; schema.width()];
        Self::build_into(schema, layers, &mut vector);
        vector
    }

    /// Same as [`FeatureVectorBuilder::build`] but writes into a caller buffer.
    ///
    /// `out` must have exactly `schema.width()` slots.
    pub fn build_into(schema: &FeatureSchema, layers: &[&FeatureMap], out: &mut [f32]) {
        debug_assert_eq!(out.len(), schema.width());

        for (slot, spec) in out.iter_mut().zip(&schema.features) {
            *slot = layers
                .iter()
                .rev()
                .find_map(|layer| layer.get(&spec.name).copied())
                .filter(|value| value.is_finite())
                .unwrap_or(spec.fill_value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::features::{FeatureKind, FeatureSpec};

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            "test",
            vec![
                FeatureSpec::new("impressions", FeatureKind::Count, 0.0),
                FeatureSpec::new("avg_hour", FeatureKind::Continuous, 0.0),
            ],
        )
        .unwrap()
    }

    fn map(pairs: &[(&str, f32)]) -> FeatureMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_vector_follows_schema_order() {
        let context = map(&[("avg_hour", 14.0), ("impressions", 42.0)]);
        let vector = FeatureVectorBuilder::build(&schema(), &[&context]);
        assert_eq!(vector, vec![42.0, 14.0]);
    }

    #[test]
    fn test_missing_features_use_fill_value() {
        let schema = FeatureSchema::new(
            "test",
            vec![
                FeatureSpec::new("impressions", FeatureKind::Count, 1.0),
                FeatureSpec::new("avg_hour", FeatureKind::Continuous, 12.0),
            ],
        )
        .unwrap();

        let vector = FeatureVectorBuilder::build(&schema, &[&FeatureMap::new()]);
        assert_eq!(vector, vec![1.0, 12.0]);

        let vector = FeatureVectorBuilder::build(&schema, &[]);
        assert_eq!(vector, vec![1.0, 12.0]);
    }

    #[test]
    fn test_unknown_features_ignored() {
        let context = map(&[("impressions", 3.0), ("title_len", 80.0)]);
        let vector = FeatureVectorBuilder::build(&schema(), &[&context]);
        assert_eq!(vector.len(), 2);
        assert_eq!(vector, vec![3.0, 0.0]);
    }

    #[test]
    fn test_later_layers_take_precedence() {
        let user = map(&[("impressions", 1.0), ("avg_hour", 9.0)]);
        let context = map(&[("impressions", 42.0)]);
        let candidate = map(&[("avg_hour", 20.0)]);

        let vector = FeatureVectorBuilder::build(&schema(), &[&user, &context, &candidate]);
        assert_eq!(vector, vec![42.0, 20.0]);
    }

    #[test]
    fn test_non_finite_values_replaced_by_fill() {
        let context = map(&[("impressions", f32::NAN), ("avg_hour", f32::INFINITY)]);
        let vector = FeatureVectorBuilder::build(&schema(), &[&context]);
        assert_eq!(vector, vec![0.0, 0.0]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let schema = schema();
        let context = map(&[("impressions", 42.0), ("avg_hour", 14.0)]);

        let first = FeatureVectorBuilder::build(&schema, &[&context]);
        for _ in 0..100 {
            assert_eq!(FeatureVectorBuilder::build(&schema, &[&context]), first);
        }
    }

    #[test]
    fn test_build_into_reuses_buffer() {
        let schema = schema();
        let mut buffer = vec![99.0; schema.width()];
        FeatureVectorBuilder::build_into(&schema, &[&map(&[("avg_hour", 7.0)])], &mut buffer);
        assert_eq!(buffer, vec![0.0, 7.0]);
    }
}
