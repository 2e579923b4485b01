/// Features Module
///
/// Feature schema definition and the dense vector builder used at serving time.
/// Training and serving must agree on names, order and fill values, so both
/// live behind the versioned [`FeatureSchema`].
pub mod builder;
pub mod schema;

pub use builder::FeatureVectorBuilder;
pub use schema::{FeatureKind, FeatureSchema, FeatureSpec, DEFAULT_SCHEMA_VERSION};
