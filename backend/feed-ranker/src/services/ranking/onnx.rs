/// ONNX model inference with tract-onnx
///
/// Used for the deep CTR artifact. The input width is read from the model's
/// declared input fact, then the plan is pinned to a single row.
use super::model::ScoringArtifact;
use crate::error::{RankerError, Result};
use std::path::Path;
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::infer::Factoid;
use tract_onnx::tract_hir::internal::DimLike;

/// Type alias for the optimized tract model
type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct OnnxArtifact {
    model: TractModel,
    input_width: usize,
}

impl OnnxArtifact {
    pub fn load(path: &Path) -> TractResult<Self> {
        let model = tract_onnx::onnx().model_for_path(path)?;
        let input_width = Self::declared_width(&model)?;

        let model = model
            .with_input_fact(0, f32::fact([1, input_width]).into())?
            .into_optimized()?
            .into_runnable()?;

        Ok(Self { model, input_width })
    }

    /// Last dimension of the first input, which must be concrete
    fn declared_width(model: &InferenceModel) -> TractResult<usize> {
        let fact = model.input_fact(0)?;
        let last = fact
            .shape
            .dims()
            .last()
            .and_then(|dim| dim.concretize())
            .ok_or_else(|| anyhow::anyhow!("model input does not declare a feature dimension"))?;

        last.to_usize()
    }
}

impl ScoringArtifact for OnnxArtifact {
    fn input_width(&self) -> usize {
        self.input_width
    }

    fn format(&self) -> &'static str {
        "onnx"
    }

    fn predict(&self, features: &[f32]) -> Result<f32> {
        let input = Tensor::from_shape(&[1, self.input_width], features)
            .map_err(|e| RankerError::Internal(format!("ONNX input tensor: {}", e)))?;

        let output = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| RankerError::Internal(format!("ONNX inference failed: {}", e)))?;

        // First element of the first output: sigmoid probability for the CTR net
        let scores = output[0]
            .to_array_view::<f32>()
            .map_err(|e| RankerError::Internal(format!("Output extraction failed: {}", e)))?;

        scores
            .iter()
            .next()
            .copied()
            .ok_or_else(|| RankerError::Internal("ONNX model produced an empty output".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// `sigmoid(features · [0.5, -0.25])`, declared input `[1, 2]`
    fn tiny_ctr() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("ctr_tiny.onnx")
    }

    fn sigmoid(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn test_load_reads_declared_width() {
        let artifact = OnnxArtifact::load(&tiny_ctr()).unwrap();
        assert_eq!(artifact.input_width(), 2);
        assert_eq!(artifact.format(), "onnx");
    }

    #[test]
    fn test_predict_single_row() {
        let artifact = OnnxArtifact::load(&tiny_ctr()).unwrap();

        let score = artifact.predict(&[4.0, 2.0]).unwrap();
        assert!((score - sigmoid(1.5)).abs() < 1e-5);

        let neutral = artifact.predict(&[0.0, 0.0]).unwrap();
        assert!((neutral - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_predict_is_repeatable() {
        let artifact = OnnxArtifact::load(&tiny_ctr()).unwrap();
        let first = artifact.predict(&[1.0, 3.0]).unwrap();
        let second = artifact.predict(&[1.0, 3.0]).unwrap();
        assert_eq!(first, second);
        assert!((first - sigmoid(-0.25)).abs() < 1e-5);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(OnnxArtifact::load(Path::new("/nonexistent/deepctr.onnx")).is_err());
    }

    #[test]
    fn test_load_garbage_fails() {
        let file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
        std::fs::write(file.path(), b"definitely not protobuf").unwrap();
        assert!(OnnxArtifact::load(file.path()).is_err());
    }
}
