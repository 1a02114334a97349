//! Tract backend: pure Rust CPU inference
//!
//! The ONNX graph is optimized for a fixed input shape taken from the model's
//! preprocessing config, which lets tract resolve every symbolic dimension
//! once at load time.

use crate::config::ModelHostConfig;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use tract_onnx::prelude::*;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models in pure Rust
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: ModelManager,
}

impl TractBackend {
    /// List Tract execution providers as `(name, available, description)`
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager,
        }
    }

    fn load_model(&mut self) -> Result<Duration> {
        let start = Instant::now();
        let model_data = self.model_manager.load_model()?;
        let [height, width] = self.model_manager.preprocessing_config().target_size;
        let model_path = self.model_manager.model_path().to_path_buf();

        let model_error = |stage: &str, e: &dyn std::fmt::Display| {
            BgRemovalError::model_error_with_context(stage, &model_path, &e.to_string(), &[])
        };

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| model_error("read", &e))?
            .with_input_fact(
                0,
                f32::fact([1, 3, height as usize, width as usize]).into(),
            )
            .map_err(|e| model_error("pin input shape of", &e))?
            .into_optimized()
            .map_err(|e| model_error("optimize", &e))?
            .into_runnable()
            .map_err(|e| model_error("prepare", &e))?;

        self.model = Some(model);
        let elapsed = start.elapsed();
        log::info!(
            "Tract backend ready for {}x{} input in {:.0}ms",
            width,
            height,
            elapsed.as_secs_f64() * 1000.0
        );
        Ok(elapsed)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &ModelHostConfig) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }
        self.load_model().map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgRemovalError::inference("Tract model not initialized"))?;

        let start = Instant::now();
        let outputs = model
            .run(tvec![Tensor::from(input.clone()).into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();
        let output_view = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| BgRemovalError::inference(format!("Failed to read output tensor: {e}")))?;

        let &[n, c, h, w] = output_view.shape() else {
            return Err(BgRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_view.ndim()
            )));
        };

        let output = Array4::from_shape_vec(
            (n, c, h, w),
            output_view.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| BgRemovalError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference {:?} -> {:?} in {:.2}ms",
            input.dim(),
            output.dim(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(output)
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.model_manager.preprocessing_config().clone())
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager.get_info()
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}
