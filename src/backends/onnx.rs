//! ONNX Runtime backend
//!
//! Runs the segmentation model through `ort` with the execution provider that
//! was resolved at startup (CPU, CUDA or `CoreML`).

use crate::config::{ExecutionProvider, ModelHostConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use crate::utils::ExecutionProviderManager;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::time::Instant;

/// ONNX Runtime backend for running segmentation models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: ModelManager,
}

impl OnnxBackend {
    /// Whether ONNX Runtime can use `provider` on this machine
    #[must_use]
    pub fn provider_available(provider: ExecutionProvider) -> bool {
        match provider {
            ExecutionProvider::Auto | ExecutionProvider::Cpu => true,
            ExecutionProvider::Cuda => {
                OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
                    .unwrap_or(false)
            },
            ExecutionProvider::CoreMl => {
                OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false)
            },
        }
    }

    /// List ONNX Runtime execution providers as `(name, available, description)`
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!(
            "Platform: {} / {}, {} CPU cores",
            std::env::consts::OS,
            std::env::consts::ARCH,
            default_parallelism()
        );

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                Self::provider_available(ExecutionProvider::Cuda),
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                Self::provider_available(ExecutionProvider::CoreMl),
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager,
        }
    }

    fn apply_provider(
        builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let result = match provider {
            ExecutionProvider::Auto | ExecutionProvider::Cpu => return Ok(builder),
            ExecutionProvider::Cuda => {
                builder.with_execution_providers([CUDAExecutionProvider::default().build()])
            },
            ExecutionProvider::CoreMl => builder.with_execution_providers([
                CoreMLExecutionProvider::default().with_subgraphs(true).build(),
            ]),
        };
        result.map_err(|e| {
            BgRemovalError::inference_error_with_provider(
                &provider.to_string(),
                "Session setup",
                &e.to_string(),
                &["onnx:cpu"],
            )
        })
    }

    fn load_model(&mut self, config: &ModelHostConfig) -> Result<std::time::Duration> {
        let start = Instant::now();
        let model_data = self.model_manager.load_model()?;

        // No-op for providers already resolved at startup
        let provider =
            ExecutionProviderManager::resolve(config.backend_type, config.execution_provider);

        let builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .map_err(|e| BgRemovalError::model(format!("Failed to create session builder: {e}")))?;
        let builder = Self::apply_provider(builder, provider)?;

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            default_parallelism()
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (default_parallelism() / 4).max(1)
        };

        let session = builder
            .with_intra_threads(intra_threads)
            .and_then(|b| b.with_inter_threads(inter_threads))
            .and_then(|b| b.commit_from_memory(&model_data))
            .map_err(|e| {
                BgRemovalError::model_error_with_context(
                    "load",
                    self.model_manager.model_path(),
                    &e.to_string(),
                    &["verify the file is a valid ONNX export"],
                )
            })?;

        log::info!(
            "ONNX Runtime session ready: provider {}, {} intra-op / {} inter-op threads",
            provider,
            intra_threads,
            inter_threads
        );
        log::debug!(
            "Model size: {:.2} MB",
            model_data.len() as f64 / (1024.0 * 1024.0)
        );

        self.session = Some(session);
        Ok(start.elapsed())
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &ModelHostConfig) -> Result<Option<std::time::Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }
        self.load_model(config).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::inference("ONNX session not initialized"))?;

        let start = Instant::now();
        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs and outputs: export names differ between models
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .map(str::to_string)
            .ok_or_else(|| BgRemovalError::inference("Model produced no output tensors"))?;
        let output_tensor = outputs
            .get(&first_key)
            .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to extract output tensor: {e}"))
            })?;

        let shape = output_tensor.shape().to_vec();
        let &[n, c, h, w] = shape.as_slice() else {
            return Err(BgRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };

        let data = output_tensor.view().to_owned().into_raw_vec_and_offset().0;
        let result = Array4::from_shape_vec((n, c, h, w), data).map_err(|e| {
            BgRemovalError::inference(format!("Failed to reshape output tensor: {e}"))
        })?;

        log::debug!(
            "ONNX inference {:?} -> {:?} in {:.2}ms",
            input.dim(),
            result.dim(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.model_manager.preprocessing_config().clone())
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager.get_info()
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}
