//! Inference backend abstraction

use crate::{
    config::ModelHostConfig,
    error::Result,
    models::{ModelInfo, PreprocessingConfig},
};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// A backend owns one loaded model and runs single forward passes over
/// NCHW `f32` tensors. Implementations must be `Send` so the model host can
/// move them behind a mutex shared across request tasks.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` if the backend was already
    /// initialized.
    ///
    /// # Errors
    /// - Model loading or session creation failures
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &ModelHostConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Runtime failures
    /// - Output that is not a 4-D `f32` tensor
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Preprocessing the model expects
    ///
    /// # Errors
    /// - Model metadata unavailable
    fn preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Model metadata for logging and diagnostics
    ///
    /// # Errors
    /// - Model metadata unavailable
    fn model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}
