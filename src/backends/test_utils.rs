//! Mock backend for testing the model host and pipeline without model files

use crate::{
    config::ModelHostConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Shape of the tensor the mock returns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockOutput {
    /// Soft disc of probabilities in `[0, 1]`, centered in the frame
    Disc,
    /// Same disc expressed as logits in roughly `[-8, 8]`
    Logits,
    /// Every value set to the same number
    Constant(f32),
    /// Left half background, right half foreground
    SplitVertical,
    /// Two batch entries instead of one
    WrongBatch,
}

/// Mock backend recording its calls
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    preprocessing: PreprocessingConfig,
    output: MockOutput,
    /// Output spatial size; defaults to the preprocessing target size
    output_size: Option<(usize, usize)>,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
    should_panic_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            preprocessing: PreprocessingConfig {
                target_size: [32, 32],
                ..PreprocessingConfig::default()
            },
            output: MockOutput::Disc,
            output_size: None,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
            should_panic_inference: false,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: MockOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_output_size(mut self, height: usize, width: usize) -> Self {
        self.output_size = Some((height, width));
        self
    }

    #[must_use]
    pub fn failing_init(mut self) -> Self {
        self.should_fail_init = true;
        self
    }

    #[must_use]
    pub fn failing_inference(mut self) -> Self {
        self.should_fail_inference = true;
        self
    }

    /// Panic inside `infer`, as a crashing runtime would
    #[must_use]
    pub fn panicking_inference(mut self) -> Self {
        self.should_panic_inference = true;
        self
    }

    /// Shared handle to the call history, valid after the mock is boxed
    #[must_use]
    pub fn history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_output(&self, input: &Array4<f32>) -> Array4<f32> {
        let (_, _, in_h, in_w) = input.dim();
        let (height, width) = self.output_size.unwrap_or((in_h, in_w));
        let batch = if self.output == MockOutput::WrongBatch { 2 } else { 1 };

        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(1.0);

        Array4::from_shape_fn((batch, 1, height, width), |(_, _, y, x)| {
            let dx = x as f32 + 0.5 - center_x;
            let dy = y as f32 + 0.5 - center_y;
            let disc = ((radius - (dx * dx + dy * dy).sqrt()) / radius).clamp(0.0, 1.0);
            match self.output {
                MockOutput::Disc | MockOutput::WrongBatch => disc,
                MockOutput::Logits => disc * 16.0 - 8.0,
                MockOutput::Constant(value) => value,
                MockOutput::SplitVertical => {
                    if (x as f32) < center_x {
                        0.0
                    } else {
                        1.0
                    }
                },
            }
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &ModelHostConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");
        if self.should_fail_init {
            return Err(BgRemovalError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(5)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");
        if !self.initialized {
            return Err(BgRemovalError::inference("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock backend inference failed"));
        }
        if self.should_panic_inference {
            panic!("Mock backend panicked during inference");
        }

        let [h, w] = self.preprocessing.target_size;
        let (n, c, in_h, in_w) = input.dim();
        if n != 1 || c != 3 || in_h != h as usize || in_w != w as usize {
            return Err(BgRemovalError::inference(format!(
                "Mock backend expected [1, 3, {h}, {w}], got {:?}",
                input.shape()
            )));
        }

        Ok(self.generate_output(input))
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.record_call("preprocessing_config");
        Ok(self.preprocessing.clone())
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock-segmenter".to_string(),
            variant: "fp32".to_string(),
            size_bytes: 0,
            path: PathBuf::from("mock.onnx"),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let mut backend = MockBackend::new();
        let history = backend.history();
        backend.initialize(&ModelHostConfig::default()).unwrap();
        backend
            .infer(&Array4::zeros((1, 3, 32, 32)))
            .unwrap();
        assert_eq!(*history.lock().unwrap(), vec!["initialize", "infer"]);
    }

    #[test]
    fn test_mock_rejects_wrong_input_shape() {
        let mut backend = MockBackend::new();
        backend.initialize(&ModelHostConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 16, 32))).is_err());
    }

    #[test]
    fn test_mock_output_modes() {
        let mut backend = MockBackend::new().with_output(MockOutput::Logits);
        backend.initialize(&ModelHostConfig::default()).unwrap();
        let out = backend.infer(&Array4::zeros((1, 3, 32, 32))).unwrap();
        assert!(out.iter().any(|v| *v < 0.0));

        let mut backend = MockBackend::new()
            .with_output(MockOutput::WrongBatch)
            .with_output_size(4, 4);
        backend.initialize(&ModelHostConfig::default()).unwrap();
        let out = backend.infer(&Array4::zeros((1, 3, 32, 32))).unwrap();
        assert_eq!(out.dim(), (2, 1, 4, 4));
    }
}
