//! Shared helpers for integration tests

#![allow(dead_code)]

use bgremove_api::{
    error::{BgRemovalError, Result},
    models::{ModelInfo, PreprocessingConfig},
    CompositingPipeline, InferenceBackend, ModelHost, ModelHostConfig,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const BOUNDARY: &str = "bgremove-test-boundary";

/// Deterministic backend that marks bright pixels as foreground
///
/// The first input channel is thresholded at zero, so after the default
/// normalization anything brighter than mid-gray becomes foreground.
#[derive(Debug, Clone)]
pub struct BrightnessBackend {
    calls: Arc<AtomicUsize>,
    target: u32,
}

impl BrightnessBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            target: 64,
        }
    }

    /// Counter of `infer` calls, still readable after the backend is boxed
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl InferenceBackend for BrightnessBackend {
    fn initialize(&mut self, _config: &ModelHostConfig) -> Result<Option<Duration>> {
        Ok(None)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (n, c, h, w) = input.dim();
        if n != 1 || c != 3 {
            return Err(BgRemovalError::inference("expected one RGB image"));
        }
        Ok(Array4::from_shape_fn((1, 1, h, w), |(_, _, y, x)| {
            if input[[0, 0, y, x]] > 0.0 {
                1.0
            } else {
                0.0
            }
        }))
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(PreprocessingConfig {
            target_size: [self.target, self.target],
            ..PreprocessingConfig::default()
        })
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "brightness".to_string(),
            variant: "fp32".to_string(),
            size_bytes: 0,
            path: PathBuf::from("brightness.onnx"),
        })
    }

    fn is_initialized(&self) -> bool {
        true
    }
}

pub fn pipeline(backend: BrightnessBackend) -> CompositingPipeline {
    let host = ModelHost::from_backend(Box::new(backend), &ModelHostConfig::default())
        .expect("mock host");
    CompositingPipeline::new(Arc::new(host))
}

/// Dark background with a bright square in the middle
pub fn subject_on_background(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let inside = x >= width / 4 && x < width * 3 / 4 && y >= height / 4 && y < height * 3 / 4;
        if inside {
            Rgb([240, 230, 220])
        } else {
            Rgb([10, 20, 30])
        }
    }))
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), format)
        .expect("encode fixture");
    buffer
}

fn file_part(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut part = Vec::new();
    part.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    part.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    part.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    part.extend_from_slice(bytes);
    part.extend_from_slice(b"\r\n");
    part
}

/// Multipart body with a single file part
pub fn multipart_body(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = file_part(field, filename, content_type, bytes);
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Multipart body with a typed text part ahead of the `file` part
pub fn multipart_note_then_file(
    note: &str,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\
         Content-Type: text/plain\r\n\r\n{note}\r\n"
    )
    .into_bytes();
    body.extend_from_slice(&file_part("file", filename, content_type, bytes));
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Multipart body with only a plain text field
pub fn multipart_text_only(field: &str, value: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n\
         {value}\r\n--{BOUNDARY}--\r\n"
    )
    .into_bytes()
}
