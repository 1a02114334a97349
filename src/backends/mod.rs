//! Inference backends
//!
//! - ONNX Runtime backend (GPU acceleration through execution providers)
//! - Tract backend (pure Rust, CPU only)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::config::BackendType;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::ModelManager;

/// Build the backend selected by `backend_type` around a resolved model
///
/// # Errors
/// - The backend's cargo feature is disabled
pub fn create_backend(
    backend_type: BackendType,
    model_manager: ModelManager,
) -> Result<Box<dyn InferenceBackend>> {
    match backend_type {
        #[cfg(feature = "onnx")]
        BackendType::Onnx => Ok(Box::new(OnnxBackend::with_model_manager(model_manager))),
        #[cfg(feature = "tract")]
        BackendType::Tract => Ok(Box::new(TractBackend::with_model_manager(model_manager))),
        #[allow(unreachable_patterns)]
        other => {
            drop(model_manager);
            Err(BgRemovalError::invalid_config(format!(
                "Backend '{other}' is not compiled in; enable the '{other}' cargo feature"
            )))
        },
    }
}
