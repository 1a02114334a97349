//! Process-wide owner of the loaded segmentation model
//!
//! [`ModelHost`] is built once at startup and shared behind an `Arc`. Each
//! [`ModelHost::segment`] call preprocesses an RGB image, runs one forward
//! pass, and turns the first output channel into a `u8` mask at the model's
//! output resolution.

use crate::{
    backends::create_backend,
    cache::ModelCache,
    config::{MaskActivation, ModelHostConfig},
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelManager, PreprocessingConfig},
    types::SegmentationMask,
    utils::{ExecutionProviderManager, ImagePreprocessor},
};
use image::RgbImage;
use ndarray::{s, Array2, ArrayView2};
use std::sync::Mutex;
use tracing::{debug, info};

const RANGE_EPSILON: f32 = 1e-6;

/// Loaded model plus the settings needed to turn its output into a mask
pub struct ModelHost {
    backend: Mutex<Box<dyn InferenceBackend>>,
    preprocessing: PreprocessingConfig,
    activation: MaskActivation,
    normalize_range: bool,
    model_name: String,
}

impl std::fmt::Debug for ModelHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHost")
            .field("model_name", &self.model_name)
            .field("preprocessing", &self.preprocessing)
            .field("activation", &self.activation)
            .field("normalize_range", &self.normalize_range)
            .finish_non_exhaustive()
    }
}

impl ModelHost {
    /// Resolve, load and initialize the configured model
    ///
    /// Uses the default model cache for downloaded models.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model not found or not loadable by the selected backend
    pub fn load(config: &ModelHostConfig) -> Result<Self> {
        config.validate()?;
        let manager = ModelManager::from_spec(&config.model_spec)?;
        Self::load_with_manager(config, manager)
    }

    /// Like [`ModelHost::load`], resolving downloaded models in `cache`
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model not found or not loadable by the selected backend
    pub fn load_with_cache(config: &ModelHostConfig, cache: &ModelCache) -> Result<Self> {
        config.validate()?;
        let manager = ModelManager::from_spec_with_cache(&config.model_spec, cache)?;
        Self::load_with_manager(config, manager)
    }

    fn load_with_manager(config: &ModelHostConfig, manager: ModelManager) -> Result<Self> {
        let mut config = config.clone();
        config.execution_provider =
            ExecutionProviderManager::resolve(config.backend_type, config.execution_provider);
        info!(
            model = %config.model_spec.source.display_name(),
            backend = %config.backend_type,
            provider = %config.execution_provider,
            "Loading segmentation model"
        );

        let backend = create_backend(config.backend_type, manager)?;
        Self::from_backend(backend, &config)
    }

    /// Wrap an already constructed backend, initializing it if needed
    ///
    /// # Errors
    /// - Backend initialization failure
    /// - Backend cannot report its preprocessing config
    pub fn from_backend(
        mut backend: Box<dyn InferenceBackend>,
        config: &ModelHostConfig,
    ) -> Result<Self> {
        if let Some(load_time) = backend.initialize(config)? {
            info!(
                load_ms = load_time.as_millis() as u64,
                "Model initialized"
            );
        }

        let preprocessing = backend.preprocessing_config()?;
        let model_name = backend
            .model_info()
            .map_or_else(
                |_| "unknown".to_string(),
                |info| format!("{} ({})", info.name, info.variant),
            );

        Ok(Self {
            backend: Mutex::new(backend),
            preprocessing,
            activation: config.activation,
            normalize_range: config.normalize_range,
            model_name,
        })
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[must_use]
    pub fn preprocessing(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    /// Segment an RGB image
    ///
    /// The returned mask has the model's output resolution; resampling to
    /// the image size is left to the caller. Concurrent calls are serialized
    /// on the backend.
    ///
    /// # Errors
    /// - Empty image
    /// - Runtime failure, poisoned backend lock, or malformed output tensor
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(width = image.width(), height = image.height())
    )]
    pub fn segment(&self, image: &RgbImage) -> Result<SegmentationMask> {
        let input = ImagePreprocessor::preprocess(image, &self.preprocessing)?;

        let output = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| BgRemovalError::inference("Model backend lock poisoned"))?;
            backend.infer(&input)?
        };

        let (batch, channels, height, width) = output.dim();
        if batch != 1 || channels == 0 || height == 0 || width == 0 {
            return Err(BgRemovalError::inference(format!(
                "Unexpected model output shape {:?}, expected [1, C, H, W]",
                output.shape()
            )));
        }

        let probabilities = to_probabilities(
            output.slice(s![0, 0, .., ..]),
            self.activation,
            self.normalize_range,
        );
        let mask = SegmentationMask::from_probabilities(probabilities.view());
        debug!(
            mask_width = width,
            mask_height = height,
            foreground = mask.foreground_ratio(),
            "Mask generated"
        );
        Ok(mask)
    }
}

/// Map raw model output to probabilities in `[0, 1]`
///
/// `Auto` applies the logistic function only when some value falls outside
/// `[0, 1]`. With `normalize_range` the result is min-max stretched; a constant
/// map is left as is.
#[must_use]
pub fn to_probabilities(
    raw: ArrayView2<'_, f32>,
    activation: MaskActivation,
    normalize_range: bool,
) -> Array2<f32> {
    let apply_sigmoid = match activation {
        MaskActivation::Sigmoid => true,
        MaskActivation::Identity => false,
        MaskActivation::Auto => raw.iter().any(|v| *v < 0.0 || *v > 1.0),
    };

    let mut probabilities = if apply_sigmoid {
        raw.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    } else {
        raw.mapv(|v| v.clamp(0.0, 1.0))
    };

    if normalize_range {
        let (min, max) = probabilities
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        let range = max - min;
        if range > RANGE_EPSILON {
            probabilities.mapv_inplace(|v| (v - min) / range);
        }
    }

    probabilities
}
