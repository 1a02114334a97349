//! Model resolution and preprocessing metadata
//!
//! A model is a directory laid out like a Hugging Face repository
//! (`preprocessor_config.json` plus `onnx/model*.onnx`), or a bare `.onnx`
//! file. Downloaded models live in the [`ModelCache`](crate::cache::ModelCache).

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Model id of the default model once it is cached
pub const DEFAULT_MODEL_ID: &str = "briaai--RMBG-1.4";

/// Known ONNX variants in preference order
pub const VARIANT_FILES: &[(&str, &str)] = &[
    ("fp32", "model.onnx"),
    ("fp16", "model_fp16.onnx"),
    ("quantized", "model_quantized.onnx"),
];

/// Model source specification
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelSource {
    /// External model from filesystem path (directory or `.onnx` file)
    External(PathBuf),
    /// Downloaded model from cache by model ID
    Downloaded(String),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::Downloaded(model_id) => {
                format!("cached:{}", model_id)
            },
        }
    }
}

/// Complete model specification including source and optional variant
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    pub variant: Option<String>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::Downloaded(DEFAULT_MODEL_ID.to_string()),
            variant: None,
        }
    }
}

/// Input normalization expected by the model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Model input size as `[height, width]`
    pub target_size: [u32; 2],
    /// Per-channel mean, in rescaled units
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation, in rescaled units
    pub normalization_std: [f32; 3],
    /// Factor applied to raw `u8` pixel values before normalization
    pub rescale_factor: f32,
}

impl Default for PreprocessingConfig {
    /// RMBG-1.4 defaults
    fn default() -> Self {
        Self {
            target_size: [1024, 1024],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
            rescale_factor: 1.0 / 255.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HfSize {
    height: u32,
    width: u32,
}

/// Subset of a Hugging Face `preprocessor_config.json`
#[derive(Debug, Deserialize)]
struct HfPreprocessorConfig {
    size: Option<HfSize>,
    image_mean: Option<Vec<f32>>,
    image_std: Option<Vec<f32>>,
    rescale_factor: Option<f32>,
    do_normalize: Option<bool>,
    do_rescale: Option<bool>,
}

fn channel_triplet(values: Option<&[f32]>, key: &str, default: [f32; 3]) -> Result<[f32; 3]> {
    match values {
        None => Ok(default),
        Some([a, b, c, ..]) => Ok([*a, *b, *c]),
        Some(_) => Err(BgRemovalError::invalid_config(format!(
            "{key} must have at least 3 values"
        ))),
    }
}

impl PreprocessingConfig {
    /// Parse a Hugging Face `preprocessor_config.json` document
    ///
    /// Missing keys fall back to RMBG-1.4 defaults. Some exports store mean
    /// and std on the 0-255 scale; those are converted to rescaled units.
    ///
    /// # Errors
    /// - Malformed JSON
    /// - Zero target size, zero std, or short mean/std arrays
    pub fn from_huggingface_json(json: &str) -> Result<Self> {
        let raw: HfPreprocessorConfig = serde_json::from_str(json).map_err(|e| {
            BgRemovalError::invalid_config(format!("Failed to parse preprocessor_config.json: {e}"))
        })?;
        let defaults = Self::default();

        let target_size = raw
            .size
            .map_or(defaults.target_size, |s| [s.height, s.width]);
        if target_size.contains(&0) {
            return Err(BgRemovalError::invalid_config(
                "Preprocessor target size must be non-zero",
            ));
        }

        let rescale_factor = if raw.do_rescale == Some(false) {
            1.0
        } else {
            raw.rescale_factor.unwrap_or(defaults.rescale_factor)
        };

        let (mut mean, mut std) = if raw.do_normalize == Some(false) {
            ([0.0; 3], [1.0; 3])
        } else {
            (
                channel_triplet(
                    raw.image_mean.as_deref(),
                    "image_mean",
                    defaults.normalization_mean,
                )?,
                channel_triplet(
                    raw.image_std.as_deref(),
                    "image_std",
                    defaults.normalization_std,
                )?,
            )
        };

        if rescale_factor < 1.0 && mean.iter().any(|m| *m > 1.0) {
            for v in mean.iter_mut().chain(std.iter_mut()) {
                *v /= 255.0;
            }
        }

        if std.iter().any(|s| *s == 0.0) {
            return Err(BgRemovalError::invalid_config("image_std must be non-zero"));
        }

        Ok(Self {
            target_size,
            normalization_mean: mean,
            normalization_std: std,
            rescale_factor,
        })
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub variant: String,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Resolves a [`ModelSpec`] to a concrete ONNX file plus its preprocessing
#[derive(Debug)]
pub struct ModelManager {
    name: String,
    model_file: PathBuf,
    variant: String,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Resolve a model spec using the default cache location
    ///
    /// # Errors
    /// - Cache directory unavailable for downloaded models
    /// - Model directory or requested variant missing
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        match &spec.source {
            ModelSource::External(path) => Self::from_path(path, spec.variant.as_deref()),
            ModelSource::Downloaded(_) => Self::from_spec_with_cache(spec, &ModelCache::new()?),
        }
    }

    /// Resolve a model spec against a specific cache
    ///
    /// # Errors
    /// - Model not cached
    /// - Model directory or requested variant missing
    pub fn from_spec_with_cache(spec: &ModelSpec, cache: &ModelCache) -> Result<Self> {
        match &spec.source {
            ModelSource::External(path) => Self::from_path(path, spec.variant.as_deref()),
            ModelSource::Downloaded(model_id) => {
                if !cache.is_model_cached(model_id) {
                    return Err(BgRemovalError::model_error_with_context(
                        "locate",
                        cache.get_model_path(model_id),
                        "model is not cached",
                        &["pass a Hugging Face URL with --model to download it"],
                    ));
                }
                let mut manager =
                    Self::from_path(&cache.get_model_path(model_id), spec.variant.as_deref())?;
                manager.name = model_id.clone();
                Ok(manager)
            },
        }
    }

    /// Resolve a model from a directory or a direct `.onnx` path
    ///
    /// # Errors
    /// - Path missing
    /// - No ONNX file for the requested variant
    /// - Invalid `preprocessor_config.json`
    pub fn from_path(path: &Path, variant: Option<&str>) -> Result<Self> {
        if !path.exists() {
            return Err(BgRemovalError::model_error_with_context(
                "locate",
                path,
                "path does not exist",
                &["check the --model argument"],
            ));
        }

        let (root, model_file, variant) = if path.is_file() {
            let root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            let variant = variant.map_or_else(
                || Self::variant_for_file(path).to_string(),
                str::to_string,
            );
            (root, path.to_path_buf(), variant)
        } else {
            let (file, variant) = Self::find_variant_file(path, variant)?;
            (path.to_path_buf(), file, variant)
        };

        let preprocessing = Self::read_preprocessing(&root)?;
        let name = root
            .file_name()
            .map_or_else(|| "model".to_string(), |n| n.to_string_lossy().into_owned());

        log::debug!(
            "Resolved model {} ({}) -> {}",
            name,
            variant,
            model_file.display()
        );

        Ok(Self {
            name,
            model_file,
            variant,
            preprocessing,
        })
    }

    fn variant_for_file(path: &Path) -> &'static str {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        VARIANT_FILES
            .iter()
            .find(|(_, file)| *file == file_name)
            .map_or("custom", |(variant, _)| variant)
    }

    fn find_variant_file(dir: &Path, variant: Option<&str>) -> Result<(PathBuf, String)> {
        let candidates: Vec<&(&str, &str)> = match variant {
            Some(requested) => {
                let found: Vec<_> = VARIANT_FILES
                    .iter()
                    .filter(|(v, _)| *v == requested)
                    .collect();
                if found.is_empty() {
                    return Err(BgRemovalError::invalid_config(format!(
                        "Unknown model variant: {requested}. Supported: fp32, fp16, quantized"
                    )));
                }
                found
            },
            None => VARIANT_FILES.iter().collect(),
        };

        for (variant_name, file_name) in candidates {
            for candidate in [dir.join("onnx").join(file_name), dir.join(file_name)] {
                if candidate.is_file() {
                    return Ok((candidate, (*variant_name).to_string()));
                }
            }
        }

        Err(BgRemovalError::model_error_with_context(
            "locate",
            dir,
            &format!(
                "no ONNX file found for variant {}",
                variant.unwrap_or("any")
            ),
            &["expected onnx/model.onnx, onnx/model_fp16.onnx or onnx/model_quantized.onnx"],
        ))
    }

    fn read_preprocessing(root: &Path) -> Result<PreprocessingConfig> {
        let config_path = root.join("preprocessor_config.json");
        if !config_path.is_file() {
            log::debug!(
                "No preprocessor_config.json in {}, using defaults",
                root.display()
            );
            return Ok(PreprocessingConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| BgRemovalError::file_io_error("read", &config_path, &e))?;
        PreprocessingConfig::from_huggingface_json(&content)
    }

    /// Load the model bytes
    ///
    /// # Errors
    /// - File I/O errors when reading model data
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_file)
            .map_err(|e| BgRemovalError::file_io_error("read model file", &self.model_file, &e))
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata unavailable
    pub fn get_info(&self) -> Result<ModelInfo> {
        let metadata = fs::metadata(&self.model_file)
            .map_err(|e| BgRemovalError::file_io_error("stat model file", &self.model_file, &e))?;
        Ok(ModelInfo {
            name: self.name.clone(),
            variant: self.variant.clone(),
            size_bytes: metadata.len(),
            path: self.model_file.clone(),
        })
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_file
    }
}
