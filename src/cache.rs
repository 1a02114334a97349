//! Model cache management for downloaded models
//!
//! Downloaded Hugging Face repositories are stored one directory per model id
//! under an XDG cache directory. A directory counts as a cached model once it
//! holds at least one known ONNX variant.

use crate::error::{BgRemovalError, Result};
use crate::models::VARIANT_FILES;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the cache root
pub const CACHE_DIR_ENV: &str = "BGREMOVE_CACHE_DIR";

/// Default model repository
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/briaai/RMBG-1.4";

const HUGGINGFACE_PREFIX: &str = "https://huggingface.co/";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (derived from URL)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Whether `preprocessor_config.json` was downloaded
    pub has_preprocessor: bool,
    /// Available ONNX variants (fp32, fp16, quantized)
    pub variants: Vec<String>,
    /// Size of the model directory in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache manager at the default location
    ///
    /// - `$BGREMOVE_CACHE_DIR/models` when the variable is set
    /// - otherwise `<user cache dir>/bgremove-api/models`
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new() -> Result<Self> {
        let override_dir = std::env::var(CACHE_DIR_ENV).ok();
        let cache_dir = Self::resolve_cache_dir(override_dir.as_deref())?;
        Self::ensure_dir(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Create a cache manager rooted at `cache_dir/models`
    ///
    /// # Errors
    /// - Failed to create the cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        let models_dir = cache_dir.join("models");
        Self::ensure_dir(&models_dir)?;
        Ok(Self {
            cache_dir: models_dir,
        })
    }

    fn resolve_cache_dir(override_dir: Option<&str>) -> Result<PathBuf> {
        if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV} or pass --cache-dir."
                ))
            })?
            .join("bgremove-api")
            .join("models"))
    }

    fn ensure_dir(dir: &Path) -> Result<()> {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .map_err(|e| BgRemovalError::file_io_error("create cache directory", dir, &e))?;
        }
        Ok(())
    }

    /// Derive a filesystem-safe model id from a URL
    ///
    /// ```
    /// use bgremove_api::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id("https://huggingface.co/briaai/RMBG-1.4");
    /// assert_eq!(id, "briaai--RMBG-1.4");
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        if let Some(repo) = url.strip_prefix(HUGGINGFACE_PREFIX) {
            return repo.trim_end_matches('/').replace('/', "--");
        }

        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(url.as_bytes());
        let hex = format!("{digest:x}");
        format!("url-{}", hex.get(..12).unwrap_or(&hex))
    }

    /// Whether `model_id` has a usable cached directory
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        Self::has_model_files(&self.get_model_path(model_id))
    }

    /// Path of a model directory (may not exist)
    #[must_use]
    pub fn get_model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn has_model_files(model_path: &Path) -> bool {
        !Self::variants_in(model_path).is_empty()
    }

    fn variants_in(model_path: &Path) -> Vec<String> {
        VARIANT_FILES
            .iter()
            .filter(|(_, file)| {
                model_path.join("onnx").join(file).is_file() || model_path.join(file).is_file()
            })
            .map(|(variant, _)| (*variant).to_string())
            .collect()
    }

    /// List every cached model, sorted by id
    ///
    /// Directories without an ONNX variant (interrupted downloads, stray
    /// temp dirs) are skipped.
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            BgRemovalError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                BgRemovalError::file_io_error("read cache directory entry", &self.cache_dir, &e)
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let variants = Self::variants_in(&path);
            if variants.is_empty() {
                log::debug!("Skipping incomplete model directory: {}", path.display());
                continue;
            }

            models.push(CachedModelInfo {
                model_id: entry.file_name().to_string_lossy().into_owned(),
                has_preprocessor: path.join("preprocessor_config.json").is_file(),
                size_bytes: Self::directory_size(&path).unwrap_or(0),
                path,
                variants,
            });
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    fn directory_size(dir: &Path) -> std::io::Result<u64> {
        let mut total = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            total += if path.is_dir() {
                Self::directory_size(&path)?
            } else {
                entry.metadata()?.len()
            };
        }
        Ok(total)
    }

    /// Remove one cached model
    ///
    /// Returns `false` when nothing was cached under `model_id`.
    ///
    /// # Errors
    /// - `model_id` is not a plain directory name
    /// - Failed to remove the model directory
    pub fn clear_specific_model(&self, model_id: &str) -> Result<bool> {
        if model_id.is_empty()
            || matches!(model_id, "." | "..")
            || model_id.contains(['/', '\\'])
        {
            return Err(BgRemovalError::invalid_config(format!(
                "Invalid model id: '{model_id}'"
            )));
        }

        let model_path = self.get_model_path(model_id);
        if !model_path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", model_id);
        fs::remove_dir_all(&model_path)
            .map_err(|e| BgRemovalError::file_io_error("remove cached model", &model_path, &e))?;
        Ok(true)
    }

    /// Remove every cached model, returning the removed ids
    ///
    /// # Errors
    /// - Failed to read the cache directory or remove a model
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for model in self.scan_cached_models()? {
            if self.clear_specific_model(&model.model_id)? {
                removed.push(model.model_id);
            }
        }
        Ok(removed)
    }
}

/// Format file size in human-readable form
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let suffix = UNITS.get(unit).unwrap_or(&"B");
    if unit == 0 {
        format!("{bytes} {suffix}")
    } else {
        format!("{size:.1} {suffix}")
    }
}
