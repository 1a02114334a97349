//! Model downloading from Hugging Face repositories
//!
//! Files land in a temporary directory inside the cache and are renamed into
//! place only once an ONNX variant has been fetched, so an interrupted download
//! never looks like a cached model.

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use crate::models::VARIANT_FILES;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

const HUGGINGFACE_PREFIX: &str = "https://huggingface.co/";

/// Metadata files fetched when the repository has them
const METADATA_FILES: &[&str] = &["config.json", "preprocessor_config.json"];

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    fn new(show: bool) -> Self {
        #[cfg(feature = "cli")]
        {
            if show {
                let pb = ProgressBar::new(0);
                let template = concat!(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] ",
                    "{bytes}/{total_bytes} {msg}"
                );
                if let Ok(style) = ProgressStyle::default_bar().template(template) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                return Self::Indicatif(pb);
            }
        }
        let _ = show;
        Self::NoOp
    }

    fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    fn start_file(&self, len: Option<u64>) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => {
                pb.set_length(len.unwrap_or(0));
                pb.set_position(0);
            },
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

/// Model downloader backed by a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader writing to the default cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader writing to `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(900))
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client, cache })
    }

    /// Download a model repository into the cache and return its model id
    ///
    /// With `variant` set only that ONNX file is fetched. Otherwise variants
    /// are tried in preference order (`fp32`, `fp16`, `quantized`) and the
    /// first one that downloads wins. A model already cached with the wanted
    /// variant returns immediately.
    ///
    /// # Errors
    /// - Invalid or unsupported URL
    /// - Unknown variant
    /// - Network errors, or no ONNX variant could be fetched
    /// - File system errors while moving the model into the cache
    pub async fn download_model(
        &self,
        url: &str,
        variant: Option<&str>,
        show_progress: bool,
    ) -> Result<String> {
        validate_model_url(url)?;
        let model_id = ModelCache::url_to_model_id(url);
        let final_dir = self.cache.get_model_path(&model_id);

        let wanted: Vec<(&str, &str)> = match variant {
            Some(v) => {
                let found: Vec<_> = VARIANT_FILES
                    .iter()
                    .copied()
                    .filter(|(name, _)| *name == v)
                    .collect();
                if found.is_empty() {
                    return Err(BgRemovalError::invalid_config(format!(
                        "Unknown model variant: {v}. Supported: fp32, fp16, quantized"
                    )));
                }
                found
            },
            None => VARIANT_FILES.to_vec(),
        };

        let already_cached = match variant {
            Some(_) => wanted
                .iter()
                .any(|(_, file)| final_dir.join("onnx").join(file).is_file()),
            None => self.cache.is_model_cached(&model_id),
        };
        if already_cached {
            log::info!("Model already cached: {}", model_id);
            return Ok(model_id);
        }

        log::info!("Downloading model {} from {}", model_id, url);
        let temp_dir = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(self.cache.cache_dir())
            .map_err(|e| {
                BgRemovalError::file_io_error("create temp directory", self.cache.cache_dir(), &e)
            })?;

        let progress = ProgressIndicator::new(show_progress);
        if let Err(e) = self
            .download_model_files(url, temp_dir.path(), &wanted, &progress)
            .await
        {
            progress.finish_with_message("Download failed".to_string());
            return Err(e);
        }

        merge_into_cache(temp_dir.path(), &final_dir)?;

        progress.finish_with_message(format!("Downloaded {model_id}"));
        log::info!("Model cached at {}", final_dir.display());
        Ok(model_id)
    }

    async fn download_model_files(
        &self,
        base_url: &str,
        download_dir: &Path,
        wanted: &[(&str, &str)],
        progress: &ProgressIndicator,
    ) -> Result<()> {
        for file_name in METADATA_FILES {
            progress.set_message(format!("Downloading {file_name}"));
            if let Err(e) = self
                .download_file(
                    &raw_file_url(base_url, file_name),
                    &download_dir.join(file_name),
                    progress,
                )
                .await
            {
                log::warn!("Skipping {}: {}", file_name, e);
            }
        }

        let mut last_error = None;
        for (variant, file_name) in wanted {
            let remote = format!("onnx/{file_name}");
            let local = download_dir.join("onnx").join(file_name);
            progress.set_message(format!("Downloading {variant} model"));

            match self
                .download_file(&raw_file_url(base_url, &remote), &local, progress)
                .await
            {
                Ok(digest) => {
                    log::info!("Downloaded {} variant (sha256 {})", variant, digest);
                    return Ok(());
                },
                Err(e) => {
                    log::warn!("Failed to download {} variant: {}", variant, e);
                    last_error = Some(e);
                },
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BgRemovalError::network_error(
                "Failed to download any ONNX model variant",
                "no candidate files",
            )
        }))
    }

    /// Stream a single file to disk, returning its SHA-256 hex digest
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<String> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BgRemovalError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgRemovalError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP {status}"),
            ));
        }

        progress.start_file(response.content_length());

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("create file", local_path, &e))?;
        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgRemovalError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", local_path, &e))?;

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(format!("{:x}", hasher.finalize()))
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Move a finished download into `final_dir`
///
/// A fresh model directory is renamed into place. When the model is already
/// cached the new files are moved in one by one, replacing same-named files
/// and leaving other cached variants alone.
fn merge_into_cache(download_dir: &Path, final_dir: &Path) -> Result<()> {
    if !final_dir.exists() {
        return fs::rename(download_dir, final_dir).map_err(|e| {
            BgRemovalError::file_io_error("move downloaded model to cache", final_dir, &e)
        });
    }

    let entries = fs::read_dir(download_dir)
        .map_err(|e| BgRemovalError::file_io_error("read download directory", download_dir, &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| {
            BgRemovalError::file_io_error("read download directory", download_dir, &e)
        })?;
        let source = entry.path();
        let target = final_dir.join(entry.file_name());
        if source.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| BgRemovalError::file_io_error("create directory", &target, &e))?;
            merge_into_cache(&source, &target)?;
        } else {
            fs::rename(&source, &target).map_err(|e| {
                BgRemovalError::file_io_error("move downloaded file to cache", &target, &e)
            })?;
        }
    }
    Ok(())
}

fn raw_file_url(base_url: &str, file: &str) -> String {
    format!("{}/resolve/main/{}", base_url.trim_end_matches('/'), file)
}

/// Whether `spec` looks like a remote URL rather than a path or model id
#[must_use]
pub fn is_url(spec: &str) -> bool {
    spec.starts_with("https://") || spec.starts_with("http://")
}

/// Validate that a URL is a supported model repository
///
/// Only `https://huggingface.co/<owner>/<repo>` is accepted.
///
/// # Errors
/// - Empty, non Hugging Face, or incomplete repository URL
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(BgRemovalError::invalid_config("Model URL cannot be empty"));
    }

    let Some(repo_path) = url.strip_prefix(HUGGINGFACE_PREFIX) else {
        return Err(BgRemovalError::invalid_config(format!(
            "Unsupported URL format: {url}. \
             Only Hugging Face repositories are supported (https://huggingface.co/...)"
        )));
    };

    let mut parts = repo_path.trim_end_matches('/').split('/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => Ok(()),
        _ => Err(BgRemovalError::invalid_config(format!(
            "Invalid Hugging Face repository URL: {url}. Expected https://huggingface.co/owner/repo"
        ))),
    }
}
