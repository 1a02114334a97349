//! Background removal HTTP server
//!
//! Resolves the model (downloading it into the cache when given a URL),
//! loads it once and serves the HTTP API until shutdown.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, CachedModelInfo, ModelCache, DEFAULT_MODEL_URL},
    config::MaskActivation,
    download::{is_url, ModelDownloader},
    host::ModelHost,
    models::{ModelSource, ModelSpec},
    pipeline::CompositingPipeline,
    server::{create_router, serve, AppState},
    tracing_config::{TracingConfig, TracingFormat, TracingGuard},
    utils::{ExecutionProviderManager, ModelSpecParser},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Background removal HTTP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-api")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Address to bind
    #[arg(long, env = "BGREMOVE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "BGREMOVE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Model URL (Hugging Face), cached model id, or path to a model folder or .onnx file
    #[arg(short, long, env = "BGREMOVE_MODEL", default_value = DEFAULT_MODEL_URL)]
    pub model: String,

    /// Model variant (fp32, fp16, quantized) [default: first available]
    #[arg(long, env = "BGREMOVE_VARIANT")]
    pub variant: Option<String>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:cuda, tract:cpu)
    #[arg(short, long, env = "BGREMOVE_PROVIDER", default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, env = "BGREMOVE_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Activation for the model output (auto, sigmoid, identity)
    #[arg(long, env = "BGREMOVE_ACTIVATION", default_value = "auto")]
    pub activation: MaskActivation,

    /// Keep the raw probability range instead of stretching it to [0, 1]
    #[arg(long)]
    pub no_range_normalize: bool,

    /// Largest accepted upload in MiB
    #[arg(long, env = "BGREMOVE_MAX_UPLOAD_MB", default_value_t = 20)]
    pub max_upload_mb: usize,

    /// Allow cross-origin requests from any origin
    #[arg(long, env = "BGREMOVE_CORS")]
    pub cors: bool,

    /// Use custom cache directory for downloaded models
    #[arg(long, env = "BGREMOVE_CACHE_DIR", value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format (console, compact, json)
    #[arg(long, env = "BGREMOVE_LOG_FORMAT", default_value = "console")]
    pub log_format: TracingFormat,

    /// Also write logs to this file
    #[cfg(feature = "tracing-files")]
    #[arg(long, env = "BGREMOVE_LOG_FILE", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Download the model into the cache and exit
    #[arg(long)]
    pub only_download: bool,

    /// List models in the cache and exit
    #[arg(long)]
    pub list_models: bool,

    /// Remove cached models and exit (all of them, or only MODEL given as an id or URL)
    #[arg(long, value_name = "MODEL")]
    pub clear_cache: Option<Option<String>>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = init_tracing(&cli).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let cache = match &cli.cache_dir {
        Some(dir) => ModelCache::with_custom_cache_dir(dir)
            .context("Failed to create cache with custom directory")?,
        None => ModelCache::new().context("Failed to create model cache")?,
    };

    if cli.list_models {
        return list_cached_models(&cache);
    }

    if let Some(target) = &cli.clear_cache {
        let removed = clear_cache_models(&cache, target.as_deref())?;
        if removed.is_empty() {
            println!("Nothing to remove in {}", cache.cache_dir().display());
        }
        for model_id in &removed {
            println!("Removed {model_id}");
        }
        return Ok(());
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;

    let model_spec = ensure_model_available(&cli, &cache)
        .await
        .context("Failed to ensure model is available")?;

    if cli.only_download {
        info!(
            model = %model_spec.source.display_name(),
            cache = %cache.cache_dir().display(),
            "Model ready"
        );
        return Ok(());
    }

    let host_config = CliConfigBuilder::model_host_config(&cli, model_spec)?;
    let server_config = CliConfigBuilder::server_config(&cli)?;
    debug!(?host_config, ?server_config, "Configuration resolved");

    let host = tokio::task::spawn_blocking(move || ModelHost::load_with_cache(&host_config, &cache))
        .await
        .context("Model loading task failed")?
        .context("Failed to load segmentation model")?;
    info!(model = %host.model_name(), "Model host ready");

    let pipeline = CompositingPipeline::new(Arc::new(host));
    let router = create_router(AppState::new(pipeline), &server_config);
    serve(router, &server_config).await.context("Server error")?;

    Ok(())
}

/// Resolve `--model` to a spec whose files are present locally
///
/// URLs are downloaded into the cache first; cached ids must already exist.
async fn ensure_model_available(cli: &Cli, cache: &ModelCache) -> Result<ModelSpec> {
    let variant = cli.variant.as_deref();

    if is_url(&cli.model) {
        let downloader = ModelDownloader::with_cache(cache.clone())
            .context("Failed to create model downloader")?;
        let model_id = downloader
            .download_model(&cli.model, variant, true)
            .await
            .with_context(|| format!("Failed to download model from {}", cli.model))?;

        return Ok(ModelSpec {
            source: ModelSource::Downloaded(model_id),
            variant: variant.map(str::to_string),
        });
    }

    let spec = ModelSpecParser::parse(&cli.model, variant);
    ModelSpecParser::validate(&spec).context("Invalid model specification")?;

    if let ModelSource::Downloaded(model_id) = &spec.source {
        if !cache.is_model_cached(model_id) {
            anyhow::bail!(
                "Model '{}' not found in cache at {}. \
                 Pass a Hugging Face URL with --model to download it",
                model_id,
                cache.cache_dir().display()
            );
        }
    }

    Ok(spec)
}

fn list_cached_models(cache: &ModelCache) -> Result<()> {
    let models = cache.scan_cached_models().context("Failed to scan model cache")?;

    if models.is_empty() {
        println!("No cached models in {}", cache.cache_dir().display());
        println!("Fetch the default model with: bgremove-api --only-download");
        return Ok(());
    }

    println!("Cached models in {}:", cache.cache_dir().display());
    for model in &models {
        println!("{}", describe_cached_model(model));
    }
    println!("\nServe one with: bgremove-api --model MODEL_ID");
    Ok(())
}

fn describe_cached_model(model: &CachedModelInfo) -> String {
    let preprocessing = if model.has_preprocessor {
        "preprocessor config"
    } else {
        "default preprocessing"
    };
    format!(
        "  {:<32} {:>10}  variants: {}  ({})",
        model.model_id,
        format_size(model.size_bytes),
        model.variants.join(", "),
        preprocessing
    )
}

/// Remove one cached model, or all of them when `target` is `None`
///
/// `target` may be a cached model id or the URL it was downloaded from.
fn clear_cache_models(cache: &ModelCache, target: Option<&str>) -> Result<Vec<String>> {
    let Some(target) = target else {
        return cache.clear_all_models().context("Failed to clear model cache");
    };

    let model_id = if is_url(target) {
        ModelCache::url_to_model_id(target)
    } else {
        target.to_string()
    };
    let removed = cache
        .clear_specific_model(&model_id)
        .with_context(|| format!("Failed to clear model '{model_id}'"))?;
    Ok(if removed { vec![model_id] } else { Vec::new() })
}

fn init_tracing(cli: &Cli) -> Result<TracingGuard> {
    #[allow(unused_mut)]
    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format);

    #[cfg(feature = "tracing-files")]
    {
        if let Some(path) = &cli.log_file {
            config = config.with_log_file(path);
        }
    }

    config.init()
}

fn show_provider_diagnostics() {
    println!("Backend and Execution Provider Diagnostics");
    println!("------------------------------------------");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    println!("\nExecution Providers:");
    for provider in ExecutionProviderManager::list_all_providers() {
        let status = if provider.available {
            "available"
        } else {
            "not available"
        };
        println!("  {:<14} {:<14} {}", provider.name, status, provider.description);
    }

    println!("\nUsage:");
    println!("  --execution-provider onnx:auto    # CUDA > CoreML > CPU (default)");
    println!("  --execution-provider onnx:cpu     # Force ONNX CPU execution");
    println!("  --execution-provider tract:cpu    # Pure Rust backend");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn cache_with(ids: &[&str]) -> (TempDir, ModelCache) {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        for id in ids {
            let onnx = cache.get_model_path(id).join("onnx");
            fs::create_dir_all(&onnx).unwrap();
            fs::write(onnx.join("model.onnx"), vec![0u8; 2048]).unwrap();
        }
        (temp, cache)
    }

    #[test]
    fn test_clear_cache_by_url_removes_only_that_model() {
        let (_temp, cache) = cache_with(&["briaai--RMBG-1.4", "other--seg"]);

        let removed = clear_cache_models(&cache, Some(DEFAULT_MODEL_URL)).unwrap();
        assert_eq!(removed, vec!["briaai--RMBG-1.4"]);
        assert!(!cache.is_model_cached("briaai--RMBG-1.4"));
        assert!(cache.is_model_cached("other--seg"));

        assert!(clear_cache_models(&cache, Some("missing--model")).unwrap().is_empty());
    }

    #[test]
    fn test_clear_cache_without_target_removes_everything() {
        let (_temp, cache) = cache_with(&["briaai--RMBG-1.4", "other--seg"]);

        let removed = clear_cache_models(&cache, None).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(cache.scan_cached_models().unwrap().is_empty());
    }

    #[test]
    fn test_describe_cached_model() {
        let (_temp, cache) = cache_with(&["briaai--RMBG-1.4"]);
        let models = cache.scan_cached_models().unwrap();

        let line = describe_cached_model(&models[0]);
        assert!(line.contains("briaai--RMBG-1.4"));
        assert!(line.contains("2.0 KB"));
        assert!(line.contains("variants: fp32"));
        assert!(line.contains("default preprocessing"));
    }
}
