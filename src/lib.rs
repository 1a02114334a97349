#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Background Removal API
//!
//! An HTTP service that removes image backgrounds with a pretrained
//! binary-segmentation model (BRIA `RMBG-1.4` by default), running on ONNX
//! Runtime or the pure Rust Tract engine.
//!
//! An upload is decoded, flattened to RGB and segmented; the mask is
//! resampled to the source size with Lanczos3 and written into the alpha
//! channel; the result is returned as PNG.
//!
//! ## Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` providers
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): the `bgremove-api` server binary
//! - `tracing-json`, `tracing-files`: extra log outputs for the binary
//! - `webp-support`: WebP uploads
//!
//! ## Embedding the router
//!
//! ```rust,no_run
//! use bgremove_api::{
//!     create_router, serve, AppState, CompositingPipeline, ModelHost, ModelHostConfig,
//!     ServerConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let host = ModelHost::load(&ModelHostConfig::default())?;
//! let pipeline = CompositingPipeline::new(Arc::new(host));
//!
//! let server_config = ServerConfig::default();
//! let router = create_router(AppState::new(pipeline), &server_config);
//! serve(router, &server_config).await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod host;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use cache::{CachedModelInfo, ModelCache};
pub use config::{
    BackendType, ExecutionProvider, MaskActivation, ModelHostConfig, ModelHostConfigBuilder,
    ServerConfig,
};
pub use download::ModelDownloader;
pub use error::{BgRemovalError, Result};
pub use host::ModelHost;
pub use inference::InferenceBackend;
pub use models::{ModelInfo, ModelManager, ModelSource, ModelSpec, PreprocessingConfig};
pub use pipeline::{composite, CompositingPipeline};
pub use server::{create_router, serve, AppState};
pub use services::ImageIOService;
pub use types::SegmentationMask;
