//! Configuration types for the model host and the HTTP server

use crate::error::{BgRemovalError, Result};
use crate::models::ModelSpec;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used by the model host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, CPU only)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Squashing applied to the raw model output before quantizing the mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MaskActivation {
    /// Apply sigmoid only when the output leaves the `[0, 1]` range
    #[default]
    Auto,
    /// Always treat the output as logits
    Sigmoid,
    /// Output is already a probability map
    Identity,
}

impl std::str::FromStr for MaskActivation {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sigmoid" => Ok(Self::Sigmoid),
            "identity" | "none" => Ok(Self::Identity),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown mask activation: {other}. Supported: auto, sigmoid, identity"
            ))),
        }
    }
}

/// Configuration for loading and running the segmentation model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHostConfig {
    /// Model specification (downloaded or external)
    pub model_spec: ModelSpec,
    /// Inference engine
    pub backend_type: BackendType,
    /// Execution provider for the ONNX backend
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads (0 = auto)
    pub inter_threads: usize,
    /// Activation applied to the model output
    pub activation: MaskActivation,
    /// Stretch the probability map to the full `[0, 1]` range
    pub normalize_range: bool,
}

impl Default for ModelHostConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::Auto,
            intra_threads: 0,
            inter_threads: 0,
            activation: MaskActivation::Auto,
            normalize_range: true,
        }
    }
}

impl ModelHostConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> ModelHostConfigBuilder {
        ModelHostConfigBuilder::new()
    }

    /// Validate backend/provider combinations
    ///
    /// # Errors
    /// - Tract selected with a GPU execution provider
    pub fn validate(&self) -> Result<()> {
        if self.backend_type == BackendType::Tract
            && !matches!(
                self.execution_provider,
                ExecutionProvider::Cpu | ExecutionProvider::Auto
            )
        {
            return Err(BgRemovalError::invalid_config(format!(
                "Tract backend only supports CPU execution, got {}",
                self.execution_provider
            )));
        }
        Ok(())
    }
}

/// Builder for `ModelHostConfig`
pub struct ModelHostConfigBuilder {
    config: ModelHostConfig,
}

impl ModelHostConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ModelHostConfig::default(),
        }
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    #[must_use]
    pub fn activation(mut self, activation: MaskActivation) -> Self {
        self.config.activation = activation;
        self
    }

    #[must_use]
    pub fn normalize_range(mut self, normalize: bool) -> Self {
        self.config.normalize_range = normalize;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Backend/provider combination rejected by [`ModelHostConfig::validate`]
    pub fn build(self) -> Result<ModelHostConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ModelHostConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default upload limit (20 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
    /// Attach a permissive CORS layer
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            enable_cors: false,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// # Errors
    /// - Zero upload limit
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(BgRemovalError::invalid_config(
                "Upload limit must be greater than zero",
            ));
        }
        Ok(())
    }
}
