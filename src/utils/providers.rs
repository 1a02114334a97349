//! Execution provider parsing, listing and startup resolution

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{BgRemovalError, Result},
};

/// Information about an execution provider
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

/// Utility for parsing and managing execution providers
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse an execution provider string in `backend:provider` form
    ///
    /// A bare backend name selects its default provider.
    ///
    /// ```rust
    /// use bgremove_api::config::{BackendType, ExecutionProvider};
    /// use bgremove_api::utils::ExecutionProviderManager;
    ///
    /// let (backend, provider) =
    ///     ExecutionProviderManager::parse_provider_string("onnx:auto").unwrap();
    /// assert_eq!((backend, provider), (BackendType::Onnx, ExecutionProvider::Auto));
    /// ```
    ///
    /// # Errors
    /// - Unknown backend or provider
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let normalized = provider_str.trim().to_ascii_lowercase();
        let Some((backend, provider)) = normalized.split_once(':') else {
            return match normalized.as_str() {
                "onnx" => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
                "tract" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(BgRemovalError::invalid_config(format!(
                    "Invalid provider '{provider_str}'. \
                     Use backend:provider (e.g., onnx:auto, tract:cpu)"
                ))),
            };
        };

        match backend {
            "onnx" => {
                let execution_provider = match provider {
                    "auto" => ExecutionProvider::Auto,
                    "cpu" => ExecutionProvider::Cpu,
                    "cuda" => ExecutionProvider::Cuda,
                    "coreml" => ExecutionProvider::CoreMl,
                    _ => {
                        return Err(BgRemovalError::invalid_config(format!(
                            "Unknown ONNX provider: {provider}. Supported: auto, cpu, cuda, coreml"
                        )));
                    },
                };
                Ok((BackendType::Onnx, execution_provider))
            },
            "tract" => match provider {
                "cpu" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(BgRemovalError::invalid_config(format!(
                    "Unknown Tract provider: {provider}. Tract only supports 'cpu'"
                ))),
            },
            _ => Err(BgRemovalError::invalid_config(format!(
                "Unknown backend: {backend}. Supported backends: onnx, tract"
            ))),
        }
    }

    /// Map a requested provider to the one the session will actually use
    ///
    /// `Auto` picks CUDA, then `CoreML`, then CPU. An explicitly requested
    /// provider that is unavailable falls back to CPU with a warning. Tract
    /// always runs on CPU.
    #[must_use]
    pub fn resolve(backend_type: BackendType, requested: ExecutionProvider) -> ExecutionProvider {
        if backend_type == BackendType::Tract {
            return ExecutionProvider::Cpu;
        }
        Self::resolve_with(requested, Self::onnx_provider_available)
    }

    fn resolve_with(
        requested: ExecutionProvider,
        available: impl Fn(ExecutionProvider) -> bool,
    ) -> ExecutionProvider {
        match requested {
            ExecutionProvider::Cpu => ExecutionProvider::Cpu,
            ExecutionProvider::Auto => {
                let chosen = [ExecutionProvider::Cuda, ExecutionProvider::CoreMl]
                    .into_iter()
                    .find(|p| available(*p))
                    .unwrap_or(ExecutionProvider::Cpu);
                log::debug!("Auto provider selection resolved to {}", chosen);
                chosen
            },
            explicit => {
                if available(explicit) {
                    explicit
                } else {
                    log::warn!(
                        "{} execution provider requested but not available, falling back to CPU",
                        explicit
                    );
                    ExecutionProvider::Cpu
                }
            },
        }
    }

    #[cfg(feature = "onnx")]
    fn onnx_provider_available(provider: ExecutionProvider) -> bool {
        crate::backends::OnnxBackend::provider_available(provider)
    }

    #[cfg(not(feature = "onnx"))]
    fn onnx_provider_available(provider: ExecutionProvider) -> bool {
        provider == ExecutionProvider::Cpu
    }

    /// All provider combinations with their availability on this machine
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        let onnx: Vec<(String, bool, String)> = crate::backends::OnnxBackend::list_providers();
        #[cfg(not(feature = "onnx"))]
        let onnx: Vec<(String, bool, String)> = Vec::new();

        let onnx_available = |name: &str| {
            onnx.iter()
                .any(|(n, available, _)| n.eq_ignore_ascii_case(name) && *available)
        };
        let suffix = if cfg!(feature = "onnx") {
            ""
        } else {
            " (feature disabled)"
        };

        for (provider, description) in [
            (ExecutionProvider::Auto, "ONNX Runtime with auto-selected provider"),
            (ExecutionProvider::Cpu, "ONNX Runtime CPU execution"),
            (ExecutionProvider::Cuda, "ONNX Runtime CUDA GPU acceleration"),
            (ExecutionProvider::CoreMl, "ONNX Runtime CoreML (Apple Silicon) acceleration"),
        ] {
            let available = match provider {
                ExecutionProvider::Auto => onnx_available("cpu"),
                other => onnx_available(&other.to_string()),
            };
            providers.push(ProviderInfo {
                name: Self::provider_to_string(BackendType::Onnx, provider),
                backend_type: BackendType::Onnx,
                execution_provider: provider,
                available,
                description: format!("{description}{suffix}"),
            });
        }

        #[cfg(feature = "tract")]
        {
            for (name, available, description) in crate::backends::TractBackend::list_providers() {
                providers.push(ProviderInfo {
                    name: format!("tract:{}", name.to_lowercase()),
                    backend_type: BackendType::Tract,
                    execution_provider: ExecutionProvider::Cpu,
                    available,
                    description,
                });
            }
        }

        #[cfg(not(feature = "tract"))]
        {
            providers.push(ProviderInfo {
                name: "tract:cpu".to_string(),
                backend_type: BackendType::Tract,
                execution_provider: ExecutionProvider::Cpu,
                available: false,
                description: "Pure Rust CPU inference via Tract (feature disabled)".to_string(),
            });
        }

        providers
    }

    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_onnx_providers() {
        for (input, expected) in [
            ("onnx:auto", ExecutionProvider::Auto),
            ("onnx:cpu", ExecutionProvider::Cpu),
            ("onnx:cuda", ExecutionProvider::Cuda),
            ("ONNX:CoreML", ExecutionProvider::CoreMl),
        ] {
            let (backend, provider) =
                ExecutionProviderManager::parse_provider_string(input).unwrap();
            assert_eq!(backend, BackendType::Onnx);
            assert_eq!(provider, expected, "{input}");
        }
    }

    #[test]
    fn test_parse_tract_and_bare_names() {
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("tract:cpu").unwrap(),
            (BackendType::Tract, ExecutionProvider::Cpu)
        );
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("tract").unwrap(),
            (BackendType::Tract, ExecutionProvider::Cpu)
        );
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("onnx").unwrap(),
            (BackendType::Onnx, ExecutionProvider::Auto)
        );
        assert!(ExecutionProviderManager::parse_provider_string("tract:cuda").is_err());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ExecutionProviderManager::parse_provider_string("invalid").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("onnx:tpu").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("mock:cpu").is_err());
    }

    #[test]
    fn test_resolve_auto_prefers_gpu() {
        let all = |_: ExecutionProvider| true;
        assert_eq!(
            ExecutionProviderManager::resolve_with(ExecutionProvider::Auto, all),
            ExecutionProvider::Cuda
        );

        let coreml_only = |p: ExecutionProvider| p == ExecutionProvider::CoreMl;
        assert_eq!(
            ExecutionProviderManager::resolve_with(ExecutionProvider::Auto, coreml_only),
            ExecutionProvider::CoreMl
        );

        let none = |_: ExecutionProvider| false;
        assert_eq!(
            ExecutionProviderManager::resolve_with(ExecutionProvider::Auto, none),
            ExecutionProvider::Cpu
        );
    }

    #[test]
    fn test_resolve_unavailable_falls_back_to_cpu() {
        let none = |_: ExecutionProvider| false;
        assert_eq!(
            ExecutionProviderManager::resolve_with(ExecutionProvider::Cuda, none),
            ExecutionProvider::Cpu
        );
        assert_eq!(
            ExecutionProviderManager::resolve(BackendType::Tract, ExecutionProvider::Auto),
            ExecutionProvider::Cpu
        );
        assert_eq!(
            ExecutionProviderManager::resolve(BackendType::Onnx, ExecutionProvider::Cpu),
            ExecutionProvider::Cpu
        );
    }

    #[test]
    fn test_list_all_providers() {
        let providers = ExecutionProviderManager::list_all_providers();
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"onnx:auto"));
        assert!(names.contains(&"onnx:coreml"));
        assert!(names.contains(&"tract:cpu"));
        assert_eq!(
            ExecutionProviderManager::provider_to_string(
                BackendType::Tract,
                ExecutionProvider::Cpu
            ),
            "tract:cpu"
        );
    }
}
