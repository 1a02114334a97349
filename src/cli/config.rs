//! Conversion of command-line arguments into library configuration

use crate::cli::main_impl::Cli;
use crate::{
    config::{ModelHostConfig, ServerConfig},
    models::ModelSpec,
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the model host configuration for an already resolved model
    pub(crate) fn model_host_config(cli: &Cli, model_spec: ModelSpec) -> Result<ModelHostConfig> {
        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        ModelHostConfig::builder()
            .model_spec(model_spec)
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            // Same count for intra and inter; the backend derives the inter share
            .intra_threads(cli.threads)
            .inter_threads(cli.threads)
            .activation(cli.activation)
            .normalize_range(!cli.no_range_normalize)
            .build()
            .context("Invalid model configuration")
    }

    pub(crate) fn server_config(cli: &Cli) -> Result<ServerConfig> {
        let max_upload_bytes = cli
            .max_upload_mb
            .checked_mul(1024 * 1024)
            .context("Upload limit is too large")?;

        let config = ServerConfig {
            host: cli.host,
            port: cli.port,
            max_upload_bytes,
            enable_cors: cli.cors,
        };
        config.validate().context("Invalid server configuration")?;
        Ok(config)
    }

    /// Check arguments that can be rejected before touching the network
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
            .context("Invalid execution provider format")?;
        Self::server_config(cli)?;
        Ok(())
    }
}
