//! Shared helpers for model arguments, providers and preprocessing

pub mod models;
pub mod preprocessing;
pub mod providers;

pub use models::ModelSpecParser;
pub use preprocessing::ImagePreprocessor;
pub use providers::{ExecutionProviderManager, ProviderInfo};
