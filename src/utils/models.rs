//! `--model` argument parsing

use crate::{
    cache::ModelCache,
    download::is_url,
    error::{BgRemovalError, Result},
    models::{ModelSource, ModelSpec},
};
use std::path::{Path, PathBuf};

/// Turns a `--model` argument into a [`ModelSpec`]
pub struct ModelSpecParser;

impl ModelSpecParser {
    /// Parse a model argument
    ///
    /// - an existing filesystem path becomes an external model
    /// - a URL becomes the cache id it will be downloaded under
    /// - anything else is taken as a cached model id
    ///
    /// ```rust
    /// use bgremove_api::models::ModelSource;
    /// use bgremove_api::utils::ModelSpecParser;
    ///
    /// let spec = ModelSpecParser::parse("https://huggingface.co/briaai/RMBG-1.4", Some("fp16"));
    /// assert_eq!(spec.source, ModelSource::Downloaded("briaai--RMBG-1.4".to_string()));
    /// assert_eq!(spec.variant.as_deref(), Some("fp16"));
    /// ```
    #[must_use]
    pub fn parse(model_arg: &str, variant: Option<&str>) -> ModelSpec {
        let source = if is_url(model_arg) {
            ModelSource::Downloaded(ModelCache::url_to_model_id(model_arg))
        } else if Path::new(model_arg).exists() {
            ModelSource::External(PathBuf::from(model_arg))
        } else {
            ModelSource::Downloaded(model_arg.to_string())
        };

        ModelSpec {
            source,
            variant: variant.map(str::to_string),
        }
    }

    /// Reject specs that can never resolve
    ///
    /// # Errors
    /// - External path does not exist
    /// - Empty model id or variant, or disallowed characters in either
    pub fn validate(model_spec: &ModelSpec) -> Result<()> {
        let valid_name = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                && !s.starts_with('.')
        };

        match &model_spec.source {
            ModelSource::External(path) if !path.exists() => {
                return Err(BgRemovalError::invalid_config(format!(
                    "External model path does not exist: {}",
                    path.display()
                )));
            },
            ModelSource::Downloaded(model_id) if !valid_name(model_id) => {
                return Err(BgRemovalError::invalid_config(format!(
                    "Invalid model id '{model_id}'"
                )));
            },
            _ => {},
        }

        match model_spec.variant.as_deref() {
            Some(variant) if !valid_name(variant) => Err(BgRemovalError::invalid_config(format!(
                "Invalid model variant '{variant}'"
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_url_and_id() {
        let spec = ModelSpecParser::parse("https://huggingface.co/briaai/RMBG-1.4", None);
        assert_eq!(spec, ModelSpec::default());

        let spec = ModelSpecParser::parse("acme--segmenter", Some("quantized"));
        assert_eq!(spec.source, ModelSource::Downloaded("acme--segmenter".to_string()));
        assert_eq!(spec.variant.as_deref(), Some("quantized"));
    }

    #[test]
    fn test_parse_existing_path() {
        let dir = TempDir::new().unwrap();
        let arg = dir.path().to_string_lossy().into_owned();
        let spec = ModelSpecParser::parse(&arg, None);
        assert_eq!(spec.source, ModelSource::External(dir.path().to_path_buf()));
        assert!(ModelSpecParser::validate(&spec).is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(ModelSpecParser::validate(&ModelSpec::default()).is_ok());

        let spec = ModelSpec {
            source: ModelSource::Downloaded("../etc".to_string()),
            variant: None,
        };
        assert!(ModelSpecParser::validate(&spec).is_err());

        let spec = ModelSpec {
            source: ModelSource::External(PathBuf::from("/no/such/model")),
            variant: None,
        };
        assert!(ModelSpecParser::validate(&spec).is_err());

        let spec = ModelSpec {
            variant: Some(String::new()),
            ..ModelSpec::default()
        };
        assert!(ModelSpecParser::validate(&spec).is_err());
    }
}
