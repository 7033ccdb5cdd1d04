//! Encoder configuration

use crate::errors::{EncoderError, Result};
use crate::expander::{CategorySource, UnknownPolicy};
use crate::walker::DEFAULT_LABEL_PRECISION;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Default leaf name prefix
pub const DEFAULT_PREFIX: &str = "gbr";

/// Settings of a [`crate::GradientBoostingEncoder`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Prefix of every leaf name (`<prefix>_<tree>_<node>`)
    pub prefix: String,
    /// Human-readable input feature names; `feature_<i>` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    /// Process trees on the rayon thread pool
    pub parallel: bool,
    /// Where indicator categories come from
    pub categories: CategorySource,
    /// Unknown leaves at transform time
    pub handle_unknown: UnknownPolicy,
    /// Decimals used for thresholds in decision-path labels
    pub label_precision: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            feature_names: None,
            parallel: false,
            categories: CategorySource::Vocabulary,
            handle_unknown: UnknownPolicy::Ignore,
            label_precision: DEFAULT_LABEL_PRECISION,
        }
    }
}

impl EncoderConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_feature_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_categories(mut self, categories: CategorySource) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_handle_unknown(mut self, policy: UnknownPolicy) -> Self {
        self.handle_unknown = policy;
        self
    }

    pub fn with_label_precision(mut self, precision: usize) -> Self {
        self.label_precision = precision;
        self
    }

    /// Validate configuration
    ///
    /// Hard errors are returned as `Err`; questionable but usable settings
    /// come back as warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if let Some(names) = &self.feature_names {
            if let Some(i) = names.iter().position(|n| n.trim().is_empty()) {
                return Err(EncoderError::Configuration(format!(
                    "Feature name {i} is empty"
                )));
            }
        }

        if self.prefix.is_empty() {
            warnings.push("Prefix is empty, leaf names will start with '_'".to_string());
        } else if self.prefix.contains('_') {
            warnings.push(format!(
                "Prefix {:?} contains '_', leaf names cannot be split back into parts",
                self.prefix
            ));
        }

        if self.label_precision > 15 {
            warnings.push(format!(
                "Label precision {} exceeds f64 accuracy",
                self.label_precision
            ));
        }

        if !warnings.is_empty() {
            warn!("Configuration validation warnings: {:?}", warnings);
        }

        Ok(warnings)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: EncoderConfig = toml::from_str(&content).map_err(|e| {
            EncoderError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        info!("Configuration loaded from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| EncoderError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EncoderConfig::default();
        assert_eq!(config.prefix, "gbr");
        assert!(config.feature_names.is_none());
        assert!(!config.parallel);
        assert_eq!(config.categories, CategorySource::Vocabulary);
        assert_eq!(config.handle_unknown, UnknownPolicy::Ignore);
        assert_eq!(config.label_precision, 2);
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_validation_warnings() {
        let warnings = EncoderConfig::default()
            .with_prefix("my_model")
            .validate()
            .unwrap();
        assert_eq!(warnings.len(), 1);

        let warnings = EncoderConfig::default().with_prefix("").validate().unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_empty_feature_name_rejected() {
        let config = EncoderConfig::default().with_feature_names(["age", " "]);
        assert!(matches!(
            config.validate(),
            Err(EncoderError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("encoder.toml");

        let config = EncoderConfig::default()
            .with_prefix("tree")
            .with_feature_names(["age", "income"])
            .with_parallel(true)
            .with_categories(CategorySource::Observed)
            .with_handle_unknown(UnknownPolicy::Error)
            .with_label_precision(3);
        config.save_to_file(&path).unwrap();

        let loaded = EncoderConfig::load_from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("partial.toml");
        std::fs::write(&path, "prefix = \"leaf\"\ncategories = \"observed\"\n").unwrap();

        let loaded = EncoderConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.prefix, "leaf");
        assert_eq!(loaded.categories, CategorySource::Observed);
        assert_eq!(loaded.handle_unknown, UnknownPolicy::Ignore);
        assert!(loaded.feature_names.is_none());
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "prefix = [").unwrap();
        assert!(matches!(
            EncoderConfig::load_from_file(&path),
            Err(EncoderError::Config(_))
        ));
    }
}
