//! Mapper configuration
//!
//! Loaded from TOML; every section has defaults so an empty file is valid.

pub mod defaults;

use crate::error::{MapperError, MapperResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Top-level configuration for the mapping layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub versioning: VersionCheck,
    pub paging: PagingConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

/// Cursor pagination limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Page size used when the caller passes 0
    pub default_page_size: u32,
    /// Upper bound; larger requests are clamped
    pub max_page_size: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: defaults::DEFAULT_PAGE_SIZE,
            max_page_size: defaults::DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl PagingConfig {
    /// Resolve a caller-requested page size against the configured limits
    pub fn effective_page_size(&self, requested: u32) -> u32 {
        match requested {
            0 => self.default_page_size,
            n => n.min(self.max_page_size),
        }
    }
}

/// Batch writer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Buffer size at which the stream writer flushes
    pub batch_size: usize,
    pub dispatch: BatchDispatch,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::DEFAULT_BATCH_SIZE,
            dispatch: BatchDispatch::default(),
        }
    }
}

/// How a batch of statements reaches the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchDispatch {
    /// One dispatch for the whole batch; all indices share its outcome
    #[default]
    Combined,
    /// One dispatch per statement; outcomes tracked per index
    Individual,
}

/// Handling of the optimistic version check after an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionCheck {
    /// Return the store's affected-row report as is
    #[default]
    Trust,
    /// Read the row back and fail with `VersionConflict` on mismatch
    VerifyRead,
}

/// Logging output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Configuration loading and validation
impl MapperConfig {
    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> MapperResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MapperError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded mapper configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> MapperResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &Path) -> MapperResult<()> {
        std::fs::write(path, self.to_toml_string()?).map_err(|e| {
            MapperError::Configuration(format!("cannot write {}: {e}", path.display()))
        })
    }

    pub fn to_toml_string(&self) -> MapperResult<String> {
        toml::to_string_pretty(self).map_err(|e| MapperError::Configuration(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> MapperResult<()> {
        if self.paging.default_page_size == 0 {
            return Err(MapperError::Configuration(
                "paging.default_page_size must be positive".to_string(),
            ));
        }
        if self.paging.max_page_size == 0 {
            return Err(MapperError::Configuration(
                "paging.max_page_size must be positive".to_string(),
            ));
        }
        if self.paging.default_page_size > self.paging.max_page_size {
            return Err(MapperError::Configuration(format!(
                "paging.default_page_size ({}) exceeds paging.max_page_size ({})",
                self.paging.default_page_size, self.paging.max_page_size
            )));
        }
        if self.batch.batch_size == 0 {
            return Err(MapperError::Configuration(
                "batch.batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = MapperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.paging.default_page_size, defaults::DEFAULT_PAGE_SIZE);
        assert_eq!(config.versioning, VersionCheck::Trust);
    }

    #[test]
    fn test_effective_page_size() {
        let paging = PagingConfig {
            default_page_size: 20,
            max_page_size: 100,
        };
        assert_eq!(paging.effective_page_size(0), 20);
        assert_eq!(paging.effective_page_size(50), 50);
        assert_eq!(paging.effective_page_size(5000), 100);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = MapperConfig::from_toml_str(
            r#"
            versioning = "verify_read"

            [batch]
            dispatch = "individual"
            "#,
        )
        .unwrap();
        assert_eq!(config.versioning, VersionCheck::VerifyRead);
        assert_eq!(config.batch.dispatch, BatchDispatch::Individual);
        assert_eq!(config.batch.batch_size, defaults::DEFAULT_BATCH_SIZE);
        assert_eq!(config.paging, PagingConfig::default());
    }

    #[test]
    fn test_validation_rejects_inverted_page_sizes() {
        let err = MapperConfig::from_toml_str(
            r#"
            [paging]
            default_page_size = 500
            max_page_size = 100
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, MapperError::Configuration(_)));
    }

    #[test]
    fn test_config_serialization() {
        let config = MapperConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let deserialized = MapperConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }
}
