//! Pipeline configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional YAML
//! file, environment variables, then command-line flags (applied in main).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use climate_indices::IndicesConfig;
use serde::{Deserialize, Serialize};
use zarr_store::StoreConfig;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input stores holding daily `t2m` and `d2m` in Kelvin.
    pub inputs: Vec<PathBuf>,

    /// Store receiving the daily fields and indices.
    pub store: PathBuf,

    /// Directory receiving one trend store per variable.
    pub trends_dir: PathBuf,

    /// Index and trend parameters.
    pub indices: IndicesConfig,

    /// On-disk encoding.
    pub storage: StoreConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            store: PathBuf::from("outputs/indices.zarr"),
            trends_dir: PathBuf::from("outputs/trends"),
            indices: IndicesConfig::default(),
            storage: StoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file. Missing keys take defaults.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Defaults or the YAML file, with environment overrides applied.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_yaml(p)?,
            None => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// Apply environment variable overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("PIPELINE_INPUTS") {
            let inputs: Vec<PathBuf> = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
            if !inputs.is_empty() {
                self.inputs = inputs;
            }
        }

        if let Ok(val) = std::env::var("INDICES_STORE") {
            self.store = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TRENDS_DIR") {
            self.trends_dir = PathBuf::from(val);
        }

        self.indices = self.indices.with_env_overrides();
        self.storage = self.storage.with_env_overrides();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.indices.validate()?;
        self.storage.validate()?;

        if self.store.as_os_str().is_empty() {
            return Err("store path must not be empty".to_string());
        }

        if self.indices.trend_variables.is_empty() {
            return Err("trend_variables must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.store, PathBuf::from("outputs/indices.zarr"));
        assert_eq!(config.trends_dir, PathBuf::from("outputs/trends"));
        assert!(config.inputs.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(
            &path,
            "inputs: [era5/t2m.zarr, era5/d2m.zarr]\n\
             store: /data/indices.zarr\n\
             indices:\n  rolling_window: 7\n  trend_variables: [RH90p]\n\
             storage:\n  spatial_chunk: 50\n",
        )
        .unwrap();

        let config = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.store, PathBuf::from("/data/indices.zarr"));
        assert_eq!(config.trends_dir, PathBuf::from("outputs/trends"));
        assert_eq!(config.indices.rolling_window, 7);
        assert_eq!(config.indices.trend_variables, vec!["RH90p"]);
        assert_eq!(config.indices.climatology_percentile, 90.0);
        assert_eq!(config.storage.spatial_chunk, 50);
    }

    #[test]
    fn test_missing_config_file() {
        assert!(PipelineConfig::from_yaml("/nonexistent/pipeline.yaml").is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = PipelineConfig::default();
        config.indices.trend_variables.clear();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.storage.spatial_chunk = 0;
        assert!(config.validate().is_err());
    }
}
