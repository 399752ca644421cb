//! Application configuration read from `edgelab.toml`.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Example:
//!
//! ```toml
//! data_dir = "data"
//! store_dir = "snapshots"
//! partial = "allow_partial"
//!
//! [provider]
//! kind = "synthetic"
//! seed = 42
//!
//! [retry]
//! max_attempts = 5
//! backoff_ms = 500
//!
//! [cache]
//! persist = true
//!
//! [parameters]
//! entry_threshold = 10.0
//! stop_loss = { method = "atr", multiplier = 2.0 }
//! ```

use crate::snapshot_builder::PartialPolicy;
use edgelab_core::data::{CsvProvider, MarketDataProvider, RetryPolicy, SyntheticProvider};
use edgelab_core::params::{CalculationParameters, ParameterOverrides, ParamsError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "edgelab.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid default parameters: {0}")]
    Parameters(#[from] ParamsError),
}

/// Market-data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// `{data_dir}/{SYMBOL}.csv`
    Csv,
    /// Deterministic random walks; for development and tests.
    Synthetic {
        #[serde(default = "default_seed")]
        seed: u64,
    },
}

fn default_seed() -> u64 {
    42
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::Csv
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Write computed metrics through to disk.
    pub persist: bool,
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persist: false,
            dir: PathBuf::from("metrics_cache"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub store_dir: PathBuf,
    pub provider: ProviderConfig,
    pub retry: RetryPolicy,
    pub partial: PartialPolicy,
    pub cache: CacheConfig,
    /// Applied on top of the built-in parameter defaults.
    pub parameters: ParameterOverrides,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            store_dir: PathBuf::from("snapshots"),
            provider: ProviderConfig::default(),
            retry: RetryPolicy::default(),
            partial: PartialPolicy::default(),
            cache: CacheConfig::default(),
            parameters: ParameterOverrides::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.default_parameters()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load `path` if given, else `edgelab.toml` if present, else defaults.
    ///
    /// An explicitly given path must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.is_file() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Built-in defaults with the configured overrides applied and validated.
    pub fn default_parameters(&self) -> Result<CalculationParameters, ParamsError> {
        CalculationParameters::default().with_overrides(&self.parameters)
    }

    pub fn build_provider(&self) -> Arc<dyn MarketDataProvider> {
        match &self.provider {
            ProviderConfig::Csv => Arc::new(CsvProvider::new(&self.data_dir)),
            ProviderConfig::Synthetic { seed } => Arc::new(SyntheticProvider::new(*seed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgelab_core::params::StopLossMethod;

    fn parse(s: &str) -> Result<AppConfig, ConfigError> {
        AppConfig::from_toml_str(s, Path::new("test.toml"))
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(parse("").unwrap(), AppConfig::default());
    }

    #[test]
    fn full_file_parses() {
        let cfg = parse(
            r#"
            data_dir = "/var/data"
            store_dir = "/var/snapshots"
            partial = "allow_partial"

            [provider]
            kind = "synthetic"
            seed = 7

            [retry]
            max_attempts = 5

            [cache]
            persist = true

            [parameters]
            entry_threshold = 10.0
            stop_loss = { method = "atr", multiplier = 2.0 }
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/var/data"));
        assert_eq!(cfg.provider, ProviderConfig::Synthetic { seed: 7 });
        assert_eq!(cfg.partial, PartialPolicy::AllowPartial);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.backoff_ms, RetryPolicy::default().backoff_ms);
        assert!(cfg.cache.persist);
        assert_eq!(cfg.cache.dir, PathBuf::from("metrics_cache"));

        let params = cfg.default_parameters().unwrap();
        assert_eq!(params.thresholds.entry, 10.0);
        assert_eq!(params.stop_loss, StopLossMethod::Atr { multiplier: 2.0 });
    }

    #[test]
    fn synthetic_seed_defaults() {
        let cfg = parse("[provider]\nkind = \"synthetic\"\n").unwrap();
        assert_eq!(cfg.provider, ProviderConfig::Synthetic { seed: 42 });
    }

    #[test]
    fn unknown_parameter_rejected() {
        let err = parse("[parameters]\nentry_treshold = 10.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_parameter_values_rejected() {
        let err = parse("[parameters]\nentry_threshold = 60.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parameters(_)));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = AppConfig::load_or_default(Some(Path::new("/definitely/not/here.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
