use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Backend base URL, including the API prefix (e.g. "http://localhost:8000/api")
  pub base_url: String,
  /// Per-request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// How long the HTTP client keeps GET responses in its own cache
  #[serde(default = "default_response_ttl_secs")]
  pub response_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Age after which a query cache entry is considered stale
  #[serde(default = "default_stale_secs")]
  pub stale_secs: u64,
  /// Age after which an explicit sweep may evict entries
  #[serde(default = "default_cache_secs")]
  pub cache_secs: u64,
  /// Batching window for coalesced GET requests
  #[serde(default = "default_batch_delay_ms")]
  pub batch_delay_ms: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_secs: default_stale_secs(),
      cache_secs: default_cache_secs(),
      batch_delay_ms: default_batch_delay_ms(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_response_ttl_secs() -> u64 {
  60
}

fn default_stale_secs() -> u64 {
  5 * 60
}

fn default_cache_secs() -> u64 {
  10 * 60
}

fn default_batch_delay_ms() -> u64 {
  50
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./horaires.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/horaires/config.yaml
  /// 4. ~/.config/horaires/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(ConfigError::NotFound(p.display().to_string()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(ConfigError::Missing),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("horaires.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("horaires").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
      path: path.display().to_string(),
      source: e,
    })?;

    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
      path: path.display().to_string(),
      source: e,
    })?;

    Ok(config)
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks HORAIRES_API_TOKEN first, then API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String, ConfigError> {
    std::env::var("HORAIRES_API_TOKEN")
      .or_else(|_| std::env::var("API_TOKEN"))
      .map_err(|_| ConfigError::MissingToken)
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn response_ttl(&self) -> Duration {
    Duration::from_secs(self.response_ttl_secs)
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> Duration {
    Duration::from_secs(self.stale_secs)
  }

  pub fn cache_time(&self) -> Duration {
    Duration::from_secs(self.cache_secs)
  }

  pub fn batch_delay(&self) -> Duration {
    Duration::from_millis(self.batch_delay_ms)
  }
}
