//! Error types for the API client, query, and batching layers.

use thiserror::Error;

/// Errors produced by the HTTP client layer.
///
/// Clone is required so that one underlying failure can be delivered to every
/// caller of a coalesced request group.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
  /// The server answered with a non-2xx status.
  #[error("server returned {status} for {endpoint}: {message}")]
  Status {
    endpoint: String,
    status: u16,
    message: String,
  },

  /// The request never produced a response (DNS, connect, timeout, ...).
  #[error("request to {endpoint} failed: {message}")]
  Transport { endpoint: String, message: String },

  /// The response body could not be decoded as the expected JSON shape.
  #[error("invalid response from {endpoint}: {message}")]
  Decode { endpoint: String, message: String },

  /// A batched request was dropped before its window completed.
  #[error("batched request was dropped before completion")]
  BatchDropped,
}

/// Errors produced by a query fetch operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  /// The request was cancelled because a newer request superseded it.
  /// Never surfaced to the caller; swallowed by the query state machine.
  #[error("request was superseded by a newer request")]
  Aborted,

  /// Any other failure, carried as a readable message.
  #[error("{0}")]
  Operation(String),
}

impl From<ApiError> for FetchError {
  fn from(err: ApiError) -> Self {
    FetchError::Operation(err.to_string())
  }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {0}")]
  NotFound(String),

  #[error(
    "no configuration file found. Create one at ~/.config/horaires/config.yaml\n\
     See config.example.yaml for the format."
  )]
  Missing,

  #[error("failed to read config file {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("invalid API base URL '{url}': {message}")]
  InvalidBaseUrl { url: String, message: String },

  #[error("API token not found. Set HORAIRES_API_TOKEN or API_TOKEN environment variable.")]
  MissingToken,

  #[error("failed to build HTTP client: {0}")]
  HttpClient(String),
}
