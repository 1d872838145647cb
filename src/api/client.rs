//! The client trait consumed by the query and batching layers.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ApiError;

/// Query-string parameters for a GET request.
///
/// A BTreeMap keeps serialization deterministic, so two requests with the
/// same parameters always produce the same coalescing signature.
pub type Params = BTreeMap<String, Value>;

/// Abstract HTTP client against the timetabling backend.
///
/// Implementations must be thread-safe (Send + Sync); every method performs
/// one HTTP call and returns the parsed JSON body, or an error for non-2xx
/// responses.
#[async_trait]
pub trait ApiClient: Send + Sync + 'static {
  /// Perform a GET request, returning the parsed JSON body.
  async fn get(&self, endpoint: &str, params: Option<&Params>) -> Result<Value, ApiError>;

  /// Perform a POST request with a JSON body.
  async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError>;

  /// Perform a PATCH request with a JSON body.
  async fn patch(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError>;

  /// Perform a DELETE request.
  async fn delete(&self, endpoint: &str) -> Result<(), ApiError>;

  /// Remove entries from this client's own response cache that match
  /// `pattern`. Matching semantics are owned by the implementation.
  fn invalidate_cache(&self, pattern: &str);
}
