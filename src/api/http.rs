//! Reqwest-backed implementation of [`ApiClient`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use url::Url;

use crate::config::Config;
use crate::error::{ApiError, ConfigError};

use super::client::{ApiClient, Params};

/// A GET response kept in the client's own cache.
struct CachedResponse {
  body: Value,
  fetched_at: Instant,
}

/// HTTP client for the timetabling backend.
///
/// GET responses are cached in-memory for a configurable TTL, keyed by the
/// full request URL. `invalidate_cache` drops every entry whose URL contains
/// the given pattern as a substring; mutating verbs bypass the cache
/// entirely.
pub struct HttpClient {
  http: reqwest::Client,
  base_url: String,
  token: Option<String>,
  cache: Mutex<HashMap<String, CachedResponse>>,
  response_ttl: Duration,
}

impl HttpClient {
  /// Create a client from configuration.
  ///
  /// The bearer token is optional; when the environment does not provide one
  /// the client sends unauthenticated requests.
  pub fn new(config: &Config) -> Result<Self, ConfigError> {
    let base_url = config.api.base_url.trim_end_matches('/').to_string();

    // Validate the base URL up front so request-time failures are real
    // transport errors, not configuration mistakes.
    Url::parse(&base_url).map_err(|e| ConfigError::InvalidBaseUrl {
      url: base_url.clone(),
      message: e.to_string(),
    })?;

    let http = reqwest::Client::builder()
      .timeout(config.api.timeout())
      .build()
      .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

    Ok(Self {
      http,
      base_url,
      token: Config::get_api_token().ok(),
      cache: Mutex::new(HashMap::new()),
      response_ttl: config.api.response_ttl(),
    })
  }

  fn cache_guard(&self) -> MutexGuard<'_, HashMap<String, CachedResponse>> {
    self.cache.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Build the full request URL from an endpoint path and query parameters.
  fn build_url(&self, endpoint: &str, params: Option<&Params>) -> Result<Url, ApiError> {
    let full = format!("{}{}", self.base_url, endpoint);
    let mut url = Url::parse(&full).map_err(|e| ApiError::Transport {
      endpoint: endpoint.to_string(),
      message: format!("invalid URL {}: {}", full, e),
    })?;

    if let Some(params) = params {
      let mut pairs = url.query_pairs_mut();
      for (key, value) in params {
        pairs.append_pair(key, &render_param(value));
      }
    }

    Ok(url)
  }

  fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn read_json(endpoint: &str, response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      return Err(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
      });
    }

    response.json().await.map_err(|e| ApiError::Decode {
      endpoint: endpoint.to_string(),
      message: e.to_string(),
    })
  }

  fn transport_error(endpoint: &str, err: reqwest::Error) -> ApiError {
    ApiError::Transport {
      endpoint: endpoint.to_string(),
      message: err.to_string(),
    }
  }

  /// Number of cached GET responses. Exposed for diagnostics.
  pub fn cached_responses(&self) -> usize {
    self.cache_guard().len()
  }

  #[cfg(test)]
  fn insert_cached(&self, url: &str, body: Value) {
    self.cache_guard().insert(
      url.to_string(),
      CachedResponse {
        body,
        fetched_at: Instant::now(),
      },
    );
  }
}

#[async_trait]
impl ApiClient for HttpClient {
  async fn get(&self, endpoint: &str, params: Option<&Params>) -> Result<Value, ApiError> {
    let url = self.build_url(endpoint, params)?;
    let key = url.to_string();

    if let Some(cached) = self.cache_guard().get(&key) {
      if cached.fetched_at.elapsed() < self.response_ttl {
        tracing::debug!(url = %key, "response cache hit");
        return Ok(cached.body.clone());
      }
    }

    let response = self
      .authorized(self.http.get(url))
      .send()
      .await
      .map_err(|e| Self::transport_error(endpoint, e))?;

    let body = Self::read_json(endpoint, response).await?;

    self.cache_guard().insert(
      key,
      CachedResponse {
        body: body.clone(),
        fetched_at: Instant::now(),
      },
    );

    Ok(body)
  }

  async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
    let url = self.build_url(endpoint, None)?;

    let response = self
      .authorized(self.http.post(url))
      .json(body)
      .send()
      .await
      .map_err(|e| Self::transport_error(endpoint, e))?;

    Self::read_json(endpoint, response).await
  }

  async fn patch(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
    let url = self.build_url(endpoint, None)?;

    let response = self
      .authorized(self.http.patch(url))
      .json(body)
      .send()
      .await
      .map_err(|e| Self::transport_error(endpoint, e))?;

    Self::read_json(endpoint, response).await
  }

  async fn delete(&self, endpoint: &str) -> Result<(), ApiError> {
    let url = self.build_url(endpoint, None)?;

    let response = self
      .authorized(self.http.delete(url))
      .send()
      .await
      .map_err(|e| Self::transport_error(endpoint, e))?;

    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      return Err(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
      });
    }

    Ok(())
  }

  fn invalidate_cache(&self, pattern: &str) {
    let mut cache = self.cache_guard();
    let before = cache.len();
    cache.retain(|url, _| !url.contains(pattern));
    tracing::debug!(
      pattern,
      evicted = before - cache.len(),
      "invalidated cached responses"
    );
  }
}

/// Render a JSON value as a query-string parameter.
fn render_param(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn test_client() -> HttpClient {
    let config: Config =
      serde_yaml::from_str("api:\n  base_url: http://localhost:8000/api/\n").unwrap();
    HttpClient::new(&config).unwrap()
  }

  #[test]
  fn builds_urls_with_sorted_params() {
    let client = test_client();
    let params = Params::from([
      ("page".to_string(), json!(2)),
      ("search".to_string(), json!("amphi a")),
      ("has_projector".to_string(), json!(true)),
    ]);

    let url = client.build_url("/rooms/rooms/", Some(&params)).unwrap();
    assert_eq!(
      url.as_str(),
      "http://localhost:8000/api/rooms/rooms/?has_projector=true&page=2&search=amphi+a"
    );
  }

  #[test]
  fn builds_urls_without_params() {
    let client = test_client();
    let url = client.build_url("/courses/departments/", None).unwrap();
    assert_eq!(url.as_str(), "http://localhost:8000/api/courses/departments/");
  }

  #[test]
  fn invalidate_matches_substring() {
    let client = test_client();
    client.insert_cached("http://localhost:8000/api/rooms/rooms/?page=1", json!({}));
    client.insert_cached("http://localhost:8000/api/rooms/rooms/?page=2", json!({}));
    client.insert_cached(
      "http://localhost:8000/api/courses/departments/",
      json!({}),
    );

    client.invalidate_cache("/rooms/rooms/");

    assert_eq!(client.cached_responses(), 1);
  }

  #[test]
  fn rejects_invalid_base_url() {
    let config: Config = serde_yaml::from_str("api:\n  base_url: not a url\n").unwrap();
    assert!(matches!(
      HttpClient::new(&config),
      Err(ConfigError::InvalidBaseUrl { .. })
    ));
  }
}
