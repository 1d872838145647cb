//! Short-window request batching over an [`ApiClient`].
//!
//! Independent call sites frequently ask for the same resource within a few
//! milliseconds of each other (a dashboard rendering several panels of the
//! same page). [`RequestCoalescer`] merges identical GET requests issued
//! inside one batching window into a single network call and fans the shared
//! result out to every caller.

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::api::{ApiClient, Paginated, Params};
use crate::error::ApiError;

/// Default batching window.
const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(50);

/// A caller waiting inside the current batching window.
struct BatchItem {
  endpoint: String,
  params: Option<Params>,
  tx: oneshot::Sender<Result<Arc<Value>, ApiError>>,
}

/// Options for [`RequestCoalescer::get_optimized_list`].
#[derive(Debug, Clone)]
pub struct ListOptions {
  /// 1-based page number
  pub page: u64,
  pub page_size: u64,
  /// Extra filter parameters merged into the query string
  pub filters: Params,
  /// Speculatively fetch the next page when one exists
  pub prefetch_next: bool,
}

impl Default for ListOptions {
  fn default() -> Self {
    Self {
      page: 1,
      page_size: 20,
      filters: Params::new(),
      prefetch_next: true,
    }
  }
}

/// A resource to warm up via [`RequestCoalescer::prefetch`].
#[derive(Debug, Clone)]
pub struct PrefetchRequest {
  pub endpoint: String,
  pub params: Option<Params>,
}

/// Batching layer that coalesces concurrent identical GET requests.
///
/// Window policy: the window opens when the first request lands in an empty
/// queue and closes after a fixed delay, no matter how many requests arrive
/// in between. (A trailing-debounce window that restarts on every arrival
/// would let a steady request stream postpone the flush indefinitely.)
///
/// Coalesced callers receive clones of one `Arc<Value>`, so the shared
/// response is read-only by construction.
pub struct RequestCoalescer<C: ApiClient> {
  client: Arc<C>,
  queue: Arc<Mutex<Vec<BatchItem>>>,
  batch_delay: Duration,
}

impl<C: ApiClient> RequestCoalescer<C> {
  pub fn new(client: C) -> Self {
    Self {
      client: Arc::new(client),
      queue: Arc::new(Mutex::new(Vec::new())),
      batch_delay: DEFAULT_BATCH_DELAY,
    }
  }

  /// Set the batching window (e.g. from `CacheConfig::batch_delay`).
  pub fn with_batch_delay(mut self, delay: Duration) -> Self {
    self.batch_delay = delay;
    self
  }

  /// Direct access to the underlying client, for non-batched calls.
  pub fn client(&self) -> &C {
    &self.client
  }

  fn queue_guard(&self) -> MutexGuard<'_, Vec<BatchItem>> {
    self.queue.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// GET a resource through the batching window.
  ///
  /// Requests with an identical `(endpoint, params)` signature queued within
  /// the same window share exactly one underlying network call; every caller
  /// observes the same outcome.
  pub async fn batch_get(
    &self,
    endpoint: &str,
    params: Option<Params>,
  ) -> Result<Arc<Value>, ApiError> {
    let (tx, rx) = oneshot::channel();

    let arm_timer = {
      let mut queue = self.queue_guard();
      let was_empty = queue.is_empty();
      queue.push(BatchItem {
        endpoint: endpoint.to_string(),
        params,
        tx,
      });
      was_empty
    };

    if arm_timer {
      let client = Arc::clone(&self.client);
      let queue = Arc::clone(&self.queue);
      let delay = self.batch_delay;

      tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        // Drain atomically; requests arriving after this point open a new
        // window with its own timer.
        let items = {
          let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
          std::mem::take(&mut *queue)
        };

        if !items.is_empty() {
          Self::run_batch(client, items).await;
        }
      });
    }

    rx.await.map_err(|_| ApiError::BatchDropped)?
  }

  /// Execute one drained window: group by signature, one GET per group,
  /// fan the outcome out to every caller in the group. Groups run
  /// concurrently and fail independently.
  async fn run_batch(client: Arc<C>, items: Vec<BatchItem>) {
    let mut groups: HashMap<String, Vec<BatchItem>> = HashMap::new();
    for item in items {
      groups
        .entry(signature(&item.endpoint, item.params.as_ref()))
        .or_default()
        .push(item);
    }

    tracing::debug!(groups = groups.len(), "flushing request batch");

    let tasks = groups.into_values().map(|group| {
      let client = Arc::clone(&client);
      async move {
        let endpoint = group[0].endpoint.clone();
        let params = group[0].params.clone();

        match client.get(&endpoint, params.as_ref()).await {
          Ok(value) => {
            let shared = Arc::new(value);
            for item in group {
              let _ = item.tx.send(Ok(Arc::clone(&shared)));
            }
          }
          Err(err) => {
            for item in group {
              let _ = item.tx.send(Err(err.clone()));
            }
          }
        }
      }
    });

    join_all(tasks).await;
  }

  /// Warm up resources with plain (non-batched) GETs.
  ///
  /// Best-effort: failures are reported per entry and never propagate.
  pub async fn prefetch(&self, requests: Vec<PrefetchRequest>) -> Vec<Result<(), ApiError>> {
    let tasks = requests.into_iter().map(|request| {
      let client = Arc::clone(&self.client);
      async move {
        match client.get(&request.endpoint, request.params.as_ref()).await {
          Ok(_) => Ok(()),
          Err(err) => {
            tracing::debug!(endpoint = %request.endpoint, %err, "prefetch failed, ignoring");
            Err(err)
          }
        }
      }
    });

    join_all(tasks).await
  }

  /// Drop cached responses matching each pattern from the underlying
  /// client's cache. Matching semantics are owned by the client.
  pub fn invalidate_queries(&self, patterns: &[&str]) {
    for pattern in patterns {
      self.client.invalidate_cache(pattern);
    }
  }

  /// Fetch one page of a paginated list resource.
  ///
  /// When `prefetch_next` is set and the reported total implies more pages,
  /// the next page is prefetched in the background (fire and forget).
  pub async fn get_optimized_list<T: DeserializeOwned>(
    &self,
    base_endpoint: &str,
    options: ListOptions,
  ) -> Result<Paginated<T>, ApiError> {
    let ListOptions {
      page,
      page_size,
      filters,
      prefetch_next,
    } = options;

    let mut params = filters;
    params.insert("page".to_string(), page.into());
    params.insert("page_size".to_string(), page_size.into());

    let raw = self.client.get(base_endpoint, Some(&params)).await?;
    let page_data: Paginated<T> =
      serde_json::from_value(raw).map_err(|e| ApiError::Decode {
        endpoint: base_endpoint.to_string(),
        message: e.to_string(),
      })?;

    if prefetch_next && page_data.has_page_after(page, page_size) {
      let mut next_params = params;
      next_params.insert("page".to_string(), (page + 1).into());

      let coalescer = self.clone();
      let endpoint = base_endpoint.to_string();
      tokio::spawn(async move {
        coalescer
          .prefetch(vec![PrefetchRequest {
            endpoint,
            params: Some(next_params),
          }])
          .await;
      });
    }

    Ok(page_data)
  }
}

impl<C: ApiClient> Clone for RequestCoalescer<C> {
  fn clone(&self) -> Self {
    Self {
      client: Arc::clone(&self.client),
      queue: Arc::clone(&self.queue),
      batch_delay: self.batch_delay,
    }
  }
}

/// Exact-match signature for one `(endpoint, params)` pair.
///
/// Params serialize deterministically (BTreeMap), so identical requests hash
/// identically. SHA-256 keeps group keys fixed-length.
fn signature(endpoint: &str, params: Option<&Params>) -> String {
  let params_json = params
    .and_then(|p| serde_json::to_string(p).ok())
    .unwrap_or_else(|| "{}".to_string());

  let mut hasher = Sha256::new();
  hasher.update(endpoint.as_bytes());
  hasher.update(b":");
  hasher.update(params_json.as_bytes());
  hex::encode(hasher.finalize())
}
