//! Poll-driven query state machine with cache awareness.
//!
//! A `StableQuery<T>` encapsulates async data fetching, loading states, and
//! error handling over a shared [`QueryCache`]. It is designed for an
//! event-loop architecture: start work with [`StableQuery::activate`], call
//! [`StableQuery::poll`] on every tick, and read the current state between
//! polls.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::new();
//! let coalescer = coalescer.clone();
//! let mut rooms = StableQuery::new(cache, "rooms:page:1", move |_cancel| {
//!   let coalescer = coalescer.clone();
//!   async move {
//!     let page = coalescer
//!       .get_optimized_list::<Room>(endpoints::ROOMS, ListOptions::default())
//!       .await?;
//!     Ok(page.results)
//!   }
//! });
//!
//! rooms.activate();
//!
//! // In the event loop tick
//! if rooms.poll() {
//!   // State changed, trigger re-render
//! }
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::error::FetchError;

use super::cache::QueryCache;

/// Cooperative cancellation handle passed to every fetch operation.
///
/// Flipped when a newer request for the same query supersedes the current
/// one. Long-running operations should observe it and bail out with
/// [`FetchError::Aborted`]; operations that ignore it still cannot commit a
/// late result, because their channel is dropped at the same time.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  cancelled: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

/// Tuning knobs for a query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
  /// Whether the query may fetch at all.
  pub enabled: bool,
  /// Whether regaining focus triggers a refetch of stale data.
  pub refetch_on_focus: bool,
  /// Age under which a cache entry is served without a network call.
  pub stale_time: Duration,
  /// Age bound an application may pass to `QueryCache::evict_older_than`.
  pub cache_time: Duration,
  /// Fixed period for background refetching, if any.
  pub refetch_interval: Option<Duration>,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      enabled: true,
      refetch_on_focus: true,
      stale_time: Duration::from_secs(5 * 60),
      cache_time: Duration::from_secs(10 * 60),
      refetch_interval: None,
    }
  }
}

/// A boxed future that returns a fetch result
type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send>>;

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Box<dyn Fn(CancelToken) -> BoxFuture<T> + Send + Sync>;

type SuccessFn<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&str) + Send + Sync>;
type SelectFn<T> = Box<dyn Fn(T) -> T + Send + Sync>;

/// Cache-aware async query with stable behavior across frequent polling.
///
/// Guarantees:
/// - a fresh cache entry is served without invoking the fetcher;
/// - only the most recently started fetch for the key can commit its result
///   (the previous in-flight request is cancelled first);
/// - on failure the last good `data` stays visible while `error` is set;
/// - swapping the callbacks or `select` never triggers a fetch by itself.
pub struct StableQuery<T> {
  key: String,
  cache: QueryCache,
  fetcher: FetcherFn<T>,
  options: QueryOptions,

  data: Option<T>,
  error: Option<String>,
  loading: bool,
  refetching: bool,

  receiver: Option<mpsc::UnboundedReceiver<Result<T, FetchError>>>,
  cancel: Option<CancelToken>,
  last_settled: Option<Instant>,

  select: Option<SelectFn<T>>,
  on_success: Option<SuccessFn<T>>,
  on_error: Option<ErrorFn>,
}

impl<T: Serialize + DeserializeOwned + Send + 'static> StableQuery<T> {
  /// Create a new query over `cache` with the given key and fetcher.
  ///
  /// The fetcher is called with a fresh [`CancelToken`] each time a fetch
  /// starts. Nothing happens until [`StableQuery::activate`] is called.
  pub fn new<K, F, Fut>(cache: QueryCache, key: K, fetcher: F) -> Self
  where
    K: Into<String>,
    F: Fn(CancelToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    Self {
      key: key.into(),
      cache,
      fetcher: Box::new(move |token| Box::pin(fetcher(token))),
      options: QueryOptions::default(),
      data: None,
      error: None,
      loading: false,
      refetching: false,
      receiver: None,
      cancel: None,
      last_settled: None,
      select: None,
      on_success: None,
      on_error: None,
    }
  }

  pub fn with_options(mut self, options: QueryOptions) -> Self {
    self.options = options;
    self
  }

  /// Set the stale time for this query.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.options.stale_time = duration;
    self
  }

  pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
    self.options.refetch_interval = Some(interval);
    self
  }

  /// Transform applied to every fetched value before caching.
  pub fn with_select<F>(mut self, select: F) -> Self
  where
    F: Fn(T) -> T + Send + Sync + 'static,
  {
    self.select = Some(Box::new(select));
    self
  }

  pub fn on_success<F>(mut self, callback: F) -> Self
  where
    F: Fn(&T) + Send + Sync + 'static,
  {
    self.on_success = Some(Box::new(callback));
    self
  }

  pub fn on_error<F>(mut self, callback: F) -> Self
  where
    F: Fn(&str) + Send + Sync + 'static,
  {
    self.on_error = Some(Box::new(callback));
    self
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn is_refetching(&self) -> bool {
    self.refetching
  }

  /// Whether the cache entry for this key is missing or older than
  /// `stale_time`.
  pub fn is_stale(&self) -> bool {
    self.cache.is_stale(&self.key, self.options.stale_time)
  }

  /// Begin serving this query: a fresh cache entry is returned immediately
  /// with no network call; otherwise a fetch starts with `loading` set.
  pub fn activate(&mut self) {
    if !self.options.enabled {
      return;
    }

    if let Some(value) = self.cache.get_fresh::<T>(&self.key, self.options.stale_time) {
      tracing::debug!(key = %self.key, "query cache hit, skipping fetch");
      self.data = Some(value);
      self.error = None;
      self.loading = false;
      self.refetching = false;
      self.last_settled = Some(Instant::now());
    } else {
      self.start_fetch(false);
    }
  }

  /// Force a background refresh, keeping the current data visible.
  pub fn refetch(&mut self) {
    if !self.options.enabled {
      return;
    }
    self.start_fetch(true);
  }

  /// React to the application regaining foreground focus.
  ///
  /// Refetches only when the cache entry is missing or stale; fresh entries
  /// are left untouched to avoid redundant calls.
  pub fn handle_focus(&mut self) {
    if !self.options.enabled || !self.options.refetch_on_focus {
      return;
    }
    if self.is_stale() {
      self.start_fetch(true);
    }
  }

  /// Point the query at a different key and re-evaluate from scratch.
  pub fn set_key<K: Into<String>>(&mut self, key: K) {
    let key = key.into();
    if key == self.key {
      return;
    }
    self.cancel_in_flight();
    self.key = key;
    self.activate();
  }

  /// Enable or disable the query. Enabling re-evaluates from scratch;
  /// disabling cancels any in-flight request.
  pub fn set_enabled(&mut self, enabled: bool) {
    if enabled == self.options.enabled {
      return;
    }
    self.options.enabled = enabled;
    if enabled {
      self.activate();
    } else {
      self.cancel_in_flight();
    }
  }

  /// Change or clear the background refetch interval.
  pub fn set_refetch_interval(&mut self, interval: Option<Duration>) {
    self.options.refetch_interval = interval;
  }

  /// Poll for results from a pending fetch and drive interval refetching.
  ///
  /// Returns `true` if observable state changed. Call this on every event
  /// loop tick.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = self.receiver.as_mut() else {
      return self.maybe_interval_refetch();
    };

    match receiver.try_recv() {
      Ok(Ok(raw)) => {
        let value = match &self.select {
          Some(select) => select(raw),
          None => raw,
        };
        self.cache.store(&self.key, &value);
        self.data = Some(value);
        self.error = None;
        self.settle();
        if let (Some(callback), Some(data)) = (&self.on_success, &self.data) {
          callback(data);
        }
        true
      }
      Ok(Err(FetchError::Aborted)) => {
        // Superseded request; clear the indicators and surface nothing.
        self.settle();
        true
      }
      Ok(Err(FetchError::Operation(message))) => {
        tracing::debug!(key = %self.key, error = %message, "query fetch failed");
        self.error = Some(message);
        self.settle();
        if let (Some(callback), Some(error)) = (&self.on_error, &self.error) {
          callback(error);
        }
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Sender dropped without sending; treat like a cancellation.
        self.settle();
        true
      }
    }
  }

  fn settle(&mut self) {
    self.loading = false;
    self.refetching = false;
    self.receiver = None;
    self.cancel = None;
    self.last_settled = Some(Instant::now());
  }

  fn maybe_interval_refetch(&mut self) -> bool {
    if !self.options.enabled {
      return false;
    }
    let Some(interval) = self.options.refetch_interval else {
      return false;
    };
    let due = self.last_settled.map_or(true, |at| at.elapsed() >= interval);
    if due {
      self.start_fetch(true);
      return true;
    }
    false
  }

  /// Internal: start a fetch, superseding any in-flight one.
  fn start_fetch(&mut self, background: bool) {
    // Last-request-wins: flip the previous token and drop its channel so a
    // late result has nowhere to land.
    if let Some(token) = self.cancel.take() {
      token.cancel();
    }

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);

    let token = CancelToken::new();
    self.cancel = Some(token.clone());

    self.loading = !background;
    self.refetching = background;
    self.error = None;

    let future = (self.fetcher)(token);
    tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }

  fn cancel_in_flight(&mut self) {
    if let Some(token) = self.cancel.take() {
      token.cancel();
    }
    self.receiver = None;
    self.loading = false;
    self.refetching = false;
  }
}

impl<T> Drop for StableQuery<T> {
  fn drop(&mut self) {
    if let Some(token) = self.cancel.take() {
      token.cancel();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for StableQuery<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StableQuery")
      .field("key", &self.key)
      .field("data", &self.data)
      .field("error", &self.error)
      .field("loading", &self.loading)
      .field("refetching", &self.refetching)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicU32;
  use std::sync::Mutex;

  fn init_tracing() {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  }

  fn counting_fetcher(
    counter: Arc<AtomicU32>,
  ) -> impl Fn(CancelToken) -> BoxFuture<u32> + Send + Sync + 'static {
    move |_token| {
      let counter = counter.clone();
      Box::pin(async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) })
    }
  }

  async fn settle(query: &mut StableQuery<u32>) {
    for _ in 0..50 {
      tokio::time::sleep(Duration::from_millis(5)).await;
      if query.poll() {
        return;
      }
    }
    panic!("query never settled");
  }

  #[tokio::test]
  async fn fetch_populates_data_and_cache() {
    init_tracing();
    let cache = QueryCache::new();
    let mut query = StableQuery::new(cache.clone(), "rooms", |_| async { Ok(7u32) });

    query.activate();
    assert!(query.is_loading());

    settle(&mut query).await;

    assert_eq!(query.data(), Some(&7));
    assert!(query.error().is_none());
    assert!(!query.is_loading());
    let cached: Option<u32> = cache.get_fresh("rooms", Duration::from_secs(60));
    assert_eq!(cached, Some(7));
  }

  #[tokio::test]
  async fn fresh_cache_hit_skips_fetcher() {
    let cache = QueryCache::new();
    cache.store("rooms", &42u32);

    let calls = Arc::new(AtomicU32::new(0));
    let mut query = StableQuery::new(cache, "rooms", counting_fetcher(calls.clone()));

    query.activate();

    assert_eq!(query.data(), Some(&42));
    assert!(!query.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn stale_entry_triggers_exactly_one_refetch() {
    let cache = QueryCache::new();
    cache.store("rooms", &42u32);
    let stored_at = cache.cached_at("rooms").unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let mut query = StableQuery::new(cache.clone(), "rooms", counting_fetcher(calls.clone()))
      .with_stale_time(Duration::ZERO);

    query.activate();
    settle(&mut query).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.cached_at("rooms").unwrap() >= stored_at);
  }

  #[tokio::test]
  async fn last_request_wins() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let cache = QueryCache::new();
    let mut query = StableQuery::new(cache, "rooms", move |_token| {
      let counter = counter_clone.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(counter.fetch_add(1, Ordering::SeqCst))
      }
    })
    .with_stale_time(Duration::ZERO);

    query.activate();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Supersede the first fetch before it resolves
    query.refetch();
    tokio::time::sleep(Duration::from_millis(100)).await;

    query.poll();
    // Only the second fetch can commit its result
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn aborted_fetch_is_swallowed() {
    let cache = QueryCache::new();
    let mut query: StableQuery<u32> = StableQuery::new(cache, "rooms", |token| async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      if token.is_cancelled() {
        return Err(FetchError::Aborted);
      }
      Ok(1)
    });

    query.activate();
    // Supersede immediately; the first fetch observes its token and aborts
    query.refetch();
    tokio::time::sleep(Duration::from_millis(50)).await;
    query.poll();

    assert_eq!(query.data(), Some(&1));
    assert!(query.error().is_none());
    assert!(!query.is_loading());
    assert!(!query.is_refetching());
  }

  #[tokio::test]
  async fn failure_keeps_last_good_data() {
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = attempts.clone();

    let cache = QueryCache::new();
    let mut query = StableQuery::new(cache, "rooms", move |_| {
      let attempts = attempts_clone.clone();
      async move {
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
          Ok(7u32)
        } else {
          Err(FetchError::Operation("backend unavailable".to_string()))
        }
      }
    })
    .with_stale_time(Duration::ZERO);

    query.activate();
    settle(&mut query).await;
    assert_eq!(query.data(), Some(&7));

    query.refetch();
    assert!(query.is_refetching());
    settle(&mut query).await;

    assert_eq!(query.data(), Some(&7));
    assert_eq!(query.error(), Some("backend unavailable"));
    assert!(!query.is_refetching());
  }

  #[tokio::test]
  async fn callbacks_and_select_are_applied() {
    let seen = Arc::new(AtomicU32::new(0));
    let seen_clone = seen.clone();

    let cache = QueryCache::new();
    let mut query = StableQuery::new(cache.clone(), "rooms", |_| async { Ok(10u32) })
      .with_select(|value| value * 2)
      .on_success(move |value| {
        seen_clone.store(*value, Ordering::SeqCst);
      });

    query.activate();
    settle(&mut query).await;

    assert_eq!(query.data(), Some(&20));
    assert_eq!(seen.load(Ordering::SeqCst), 20);
    // The transformed value, not the raw one, is cached
    let cached: Option<u32> = cache.get_fresh("rooms", Duration::from_secs(60));
    assert_eq!(cached, Some(20));
  }

  #[tokio::test]
  async fn error_callback_receives_message() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let messages_clone = messages.clone();

    let cache = QueryCache::new();
    let mut query: StableQuery<u32> = StableQuery::new(cache, "rooms", |_| async {
      Err(FetchError::Operation("boom".to_string()))
    })
    .on_error(move |message| {
      messages_clone.lock().unwrap().push(message.to_string());
    });

    query.activate();
    settle(&mut query).await;

    assert_eq!(messages.lock().unwrap().as_slice(), ["boom"]);
  }

  #[tokio::test]
  async fn focus_refetches_only_when_stale() {
    let cache = QueryCache::new();
    cache.store("rooms", &42u32);

    let calls = Arc::new(AtomicU32::new(0));
    let mut query = StableQuery::new(cache.clone(), "rooms", counting_fetcher(calls.clone()));

    query.activate();
    query.handle_focus();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Make the entry look stale and try again
    query = StableQuery::new(cache, "rooms", counting_fetcher(calls.clone()))
      .with_stale_time(Duration::ZERO);
    query.handle_focus();
    settle(&mut query).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn interval_refetches_in_background() {
    let calls = Arc::new(AtomicU32::new(0));

    let cache = QueryCache::new();
    let mut query = StableQuery::new(cache, "rooms", counting_fetcher(calls.clone()))
      .with_stale_time(Duration::ZERO)
      .with_refetch_interval(Duration::from_millis(10));

    query.activate();
    settle(&mut query).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(query.poll());
    assert!(query.is_refetching());
    settle(&mut query).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn disabled_query_never_fetches() {
    let calls = Arc::new(AtomicU32::new(0));

    let cache = QueryCache::new();
    let mut query = StableQuery::new(cache, "rooms", counting_fetcher(calls.clone()))
      .with_options(QueryOptions {
        enabled: false,
        ..QueryOptions::default()
      });

    query.activate();
    query.refetch();
    query.handle_focus();
    assert!(!query.poll());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    query.set_enabled(true);
    settle(&mut query).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn key_change_reactivates_from_scratch() {
    let cache = QueryCache::new();
    cache.store("rooms:2", &99u32);

    let calls = Arc::new(AtomicU32::new(0));
    let mut query = StableQuery::new(cache, "rooms:1", counting_fetcher(calls.clone()));

    query.activate();
    settle(&mut query).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The new key has a fresh cache entry, so no fetch happens
    query.set_key("rooms:2");
    assert_eq!(query.data(), Some(&99));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }
}
