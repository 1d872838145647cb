//! Shared cache of query results.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A cached query result.
///
/// Values are stored serialized so the cache can be shared between queries of
/// different result types under one map.
#[derive(Debug, Clone)]
struct CacheEntry {
  data: Value,
  cached_at: DateTime<Utc>,
}

/// Process-lifetime cache of query results, keyed by logical query key.
///
/// Entries are overwritten on every successful refetch and are never evicted
/// automatically; [`QueryCache::evict_older_than`] exists for applications
/// that want an explicit sweep. Cloning the cache clones the handle, not the
/// contents, so many queries (and tests) can share or isolate state as
/// needed.
#[derive(Debug, Clone, Default)]
pub struct QueryCache {
  entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

/// Join key segments into a single cache identity (e.g. `["rooms", "7"]`
/// becomes `"rooms:7"`).
pub fn query_key(parts: &[&str]) -> String {
  parts.join(":")
}

impl QueryCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn guard(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Store a result under `key` with the current timestamp.
  ///
  /// Serialization failures leave the previous entry intact; the caller's
  /// in-memory copy is unaffected either way.
  pub fn store<T: Serialize>(&self, key: &str, value: &T) {
    match serde_json::to_value(value) {
      Ok(data) => {
        self.guard().insert(
          key.to_string(),
          CacheEntry {
            data,
            cached_at: Utc::now(),
          },
        );
      }
      Err(err) => {
        tracing::warn!(key, %err, "failed to serialize query result for caching");
      }
    }
  }

  /// Get the cached value for `key` if it is younger than `stale_time`.
  ///
  /// Entries that fail to decode as `T` (the key was reused with another
  /// shape) are treated as misses.
  pub fn get_fresh<T: DeserializeOwned>(&self, key: &str, stale_time: Duration) -> Option<T> {
    let guard = self.guard();
    let entry = guard.get(key)?;
    if !is_fresh(entry.cached_at, stale_time) {
      return None;
    }

    match serde_json::from_value(entry.data.clone()) {
      Ok(value) => Some(value),
      Err(err) => {
        tracing::debug!(key, %err, "cached value no longer decodes, treating as miss");
        None
      }
    }
  }

  /// Whether the entry for `key` is stale. A missing entry counts as stale.
  pub fn is_stale(&self, key: &str, stale_time: Duration) -> bool {
    match self.guard().get(key) {
      Some(entry) => !is_fresh(entry.cached_at, stale_time),
      None => true,
    }
  }

  /// Timestamp of the entry for `key`, if present.
  pub fn cached_at(&self, key: &str) -> Option<DateTime<Utc>> {
    self.guard().get(key).map(|entry| entry.cached_at)
  }

  /// Drop entries older than `cache_time`, returning how many were evicted.
  pub fn evict_older_than(&self, cache_time: Duration) -> usize {
    let mut guard = self.guard();
    let before = guard.len();
    guard.retain(|_, entry| is_fresh(entry.cached_at, cache_time));
    before - guard.len()
  }

  pub fn len(&self) -> usize {
    self.guard().len()
  }

  pub fn is_empty(&self) -> bool {
    self.guard().is_empty()
  }
}

/// An entry is fresh while `now - cached_at < stale_time`.
fn is_fresh(cached_at: DateTime<Utc>, stale_time: Duration) -> bool {
  let age = Utc::now().signed_duration_since(cached_at);
  // A negative age means clock skew; treat it as fresh.
  age.to_std().map_or(true, |age| age < stale_time)
}
