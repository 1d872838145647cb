//! Cache-aware data access layer for a university timetabling dashboard.
//!
//! Two complementary strategies for keeping a chatty dashboard off the
//! network:
//!
//! - [`StableQuery`] — a staleness-aware query over a shared [`QueryCache`],
//!   with last-request-wins cancellation, stale-while-error display, and
//!   refetch on focus or interval.
//! - [`RequestCoalescer`] — a short-window batcher that merges concurrent
//!   identical GET requests into one network call and fans the shared result
//!   out to every caller, with prefetch and cache-invalidation utilities.
//!
//! Both sit on the [`ApiClient`] seam; [`HttpClient`] is the reqwest-backed
//! production implementation. [`services`] offers typed facades for the
//! dashboard's main resources.
//!
//! All layers emit `tracing` events; install a subscriber to see cache hits,
//! batch flushes, and prefetch outcomes.

pub mod api;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod query;
pub mod services;

pub use api::{ApiClient, HttpClient, Paginated, Params};
pub use coalesce::{ListOptions, PrefetchRequest, RequestCoalescer};
pub use config::Config;
pub use error::{ApiError, ConfigError, FetchError};
pub use query::{query_key, CancelToken, QueryCache, QueryOptions, StableQuery};
