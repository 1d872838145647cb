//! Staleness-aware query caching.
//!
//! [`QueryCache`] is a shared, process-lifetime map of serialized results;
//! [`StableQuery`] is a poll-driven fetch state machine on top of it that
//! guarantees last-request-wins, stale-while-error display, and refetch on
//! focus or interval without redundant network calls.

mod cache;
mod stable;

pub use cache::{query_key, QueryCache};
pub use stable::{CancelToken, QueryOptions, StableQuery};
