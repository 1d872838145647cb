//! HTTP client abstraction for the timetabling backend.
//!
//! The [`ApiClient`] trait is the seam the caching layers build on; the
//! [`HttpClient`] is the reqwest-backed production implementation with its
//! own pattern-invalidatable response cache.

mod client;
pub mod endpoints;
mod http;
mod types;

pub use client::{ApiClient, Params};
pub use http::HttpClient;
pub use types::{Conflict, Department, Paginated, Room, ScheduleSession};
