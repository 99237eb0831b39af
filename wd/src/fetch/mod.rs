//! Outbound HTTP for preload and purge
//!
//! The handlers only see the [`Fetcher`] trait; [`HttpFetcher`] is the
//! reqwest-backed implementation used by the daemon.

pub mod client;
mod error;
mod http;

pub use client::{FetchMethod, FetchRequest, Fetcher};
pub use error::{FetchError, is_retryable_status};
pub use http::HttpFetcher;
