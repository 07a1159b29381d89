//! Crawler fetch module
//!
//! This module contains the fetch pipeline used by the crawler:
//! - HTTP client construction and single-attempt requests
//! - The fetch client that composes robots, throttle and cache
//! - The result type handed back to the crawl scheduler

mod client;
mod fetcher;
mod result;

pub use client::{FetchClient, FetchOptions};
pub use fetcher::{build_http_client, build_robots_client, Attempt};
pub use result::{FetchReason, FetchResult, STATUS_BLOCKED_BY_ROBOTS, STATUS_TRANSPORT_FAILURE};
