//! Leadcrawl-Fetch: the polite, cache-aware fetch layer of the lead crawler
//!
//! This crate retrieves pages for the crawler while respecting robots.txt,
//! revalidating cached responses with conditional requests, pacing requests
//! per host, and backing off when a site answers with anti-automation
//! responses or transient server errors.

pub mod cache;
pub mod clock;
pub mod config;
pub mod crawler;
pub mod robots;
pub mod throttle;
pub mod url;

use thiserror::Error;

/// Main error type for fetch operations
///
/// Protocol outcomes (robots denial, WAF responses, server errors) are never
/// errors; they are reported through [`crawler::FetchResult`]. This type only
/// covers problems with the caller's input or the local environment.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Deadline of {deadline:?} exceeded while fetching {url}")]
    DeadlineExceeded {
        url: String,
        deadline: std::time::Duration,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use cache::{Cache, CacheEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use crawler::{FetchClient, FetchOptions, FetchReason, FetchResult};
pub use robots::{RobotsEngine, RobotsPolicy};
pub use throttle::{Throttle, ThrottleState};
