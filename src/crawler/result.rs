use crate::cache::CacheEntry;
use reqwest::header::HeaderMap;
use std::fmt;

/// Status reported when robots.txt forbids a URL
pub const STATUS_BLOCKED_BY_ROBOTS: u16 = 451;

/// Status reported when no HTTP response was received at all
pub const STATUS_TRANSPORT_FAILURE: u16 = 0;

/// Why a fetch ended the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchReason {
    /// Response received from the network or served fresh from cache
    Ok,
    /// robots.txt disallows the path; no request was made
    BlockedByRobots,
    /// The server confirmed the cached copy with a 304
    ValidatedCache,
    /// 429/403 anti-automation response; cool-off scheduled
    WafThrottle,
    /// 5xx or transport failure after all retries
    ServerError,
    /// Any other terminal status (404, un-followed redirect, orphan 304)
    HttpStatus,
}

impl FetchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::BlockedByRobots => "blocked-by-robots",
            Self::ValidatedCache => "validated-cache",
            Self::WafThrottle => "waf-throttle",
            Self::ServerError => "server-error",
            Self::HttpStatus => "http-status",
        }
    }
}

impl fmt::Display for FetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one logical fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The URL as requested
    pub url: String,

    /// HTTP status; 451 for robots denial, 0 for transport failure
    pub status: u16,

    pub headers: HeaderMap,

    /// Response body; `None` when nothing was received or retained
    pub body: Option<Vec<u8>>,

    /// Whether the body came from the cache
    pub from_cache: bool,

    pub reason: FetchReason,

    /// Network requests issued for this fetch (robots.txt excluded)
    pub attempts: u32,
}

impl FetchResult {
    /// Synthetic result for a URL robots.txt forbids
    pub fn blocked_by_robots(url: &str) -> Self {
        Self {
            url: url.to_string(),
            status: STATUS_BLOCKED_BY_ROBOTS,
            headers: HeaderMap::new(),
            body: None,
            from_cache: false,
            reason: FetchReason::BlockedByRobots,
            attempts: 0,
        }
    }

    /// Result served from a fresh cache entry without touching the network
    ///
    /// Entries recorded for terminal non-2xx statuses keep their
    /// `http-status` reason when replayed.
    pub fn from_fresh_entry(url: &str, entry: CacheEntry) -> Self {
        let reason = if (200..300).contains(&entry.status) {
            FetchReason::Ok
        } else {
            FetchReason::HttpStatus
        };
        Self {
            url: url.to_string(),
            status: entry.status,
            headers: entry.headers(),
            body: entry.body,
            from_cache: true,
            reason,
            attempts: 0,
        }
    }

    /// Result for a 304 that confirmed the cached entry
    pub fn from_validated_entry(url: &str, entry: CacheEntry, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            status: 200,
            headers: entry.headers(),
            body: entry.body,
            from_cache: true,
            reason: FetchReason::ValidatedCache,
            attempts,
        }
    }

    /// Whether the fetch produced a usable page
    pub fn is_success(&self) -> bool {
        matches!(self.reason, FetchReason::Ok | FetchReason::ValidatedCache)
            && (200..300).contains(&self.status)
    }

    /// Body length in bytes, zero when absent
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Vec::len)
    }
}
