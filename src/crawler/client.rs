//! The fetch client: robots, throttle, cache and network composed into one
//! fetch operation

use crate::cache::Cache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::crawler::fetcher::{self, Attempt};
use crate::crawler::result::{FetchReason, FetchResult};
use crate::robots::{RobotsEngine, RobotsPolicy};
use crate::throttle::{is_waf_status, Throttle, ThrottleState};
use crate::url::{parse_target, FetchTarget};
use crate::{CacheEntry, FetchError};
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Per-call options for [`FetchClient::fetch_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Record terminal non-2xx responses (404, redirects, ...) in the cache.
    /// Their bodies are never retained, only their validators and expiry.
    pub cache_other_statuses: bool,
}

/// Polite, cache-aware HTTP fetcher
///
/// # Request Flow
///
/// 1. robots.txt check; a denied path returns 451 without any request
/// 2. wait for this host's turn
/// 3. fresh cache hit returns immediately
/// 4. GET, conditional when a stale entry holds validators
/// 5. record the outcome in the cache and the throttle
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 304 | Cached body returned as 200 `validated-cache` |
/// | HTTP 2xx | Stored, returned `ok` |
/// | HTTP 429 / 403 | No retry, cool-off scheduled, `waf-throttle` |
/// | HTTP 5xx / transport error | Retried with exponential sleeps, then `server-error` |
/// | Anything else | Returned as-is, `http-status` |
pub struct FetchClient {
    http: Client,
    cache: Arc<Cache>,
    robots: Arc<RobotsEngine>,
    throttle: Arc<Throttle>,
    config: Config,
    clock: Arc<dyn Clock>,
}

impl FetchClient {
    /// Creates a client on the system clock
    pub fn new(config: Config) -> crate::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a client whose time computations and sleeps use `clock`
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> crate::Result<Self> {
        let http = fetcher::build_http_client(&config.user_agent, &config.fetch)
            .map_err(FetchError::ClientBuild)?;
        let robots_http = fetcher::build_robots_client(&config.user_agent, &config.fetch)
            .map_err(FetchError::ClientBuild)?;

        let robots = Arc::new(RobotsEngine::new(
            config.robots.clone(),
            config.user_agent.product_token(),
            robots_http,
            Arc::clone(&clock),
        ));
        let throttle = Arc::new(Throttle::new(
            config.throttle.clone(),
            robots.clone(),
            Arc::clone(&clock),
        ));
        let cache = Arc::new(Cache::new(config.cache.clone(), Arc::clone(&clock)));

        Ok(Self {
            http,
            cache,
            robots,
            throttle,
            config,
            clock,
        })
    }

    /// Fetches `url` with default options
    pub async fn fetch(&self, url: &str) -> crate::Result<FetchResult> {
        self.fetch_with(url, FetchOptions::default()).await
    }

    /// Fetches `url`, giving up once `deadline` has elapsed
    ///
    /// A cancelled fetch never records partial results: the cache and the
    /// throttle are only updated after a response has been fully read.
    pub async fn fetch_with_deadline(
        &self,
        url: &str,
        deadline: Duration,
    ) -> crate::Result<FetchResult> {
        match tokio::time::timeout(deadline, self.fetch(url)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Fetch of {} abandoned after {:?}", url, deadline);
                Err(FetchError::DeadlineExceeded {
                    url: url.to_string(),
                    deadline,
                })
            }
        }
    }

    /// Fetches `url`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute http(s) URL; also the cache key, used verbatim
    /// * `options` - Per-call behaviour, see [`FetchOptions`]
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult)` - For every network or protocol outcome, including
    ///   robots denials, WAF responses and exhausted retries
    /// * `Err(FetchError::UrlError)` - If the URL cannot be fetched at all
    pub async fn fetch_with(&self, url: &str, options: FetchOptions) -> crate::Result<FetchResult> {
        let target = parse_target(url)?;

        if !self.robots.is_allowed(&target.host, &target.path).await {
            tracing::debug!("robots.txt disallows {}", url);
            return Ok(FetchResult::blocked_by_robots(url));
        }

        let _turn = self.throttle.acquire_turn(&target.host).await;
        self.throttle.wait_for_turn(&target.host).await;

        let conditionals = match self.cache.get(url) {
            (Some(entry), true) => {
                tracing::debug!("Serving {} from cache", url);
                return Ok(FetchResult::from_fresh_entry(url, entry));
            }
            (Some(_), false) => self.cache.conditionals(url),
            (None, _) => HeaderMap::new(),
        };

        let (attempt, attempts) = self.send_with_retries(&target, &conditionals).await;
        Ok(self.settle(url, &target, attempt, attempts, options).await)
    }

    /// Issues the request, retrying server and transport failures
    ///
    /// The sleep after attempt `n` is `retry_base * 2^(n-1)`.
    async fn send_with_retries(&self, target: &FetchTarget, headers: &HeaderMap) -> (Attempt, u32) {
        let max_attempts = self.config.fetch.max_attempts.max(1);
        let mut attempt_no = 1;

        loop {
            let attempt = fetcher::send_once(&self.http, &target.url, headers).await;
            tracing::trace!(
                "Attempt {}/{} for {}: status {}",
                attempt_no,
                max_attempts,
                target.url,
                attempt.status()
            );

            if !attempt.is_retryable() || attempt_no >= max_attempts {
                return (attempt, attempt_no);
            }

            let delay = retry_delay(self.config.fetch.retry_base(), attempt_no);
            tracing::debug!(
                "Retrying {} in {:?} after {}",
                target.url,
                delay,
                describe(&attempt)
            );
            self.clock.sleep(delay).await;
            attempt_no += 1;
        }
    }

    /// Records the final attempt in cache and throttle and builds the result
    async fn settle(
        &self,
        url: &str,
        target: &FetchTarget,
        attempt: Attempt,
        attempts: u32,
        options: FetchOptions,
    ) -> FetchResult {
        let host = target.host.as_str();

        let (status, headers, body) = match attempt {
            Attempt::Response {
                status,
                headers,
                body,
            } => (status, headers, body),
            Attempt::Transport { error } => {
                tracing::warn!("Giving up on {} after {} attempts: {}", url, attempts, error);
                let status = crate::crawler::result::STATUS_TRANSPORT_FAILURE;
                self.throttle.after_response(host, status).await;
                return FetchResult {
                    url: url.to_string(),
                    status,
                    headers: HeaderMap::new(),
                    body: None,
                    from_cache: false,
                    reason: FetchReason::ServerError,
                    attempts,
                };
            }
        };

        if status == 304 {
            if let Some(entry) = self.cache.store_304(url, &headers) {
                self.throttle.after_response(host, 200).await;
                return FetchResult::from_validated_entry(url, entry, attempts);
            }
            // Nothing to validate against: report the status as received
            self.throttle.after_response(host, status).await;
            return raw_result(url, status, headers, body, FetchReason::HttpStatus, attempts);
        }

        let reason = if (200..300).contains(&status) {
            self.cache.store_200(
                url,
                status,
                fetcher::content_type(&headers),
                &body,
                &headers,
            );
            FetchReason::Ok
        } else if is_waf_status(status) {
            FetchReason::WafThrottle
        } else if (500..600).contains(&status) {
            tracing::warn!("{} still failing with {} after {} attempts", url, status, attempts);
            FetchReason::ServerError
        } else {
            if options.cache_other_statuses {
                self.cache.store_200(
                    url,
                    status,
                    fetcher::content_type(&headers),
                    &body,
                    &headers,
                );
            }
            FetchReason::HttpStatus
        };

        self.throttle.after_response(host, status).await;
        raw_result(url, status, headers, body, reason, attempts)
    }

    /// Read-only view of a cached entry
    pub fn cached_entry(&self, url: &str) -> Option<CacheEntry> {
        self.cache.entry(url)
    }

    /// Read-only view of a host's pacing state
    pub fn throttle_state(&self, host: &str) -> Option<ThrottleState> {
        self.throttle.state(host)
    }

    /// Read-only view of a host's cached robots policy
    pub async fn robots_policy(&self, host: &str) -> Option<Arc<RobotsPolicy>> {
        self.robots.policy(host).await
    }

    /// Number of cached URLs
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Resets cache, robots policies and pacing state
    pub fn clear_state(&self) {
        self.cache.clear();
        self.robots.clear_cache();
        self.throttle.clear(None);
    }

    /// Releases the HTTP connection pools
    ///
    /// The page client's pool closes here, and the robots client's pool
    /// closes with the last reference to the robots engine. Dropping the
    /// client without calling this releases the same resources.
    pub fn close(self) {
        tracing::debug!("Closing fetch client ({} cached URLs)", self.cache.len());
        drop(self.http);
        drop(self.throttle);
        drop(self.robots);
    }
}

fn raw_result(
    url: &str,
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
    reason: FetchReason,
    attempts: u32,
) -> FetchResult {
    FetchResult {
        url: url.to_string(),
        status,
        headers,
        body: Some(body),
        from_cache: false,
        reason,
        attempts,
    }
}

/// Sleep before the attempt following attempt `attempt_no` (1-based)
fn retry_delay(base: Duration, attempt_no: u32) -> Duration {
    let exponent = attempt_no.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent).unwrap_or(Duration::MAX)
}

fn describe(attempt: &Attempt) -> String {
    match attempt {
        Attempt::Response { status, .. } => format!("status {}", status),
        Attempt::Transport { error } => error.clone(),
    }
}
