//! Robots.txt handling module
//!
//! Fetches, parses and caches robots.txt per host. Policies are refreshed
//! lazily: a stale policy is refetched synchronously on the next query.

mod parser;
mod policy;

pub use parser::{ParsedRobots, RobotsGroup};
pub use policy::RobotsPolicy;

use crate::clock::{secs_f64, Clock};
use crate::config::RobotsConfig;
use crate::throttle::CrawlDelay;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// robots.txt bodies are truncated to this many bytes before parsing
const MAX_ROBOTS_BYTES: usize = 512 * 1024;

type PolicySlot = Arc<tokio::sync::Mutex<Option<Arc<RobotsPolicy>>>>;

/// Per-host robots policy registry
///
/// Each host has its own slot, so one slow robots.txt fetch never blocks
/// queries for other hosts, and concurrent queries for the same host share
/// a single fetch.
pub struct RobotsEngine {
    slots: Mutex<HashMap<String, PolicySlot>>,
    http: Client,
    config: RobotsConfig,
    product_token: String,
    clock: Arc<dyn Clock>,
}

impl RobotsEngine {
    /// Creates an engine that fetches with `http`
    ///
    /// `product_token` selects the user-agent group; the client should carry
    /// the matching User-Agent header and follow redirects.
    pub fn new(
        config: RobotsConfig,
        product_token: impl Into<String>,
        http: Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            http,
            config,
            product_token: product_token.into(),
            clock,
        }
    }

    /// Checks whether `path` on `host` may be fetched
    pub async fn is_allowed(&self, host: &str, path: &str) -> bool {
        let policy = self.policy_for(host).await;
        let allowed = policy.is_allowed(&self.product_token, path);
        tracing::trace!("robots check {}{}: allowed={}", host, path, allowed);
        allowed
    }

    /// Crawl-delay for `host` in seconds, falling back to the configured default
    pub async fn get_crawl_delay(&self, host: &str) -> f64 {
        self.policy_for(host)
            .await
            .crawl_delay(&self.product_token)
            .unwrap_or(self.config.default_crawl_delay)
    }

    /// Read-only view of the policy currently cached for `host`
    ///
    /// Never triggers a fetch; returns `None` when nothing is cached.
    pub async fn policy(&self, host: &str) -> Option<Arc<RobotsPolicy>> {
        let slot = self.existing_slot(host)?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Drops every cached policy
    pub fn clear_cache(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns a usable policy for `host`, fetching it when missing or stale
    async fn policy_for(&self, host: &str) -> Arc<RobotsPolicy> {
        let slot = self.slot(host);
        let mut guard = slot.lock().await;

        if let Some(policy) = guard.as_ref() {
            if !policy.is_stale_at(self.clock.now()) {
                tracing::trace!("Reusing cached robots.txt for {}", host);
                return Arc::clone(policy);
            }
            tracing::debug!("Cached robots.txt for {} is stale, refetching", host);
        }

        let policy = Arc::new(self.fetch_policy(host).await);
        *guard = Some(Arc::clone(&policy));
        policy
    }

    /// Fetches and classifies `/robots.txt` for `host`
    ///
    /// | Outcome | Policy |
    /// |---------|--------|
    /// | 2xx | parsed body, normal TTL |
    /// | 429 | deny-all, deny TTL |
    /// | other 4xx | allow-all, normal TTL |
    /// | 5xx / transport error | deny-all, deny TTL |
    /// | anything else | allow-all, normal TTL |
    async fn fetch_policy(&self, host: &str) -> RobotsPolicy {
        let robots_url = format!("{}://{}/robots.txt", self.config.scheme, host);
        tracing::info!("Fetching {}", robots_url);

        let response = match self.http.get(&robots_url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::info!("robots.txt fetch failed for {}: {}; denying all", host, e);
                return self.deny_all();
            }
        };

        let status = response.status();
        let fetched_at = self.clock.now();

        if status.is_success() {
            return match response.bytes().await {
                Ok(bytes) => {
                    let bytes = &bytes[..bytes.len().min(MAX_ROBOTS_BYTES)];
                    let content = String::from_utf8_lossy(bytes);
                    RobotsPolicy::parsed(
                        ParsedRobots::parse(&content),
                        fetched_at,
                        self.config.policy_ttl(),
                    )
                }
                Err(e) => {
                    tracing::info!("robots.txt body for {} unreadable: {}; denying all", host, e);
                    self.deny_all()
                }
            };
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            tracing::info!("robots.txt for {} returned {}; denying all", host, status);
            return self.deny_all();
        }

        tracing::debug!("robots.txt for {} returned {}; allowing all", host, status);
        RobotsPolicy::allow_all(fetched_at, self.config.policy_ttl())
    }

    fn deny_all(&self) -> RobotsPolicy {
        RobotsPolicy::deny_all(self.clock.now(), self.config.deny_ttl())
    }

    fn slot(&self, host: &str) -> PolicySlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(host.to_string()).or_default())
    }

    fn existing_slot(&self, host: &str) -> Option<PolicySlot> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }
}

#[async_trait]
impl CrawlDelay for RobotsEngine {
    async fn crawl_delay(&self, host: &str) -> Duration {
        secs_f64(self.get_crawl_delay(host).await)
    }
}
