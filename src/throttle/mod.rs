//! Per-host request pacing
//!
//! Normal responses space the next request by the host's crawl-delay.
//! Anti-automation responses (429, 403) schedule an exponential cool-off
//! that grows with each consecutive strike.

mod state;

pub use state::{backoff, ThrottleState};

use crate::clock::Clock;
use crate::config::ThrottleConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// Source of the crawl-delay applied after a normal response
#[async_trait]
pub trait CrawlDelay: Send + Sync {
    async fn crawl_delay(&self, host: &str) -> Duration;
}

/// A crawl-delay that is the same for every host
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

#[async_trait]
impl CrawlDelay for FixedDelay {
    async fn crawl_delay(&self, _host: &str) -> Duration {
        self.0
    }
}

/// Whether a status is an anti-automation signal
pub fn is_waf_status(status: u16) -> bool {
    matches!(status, 403 | 429)
}

/// Exclusive right to pace one request to a host
///
/// Held from `wait_for_turn` until the response has been recorded, so two
/// concurrent fetches to one host cannot both slip through the same delay.
pub struct HostTurn {
    _guard: OwnedMutexGuard<()>,
}

/// Process-wide per-host scheduler
pub struct Throttle {
    hosts: Mutex<HashMap<String, ThrottleState>>,
    turns: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    delays: Arc<dyn CrawlDelay>,
    config: ThrottleConfig,
    clock: Arc<dyn Clock>,
}

impl Throttle {
    pub fn new(config: ThrottleConfig, delays: Arc<dyn CrawlDelay>, clock: Arc<dyn Clock>) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            turns: Mutex::new(HashMap::new()),
            delays,
            config,
            clock,
        }
    }

    /// Waits for exclusive pacing rights on `host`
    pub async fn acquire_turn(&self, host: &str) -> HostTurn {
        let gate = {
            let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(turns.entry(host.to_string()).or_default())
        };
        HostTurn {
            _guard: gate.lock_owned().await,
        }
    }

    /// Sleeps until `host` may be contacted and returns how long that took
    pub async fn wait_for_turn(&self, host: &str) -> Duration {
        let wait = self
            .lock_hosts()
            .get(host)
            .map_or(Duration::ZERO, |state| state.wait_at(self.clock.now()));

        if !wait.is_zero() {
            tracing::debug!("Waiting {:?} before contacting {}", wait, host);
            self.clock.sleep(wait).await;
        }
        wait
    }

    /// Records a normal response: spaces by crawl-delay and clears strikes
    pub async fn mark_ok(&self, host: &str) -> Duration {
        let delay = self.delays.crawl_delay(host).await;
        let now = self.clock.now();
        self.lock_hosts()
            .entry(host.to_string())
            .or_default()
            .record_ok(now, delay);
        delay
    }

    /// Records any response and returns the delay scheduled for the next one
    ///
    /// # Arguments
    ///
    /// * `host` - The host key the request went to
    /// * `status` - Final HTTP status, or 0 when no response arrived
    ///
    /// # Returns
    ///
    /// * The WAF cool-off for a 429/403, with the strike count incremented
    /// * The crawl-delay for anything else, with strikes cleared
    pub async fn after_response(&self, host: &str, status: u16) -> Duration {
        if !is_waf_status(status) {
            return self.mark_ok(host).await;
        }

        let now = self.clock.now();
        let mut hosts = self.lock_hosts();
        let state = hosts.entry(host.to_string()).or_default();
        let delay = state.record_strike(
            now,
            self.config.base_backoff(),
            self.config.max_backoff(),
        );
        tracing::warn!(
            "{} answered {} (strike {}); cooling off for {:?}",
            host,
            status,
            state.strike_count,
            delay
        );
        delay
    }

    /// Resets one host, or every host when `host` is `None`
    pub fn clear(&self, host: Option<&str>) {
        let mut hosts = self.lock_hosts();
        match host {
            Some(host) => {
                hosts.remove(host);
            }
            None => hosts.clear(),
        }
    }

    /// Read-only snapshot of a host's pacing state
    pub fn state(&self, host: &str) -> Option<ThrottleState> {
        self.lock_hosts().get(host).cloned()
    }

    fn lock_hosts(&self) -> MutexGuard<'_, HashMap<String, ThrottleState>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
