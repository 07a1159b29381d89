//! Per-host robots policy with its freshness window

use crate::clock::to_chrono;
use crate::robots::ParsedRobots;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// The robots policy held for one host
///
/// Replaced wholesale on every robots.txt fetch and read-only in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotsPolicy {
    /// When robots.txt was fetched (or the fetch failed)
    pub fetched_at: DateTime<Utc>,

    /// How long this policy stays valid from `fetched_at`
    pub ttl: Duration,

    /// Set when the last fetch hit a server error; everything is denied
    pub deny_all: bool,

    robots: ParsedRobots,
}

impl RobotsPolicy {
    /// A policy parsed from fetched robots.txt content
    pub fn parsed(robots: ParsedRobots, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            fetched_at,
            ttl,
            deny_all: false,
            robots,
        }
    }

    /// The "no restrictions" policy used when robots.txt does not exist
    pub fn allow_all(fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self::parsed(ParsedRobots::default(), fetched_at, ttl)
    }

    /// The fail-safe policy used when robots.txt could not be retrieved
    pub fn deny_all(fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            fetched_at,
            ttl,
            deny_all: true,
            robots: ParsedRobots::default(),
        }
    }

    /// A policy is stale once `fetched_at + ttl` has been reached
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match self.fetched_at.checked_add_signed(to_chrono(self.ttl)) {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    pub fn is_allowed(&self, product_token: &str, path: &str) -> bool {
        !self.deny_all && self.robots.is_allowed(product_token, path)
    }

    /// Crawl-delay in seconds from the selected group
    pub fn crawl_delay(&self, product_token: &str) -> Option<f64> {
        if self.deny_all {
            return None;
        }
        self.robots.crawl_delay(product_token)
    }

    /// Sitemap URLs declared in robots.txt
    pub fn sitemaps(&self) -> &[String] {
        &self.robots.sitemaps
    }

    /// The parsed groups, for diagnostics
    pub fn robots(&self) -> &ParsedRobots {
        &self.robots
    }
}
