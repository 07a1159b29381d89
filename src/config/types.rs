use serde::Deserialize;
use std::time::Duration;

use crate::clock::secs_f64;

/// Main configuration structure for the fetch layer
///
/// Read once at startup and treated as immutable for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Config {
    /// Builds a configuration with default settings for every section
    pub fn with_user_agent(user_agent: UserAgentConfig) -> Self {
        Self {
            user_agent,
            cache: CacheConfig::default(),
            robots: RobotsConfig::default(),
            throttle: ThrottleConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Product token, matched against robots.txt `User-agent` groups
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the outbound User-Agent header
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    /// The token used for robots.txt group matching
    pub fn product_token(&self) -> &str {
        &self.crawler_name
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness lifetime when a response carries no max-age or Expires
    #[serde(rename = "default-ttl-secs")]
    pub default_ttl_secs: u64,

    /// Largest body that will be retained, in bytes
    #[serde(rename = "max-body-bytes")]
    pub max_body_bytes: usize,

    /// Media types whose bodies may be retained
    #[serde(rename = "cacheable-content-types")]
    pub cacheable_content_types: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3600,
            max_body_bytes: 2 * 1024 * 1024,
            cacheable_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
                "text/plain".to_string(),
            ],
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Robots.txt policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotsConfig {
    /// Crawl-delay used when the selected group specifies none (seconds)
    #[serde(rename = "default-crawl-delay")]
    pub default_crawl_delay: f64,

    /// How long a successfully fetched policy is reused
    #[serde(rename = "policy-ttl-secs")]
    pub policy_ttl_secs: u64,

    /// How long a deny-all policy is kept after a server error
    #[serde(rename = "deny-ttl-secs")]
    pub deny_ttl_secs: u64,

    /// Scheme used to fetch `/robots.txt`
    pub scheme: String,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            default_crawl_delay: 1.0,
            policy_ttl_secs: 24 * 60 * 60,
            deny_ttl_secs: 10 * 60,
            scheme: "https".to_string(),
        }
    }
}

impl RobotsConfig {
    pub fn policy_ttl(&self) -> Duration {
        Duration::from_secs(self.policy_ttl_secs)
    }

    pub fn deny_ttl(&self) -> Duration {
        Duration::from_secs(self.deny_ttl_secs)
    }
}

/// WAF cool-off configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Backoff after the first strike (seconds)
    #[serde(rename = "base-backoff-secs")]
    pub base_backoff_secs: f64,

    /// Upper bound for the backoff (seconds)
    #[serde(rename = "max-backoff-secs")]
    pub max_backoff_secs: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_backoff_secs: 30.0,
            max_backoff_secs: 15.0 * 60.0,
        }
    }
}

impl ThrottleConfig {
    pub fn base_backoff(&self) -> Duration {
        secs_f64(self.base_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        secs_f64(self.max_backoff_secs)
    }
}

/// Network request and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Total attempts for a request that keeps failing with 5xx/transport errors
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Sleep before the second attempt; doubles for each further attempt
    #[serde(rename = "retry-base-secs")]
    pub retry_base_secs: f64,

    /// Overall timeout for a single network request
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: f64,

    /// Timeout for establishing a connection
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: f64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_secs: 0.5,
            request_timeout_secs: 30.0,
            connect_timeout_secs: 10.0,
        }
    }
}

impl FetchConfig {
    pub fn retry_base(&self) -> Duration {
        secs_f64(self.retry_base_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        secs_f64(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        secs_f64(self.connect_timeout_secs)
    }
}
