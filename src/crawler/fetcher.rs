//! HTTP fetcher implementation
//!
//! This module handles the raw HTTP side of a fetch:
//! - Building HTTP clients with proper user agent strings
//! - Sending one GET, optionally with conditional headers
//! - Classifying the outcome for the retry loop

use crate::config::{FetchConfig, UserAgentConfig};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client};
use url::Url;

/// Redirect hops followed when fetching robots.txt
const ROBOTS_MAX_REDIRECTS: usize = 5;

/// Outcome of a single network attempt
#[derive(Debug)]
pub enum Attempt {
    /// A complete HTTP response
    Response {
        status: u16,
        headers: HeaderMap,
        body: Vec<u8>,
    },

    /// No usable response: connect failure, timeout, truncated body, ...
    Transport { error: String },
}

impl Attempt {
    /// Server errors and transport failures are worth another try
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Response { status, .. } => (500..600).contains(status),
            Self::Transport { .. } => true,
        }
    }

    /// Status of the attempt, 0 for transport failures
    pub fn status(&self) -> u16 {
        match self {
            Self::Response { status, .. } => *status,
            Self::Transport { .. } => super::result::STATUS_TRANSPORT_FAILURE,
        }
    }
}

/// Builds the page-fetching HTTP client
///
/// Redirects are not followed: a 3xx is handed back to the caller as-is.
///
/// # Example
///
/// ```no_run
/// use leadcrawl_fetch::config::{FetchConfig, UserAgentConfig};
/// use leadcrawl_fetch::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "LeadBot".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/bot".to_string(),
///     contact_email: "bot@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetch: &FetchConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(fetch.request_timeout())
        .connect_timeout(fetch.connect_timeout())
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the robots.txt client, which follows a few redirects
pub fn build_robots_client(
    user_agent: &UserAgentConfig,
    fetch: &FetchConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(fetch.request_timeout())
        .connect_timeout(fetch.connect_timeout())
        .redirect(Policy::limited(ROBOTS_MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sends one GET with the given extra headers and reads the whole body
pub async fn send_once(client: &Client, url: &Url, extra_headers: &HeaderMap) -> Attempt {
    let response = match client
        .get(url.clone())
        .headers(extra_headers.clone())
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return Attempt::Transport { error: classify_error(&e) },
    };

    let status = response.status().as_u16();
    let headers = response.headers().clone();

    match response.bytes().await {
        Ok(body) => Attempt::Response {
            status,
            headers,
            body: body.to_vec(),
        },
        Err(e) => Attempt::Transport { error: classify_error(&e) },
    }
}

/// Content-Type header value, if present and readable
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

fn classify_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        e.to_string()
    }
}
