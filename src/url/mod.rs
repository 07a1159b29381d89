//! URL handling module
//!
//! Splits a fetch target into the pieces the robots engine and the throttle
//! key on: the host and the path.

mod domain;

pub use domain::{extract_host, robots_path};

use crate::{UrlError, UrlResult};
use url::Url;

/// A parsed URL together with its host key and robots path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// The full URL, also used verbatim as the cache key
    pub url: Url,

    /// Lowercase host, with the port when it is not the scheme default
    pub host: String,

    /// Path plus query, as matched against robots.txt rules
    pub path: String,
}

/// Parses a URL string into a [`FetchTarget`]
///
/// Only `http` and `https` URLs with a host are accepted.
///
/// # Examples
///
/// ```
/// use leadcrawl_fetch::url::parse_target;
///
/// let target = parse_target("https://Example.com/team?page=2").unwrap();
/// assert_eq!(target.host, "example.com");
/// assert_eq!(target.path, "/team?page=2");
/// ```
pub fn parse_target(raw: &str) -> UrlResult<FetchTarget> {
    let url = Url::parse(raw).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }

    let host = extract_host(&url).ok_or(UrlError::MissingHost)?;
    let path = robots_path(&url);

    Ok(FetchTarget { url, host, path })
}
