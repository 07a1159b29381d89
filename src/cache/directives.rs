//! Cache-Control parsing and freshness-lifetime computation
//!
//! Malformed directives never fail: anything that cannot be understood is
//! treated as absent.

use crate::clock::to_chrono;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CACHE_CONTROL, EXPIRES};
use std::time::Duration;

/// The Cache-Control directives this cache acts on
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheDirectives {
    /// `max-age=N`, first well-formed occurrence
    pub max_age: Option<u64>,

    /// `no-store`: never retain the body, entry is immediately stale
    pub no_store: bool,

    /// `no-cache`: the body may be kept but must be revalidated before use
    pub no_cache: bool,
}

impl CacheDirectives {
    /// Parses every Cache-Control header in `headers`
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut directives = Self::default();
        for value in headers.get_all(CACHE_CONTROL) {
            if let Ok(value) = value.to_str() {
                directives.merge(value);
            }
        }
        directives
    }

    /// Parses a single Cache-Control header value
    ///
    /// # Examples
    ///
    /// ```
    /// use leadcrawl_fetch::cache::CacheDirectives;
    ///
    /// let d = CacheDirectives::parse("public, Max-Age=\"60\"");
    /// assert_eq!(d.max_age, Some(60));
    /// assert!(!d.no_store);
    /// ```
    pub fn parse(value: &str) -> Self {
        let mut directives = Self::default();
        directives.merge(value);
        directives
    }

    fn merge(&mut self, value: &str) {
        for directive in value.split(',') {
            let (name, arg) = match directive.split_once('=') {
                Some((name, arg)) => (name, Some(arg.trim().trim_matches('"'))),
                None => (directive, None),
            };

            match name.trim().to_ascii_lowercase().as_str() {
                "no-store" => self.no_store = true,
                "no-cache" => self.no_cache = true,
                "max-age" if self.max_age.is_none() => {
                    self.max_age = arg.and_then(|a| a.parse::<u64>().ok());
                }
                // s-maxage only applies to shared caches; private, public and
                // anything unknown do not change how this cache behaves
                _ => {}
            }
        }
    }

    /// Whether the response may be retained at all
    pub fn forbids_storage(&self) -> bool {
        self.no_store
    }
}

/// Computes the absolute freshness deadline for a response stored at `stored_at`
///
/// Precedence: `no-store`/`no-cache` make the entry immediately stale, then
/// `max-age`, then an `Expires` header, then `default_ttl`.
pub fn compute_expiry(
    headers: &HeaderMap,
    stored_at: DateTime<Utc>,
    default_ttl: Duration,
) -> DateTime<Utc> {
    let directives = CacheDirectives::from_headers(headers);

    if directives.no_store || directives.no_cache {
        return stored_at;
    }

    if let Some(max_age) = directives.max_age {
        return add_saturating(stored_at, Duration::from_secs(max_age));
    }

    if let Some(expires) = parse_expires(headers) {
        return expires;
    }

    add_saturating(stored_at, default_ttl)
}

/// Parses the `Expires` header as an HTTP-date; invalid dates are absent
///
/// Accepts IMF-fixdate as well as the obsolete RFC 850 and asctime forms.
fn parse_expires(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get(EXPIRES)?.to_str().ok()?;
    httpdate::parse_http_date(value.trim())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn add_saturating(at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    at.checked_add_signed(to_chrono(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
