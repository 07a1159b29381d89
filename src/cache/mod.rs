//! Response cache
//!
//! Keyed by the exact URL string. Stores validators for every response and
//! bodies only for successful, storable, allow-listed responses under the
//! configured size cap. Nothing is evicted: size is bounded by not storing
//! bodies rather than by removing entries.

mod directives;
mod entry;

pub use directives::{compute_expiry, CacheDirectives};
pub use entry::CacheEntry;

use crate::clock::Clock;
use crate::config::CacheConfig;
use reqwest::header::{
    HeaderMap, HeaderValue, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Process-wide response cache
///
/// All mutation goes through `store_200`/`store_304`; each update is applied
/// under a single write lock, so a racing `store_304` and `store_200` for the
/// same URL never observe a half-written entry. Last writer wins.
pub struct Cache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl Cache {
    /// Creates an empty cache
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// Stores a full (non-304) response
    ///
    /// Validators are always recorded. The body is retained only when the
    /// status is 200, Cache-Control does not forbid storage, the media type is
    /// allow-listed and the body fits under the size cap.
    ///
    /// # Arguments
    ///
    /// * `url` - The exact URL string the entry is keyed on
    /// * `status` - Status of the response being stored
    /// * `content_type` - The response's Content-Type header, if any
    /// * `body` - The full response body
    /// * `headers` - Response headers (Cache-Control, Expires, ETag, Last-Modified)
    ///
    /// # Returns
    ///
    /// The entry now held for `url`, replacing any previous one
    pub fn store_200(
        &self,
        url: &str,
        status: u16,
        content_type: Option<&str>,
        body: &[u8],
        headers: &HeaderMap,
    ) -> CacheEntry {
        let stored_at = self.clock.now();
        let directives = CacheDirectives::from_headers(headers);
        let expires_at = compute_expiry(headers, stored_at, self.config.default_ttl());

        let retain = status == 200
            && !directives.forbids_storage()
            && self.is_cacheable_type(content_type)
            && body.len() <= self.config.max_body_bytes;

        let entry = CacheEntry {
            url: url.to_string(),
            status,
            content_type: content_type.map(str::to_string),
            body: retain.then(|| body.to_vec()),
            etag: header_string(headers, ETAG),
            last_modified: header_string(headers, LAST_MODIFIED),
            stored_at,
            expires_at,
        };

        tracing::debug!(
            "Cached {} (status {}, body retained: {}, expires {})",
            url,
            status,
            retain,
            entry.expires_at
        );

        self.write().insert(url.to_string(), entry.clone());
        entry
    }

    /// Applies a 304 Not Modified to an existing entry
    ///
    /// Returns `None` when there is nothing to revalidate. The stored body is
    /// always kept; expiry is recomputed from the 304's own headers and the
    /// validators are replaced only when the 304 supplies new ones.
    pub fn store_304(&self, url: &str, headers: &HeaderMap) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut entries = self.write();

        let Some(entry) = entries.get_mut(url) else {
            tracing::debug!("Ignoring 304 for uncached URL {}", url);
            return None;
        };

        entry.stored_at = now;
        entry.expires_at = compute_expiry(headers, now, self.config.default_ttl());
        if let Some(etag) = header_string(headers, ETAG) {
            entry.etag = Some(etag);
        }
        if let Some(last_modified) = header_string(headers, LAST_MODIFIED) {
            entry.last_modified = Some(last_modified);
        }

        Some(entry.clone())
    }

    /// Looks up an entry and reports whether it is fresh now
    pub fn get(&self, url: &str) -> (Option<CacheEntry>, bool) {
        let now = self.clock.now();
        match self.read().get(url) {
            Some(entry) => {
                let fresh = entry.is_fresh_at(now);
                (Some(entry.clone()), fresh)
            }
            None => (None, false),
        }
    }

    /// Conditional request headers for a cached URL
    ///
    /// Empty when the URL is unknown or has no validators.
    pub fn conditionals(&self, url: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let entries = self.read();
        let Some(entry) = entries.get(url) else {
            return headers;
        };

        if let Some(value) = entry
            .etag
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            headers.insert(IF_NONE_MATCH, value);
        }
        if let Some(value) = entry
            .last_modified
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            headers.insert(IF_MODIFIED_SINCE, value);
        }
        headers
    }

    /// Read-only snapshot of an entry, without freshness evaluation
    pub fn entry(&self, url: &str) -> Option<CacheEntry> {
        self.read().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drops every entry
    pub fn clear(&self) {
        self.write().clear();
    }

    fn is_cacheable_type(&self, content_type: Option<&str>) -> bool {
        let Some(content_type) = content_type else {
            return false;
        };
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();

        self.config
            .cacheable_content_types
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(media_type))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
