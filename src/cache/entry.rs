use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, ETAG, LAST_MODIFIED};

/// Cached HTTP metadata, and possibly the body, for one URL
///
/// An entry's existence, its freshness and whether it holds a body are
/// independent: a stale entry without a body still carries the validators
/// needed for a conditional request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Exact URL string this entry is keyed on
    pub url: String,

    /// Status of the response that created the entry
    pub status: u16,

    /// Content-Type header of the stored response
    pub content_type: Option<String>,

    /// Retained body; `None` when the response was not eligible for storage
    pub body: Option<Vec<u8>>,

    /// Opaque `ETag` validator
    pub etag: Option<String>,

    /// Opaque `Last-Modified` validator
    pub last_modified: Option<String>,

    /// When the entry was last stored or revalidated
    pub stored_at: DateTime<Utc>,

    /// Absolute freshness deadline
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Fresh means strictly before the expiry deadline
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Rebuilds the response headers this entry can vouch for
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let pairs = [
            (CONTENT_TYPE, self.content_type.as_deref()),
            (ETAG, self.etag.as_deref()),
            (LAST_MODIFIED, self.last_modified.as_deref()),
        ];
        for (name, value) in pairs {
            if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
                headers.insert(name, value);
            }
        }
        headers
    }
}
