//! Decides whether a freshly forwarded response may be stored.

use http::header::{HeaderMap, ETAG, EXPIRES, LAST_MODIFIED};

use crate::cache_control::{header_text, CacheControl};

/// Directives that forbid storing a response.
const NO_STORE_DIRECTIVES: &[&str] = &["private", "no-cache", "no-store"];

/// Returns true if a response with these headers may be cached.
///
/// Headers are checked in priority order and only the first one present
/// decides:
///
/// 1. `Cache-Control`: cacheable only with a positive `max-age` and none of
///    `private`, `no-cache`, `no-store`. A `Cache-Control` header without
///    `max-age` is not cacheable, even if validators are present.
/// 2. `Expires`
/// 3. `ETag`
/// 4. `Last-Modified`
pub fn is_cacheable(headers: &HeaderMap) -> bool {
    if let Some(cc) = CacheControl::from_headers(headers) {
        if NO_STORE_DIRECTIVES.iter().any(|d| cc.has(d)) {
            return false;
        }
        return matches!(cc.max_age(), Some(Ok(age)) if age > 0);
    }

    [EXPIRES, ETAG, LAST_MODIFIED]
        .iter()
        .any(|name| header_text(headers, name).is_some())
}
