//! Tollgate Core - response caching, freshness, and blacklist logic.
//!
//! This crate holds the decision logic behind the Tollgate forward proxy:
//!
//! - [`lru::LruCache`]: fixed-capacity map with least-recently-used eviction
//! - [`cache::SharedCache`]: the proxy's response cache, guarded by one mutex
//! - [`cacheability::is_cacheable`]: whether a fresh response may be stored
//! - [`freshness::FreshnessEvaluator`]: whether a stored response may be served
//! - [`blacklist::Blacklist`]: host substring blocking
//! - [`request_log::RequestLog`]: append-only request metadata
//!
//! ## Example
//!
//! ```
//! use std::num::NonZeroUsize;
//! use bytes::Bytes;
//! use http::{HeaderMap, StatusCode, Version};
//! use tollgate_core::{CacheEntry, ResponseMeta, SharedCache};
//!
//! let cache = SharedCache::new(NonZeroUsize::new(2).unwrap());
//! let meta = ResponseMeta::new(StatusCode::OK, Version::HTTP_11, HeaderMap::new());
//! cache.set(CacheEntry::new("http://example.com/", meta, Bytes::from_static(b"hi")));
//!
//! assert!(cache.get("http://example.com/").is_some());
//! ```

pub mod blacklist;
pub mod cache;
pub mod cache_control;
pub mod cacheability;
pub mod error;
pub mod freshness;
pub mod lru;
pub mod request_log;

pub use blacklist::Blacklist;
pub use cache::{CacheEntry, ResponseMeta, SharedCache, DEFAULT_CACHE_CAPACITY};
pub use cache_control::CacheControl;
pub use cacheability::is_cacheable;
pub use error::{CoreError, Result};
pub use freshness::{
    check_lifetime, Freshness, FreshnessEvaluator, HttpRevalidator, Revalidator, Validator,
};
pub use lru::LruCache;
pub use request_log::{RequestLog, RequestLogEntry};
