//! Freshness evaluation for cached responses.
//!
//! A cached entry is fresh when its own headers prove it (`max-age` counted
//! from `Date`, or a future `Expires`), or when the origin confirms it with a
//! `304 Not Modified` to a conditional `HEAD` request. Everything else is
//! stale. Unparseable headers are errors, never silently stale, so the caller
//! can report them.
//!
//! ```text
//! Cache-Control max-age + Date ──► now < Date + max-age ?
//!            │ (no max-age)                 │ no
//!            ▼                              ▼
//!        Expires ──► now < Expires ?  ──►  ETag ──► HEAD If-None-Match ──► 304 ?
//!                                          │ (none)
//!                                          ▼
//!                                   Last-Modified ──► HEAD If-Modified-Since ──► 304 ?
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use http::header::{
    HeaderMap, HeaderName, DATE, ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use http::StatusCode;
use tracing::debug;

use crate::cache::CacheEntry;
use crate::cache_control::{header_text, CacheControl};
use crate::error::{CoreError, Result};

/// Outcome of a freshness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The cached body may be served as is.
    Fresh,
    /// The response must be fetched again.
    Stale,
}

impl Freshness {
    /// Returns true for [`Freshness::Fresh`].
    pub fn is_fresh(self) -> bool {
        matches!(self, Freshness::Fresh)
    }
}

/// Validator used for a conditional revalidation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// Entity tag, sent as `If-None-Match`.
    ETag(String),
    /// Modification date, sent as `If-Modified-Since`.
    LastModified(String),
}

impl Validator {
    /// Picks the validator from cached headers. `ETag` wins over `Last-Modified`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        if let Some(etag) = header_text(headers, &ETAG) {
            return Some(Validator::ETag(etag));
        }
        header_text(headers, &LAST_MODIFIED).map(Validator::LastModified)
    }

    /// Conditional request header carrying this validator.
    pub fn header_name(&self) -> HeaderName {
        match self {
            Validator::ETag(_) => IF_NONE_MATCH,
            Validator::LastModified(_) => IF_MODIFIED_SINCE,
        }
    }

    /// Raw validator value.
    pub fn value(&self) -> &str {
        match self {
            Validator::ETag(v) | Validator::LastModified(v) => v,
        }
    }
}

/// Issues conditional requests to the origin.
#[async_trait]
pub trait Revalidator: Send + Sync {
    /// Sends a conditional `HEAD` to `uri` and returns the response status.
    async fn revalidate(&self, uri: &str, validator: &Validator) -> Result<StatusCode>;
}

/// Revalidator backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpRevalidator {
    client: reqwest::Client,
}

impl HttpRevalidator {
    /// Creates a revalidator sharing an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Revalidator for HttpRevalidator {
    async fn revalidate(&self, uri: &str, validator: &Validator) -> Result<StatusCode> {
        let response = self
            .client
            .head(uri)
            .header(validator.header_name(), validator.value())
            .send()
            .await?;
        Ok(response.status())
    }
}

/// Decides whether cached entries may be served without refetching.
#[derive(Clone)]
pub struct FreshnessEvaluator {
    revalidator: Arc<dyn Revalidator>,
}

impl std::fmt::Debug for FreshnessEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreshnessEvaluator").finish_non_exhaustive()
    }
}

impl FreshnessEvaluator {
    /// Creates an evaluator using the given revalidator.
    pub fn new(revalidator: Arc<dyn Revalidator>) -> Self {
        Self { revalidator }
    }

    /// Creates an evaluator that revalidates over HTTP with `client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self::new(Arc::new(HttpRevalidator::with_client(client)))
    }

    /// Evaluates `entry` against the current time.
    pub async fn evaluate(&self, entry: &CacheEntry) -> Result<Freshness> {
        self.evaluate_at(entry, SystemTime::now()).await
    }

    /// Evaluates `entry` as of `now`.
    pub async fn evaluate_at(&self, entry: &CacheEntry, now: SystemTime) -> Result<Freshness> {
        if check_lifetime(&entry.meta.headers, now)?.is_fresh() {
            return Ok(Freshness::Fresh);
        }

        let Some(validator) = Validator::from_headers(&entry.meta.headers) else {
            return Ok(Freshness::Stale);
        };

        let status = self.revalidator.revalidate(&entry.key, &validator).await?;
        debug!(
            uri = %entry.key,
            header = %validator.header_name(),
            status = status.as_u16(),
            "Revalidated cached response"
        );

        Ok(if status == StatusCode::NOT_MODIFIED {
            Freshness::Fresh
        } else {
            Freshness::Stale
        })
    }
}

/// Checks the explicit lifetime of a response without contacting the origin.
///
/// With `Cache-Control: max-age=N` and a `Date`, the response is fresh while
/// `now < Date + N`. Otherwise a future `Expires` makes it fresh. Anything
/// else is stale here; validators are handled by [`FreshnessEvaluator`].
pub fn check_lifetime(headers: &HeaderMap, now: SystemTime) -> Result<Freshness> {
    let date = header_text(headers, &DATE);

    if let (Some(cc), Some(date)) = (CacheControl::from_headers(headers), date) {
        if let Some(max_age) = cc.max_age() {
            let max_age = max_age?;
            let date = parse_date("Date", &date)?;
            let expires_at = offset(date, max_age);
            return Ok(if now < expires_at {
                Freshness::Fresh
            } else {
                Freshness::Stale
            });
        }
    }

    if let Some(expires) = header_text(headers, &EXPIRES) {
        let expires = parse_date("Expires", &expires)?;
        if now < expires {
            return Ok(Freshness::Fresh);
        }
    }

    Ok(Freshness::Stale)
}

fn parse_date(header: &'static str, value: &str) -> Result<SystemTime> {
    httpdate::parse_http_date(value).map_err(|_| CoreError::InvalidDate {
        header,
        value: value.to_string(),
    })
}

fn offset(base: SystemTime, seconds: i64) -> SystemTime {
    let delta = Duration::from_secs(seconds.unsigned_abs());
    let shifted = if seconds >= 0 {
        base.checked_add(delta)
    } else {
        base.checked_sub(delta)
    };
    shifted.unwrap_or(base)
}
