//! `Cache-Control` directive parsing and header helpers.

use http::header::{HeaderMap, HeaderName, CACHE_CONTROL};

use crate::error::{CoreError, Result};

/// Parsed `Cache-Control` header.
///
/// All `Cache-Control` lines are joined, split on commas, and each directive
/// is stored as a lowercased name with an optional raw value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: Vec<(String, Option<String>)>,
}

impl CacheControl {
    /// Parses the `Cache-Control` header(s), or returns `None` if absent or blank.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let joined = headers
            .get_all(CACHE_CONTROL)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(",");

        if joined.trim().is_empty() {
            return None;
        }
        Some(Self::parse(&joined))
    }

    /// Parses a raw header value.
    pub fn parse(value: &str) -> Self {
        let directives = value
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|directive| match directive.split_once('=') {
                Some((name, value)) => (
                    name.trim().to_ascii_lowercase(),
                    Some(value.trim().trim_matches('"').to_string()),
                ),
                None => (directive.to_ascii_lowercase(), None),
            })
            .collect();

        Self { directives }
    }

    /// Returns true if the directive is present (with or without a value).
    pub fn has(&self, name: &str) -> bool {
        self.directives
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Returns the `max-age` value in seconds.
    ///
    /// `None` means no `max-age` directive. A directive without a value or with
    /// a non-integer value is an error.
    pub fn max_age(&self) -> Option<Result<i64>> {
        let (_, value) = self.directives.iter().find(|(n, _)| n == "max-age")?;

        Some(match value {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| CoreError::InvalidMaxAge(raw.clone())),
            None => Err(CoreError::InvalidMaxAge(String::new())),
        })
    }
}

/// Returns the first value of `name` as trimmed text, or `None` if missing or blank.
///
/// Non-UTF-8 bytes are replaced, so a garbled date still reaches the parser
/// and fails there instead of being silently skipped.
pub(crate) fn header_text(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let value = headers.get(name)?;
    let text = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
