//! Append-only log of proxied requests.

use std::sync::Arc;

use chrono::Local;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Timestamp format used in log entries.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Metadata recorded for each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    /// Local time the request arrived, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    /// Target host (with port, if given).
    pub host: String,
    /// Request method.
    pub method: String,
    /// Declared body length; -1 when unknown.
    pub content_length: i64,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub proto: String,
}

impl RequestLogEntry {
    /// Creates an entry stamped with the current local time.
    pub fn new(
        host: impl Into<String>,
        method: impl Into<String>,
        content_length: i64,
        proto: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            host: host.into(),
            method: method.into(),
            content_length,
            proto: proto.into(),
        }
    }
}

/// Shared request log. Entries are only ever appended.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    entries: Arc<RwLock<Vec<RequestLogEntry>>>,
}

impl RequestLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn append(&self, entry: RequestLogEntry) {
        self.entries.write().push(entry);
    }

    /// Returns all entries in arrival order.
    pub fn snapshot(&self) -> Vec<RequestLogEntry> {
        self.entries.read().clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
