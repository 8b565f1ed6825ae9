//! Application state for the API server.

use std::sync::Arc;

use tollgate_core::{Blacklist, RequestLog};
use tollgate_storage::ConfigStore;

/// Store key holding the persisted blacklist.
pub const BLACKLIST_KEY: &str = "blacklist";

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Blacklist shared with the proxy.
    pub blacklist: Blacklist,
    /// Request log shared with the proxy.
    pub request_log: RequestLog,
    /// Where blacklist changes are persisted, if anywhere.
    pub store: Option<Arc<ConfigStore>>,
}

impl AppState {
    /// Creates state over handles shared with the proxy.
    pub fn new(blacklist: Blacklist, request_log: RequestLog) -> Self {
        Self {
            blacklist,
            request_log,
            store: None,
        }
    }

    /// Persists blacklist changes to `store`.
    pub fn with_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }
}
