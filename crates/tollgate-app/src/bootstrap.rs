//! Startup state: config store and initial blacklist.

use std::path::PathBuf;
use std::sync::Arc;

use tollgate_server::BLACKLIST_KEY;
use tollgate_storage::{ConfigStore, StorageError};

/// Opens the store at `path`, or in the data directory when `None`.
///
/// Returns `None` (no persistence) when no data directory is available.
pub fn open_store(path: Option<PathBuf>) -> Option<Arc<ConfigStore>> {
    let store = match path {
        Some(path) => ConfigStore::with_path(path),
        None => match ConfigStore::new() {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("Blacklist changes will not be persisted: {}", e);
                return None;
            }
        },
    };
    Some(Arc::new(store))
}

/// Patterns to start with: the persisted blacklist if there is one,
/// otherwise `fallback`.
pub fn initial_blacklist(store: Option<&ConfigStore>, fallback: &[String]) -> Vec<String> {
    let Some(store) = store else {
        return fallback.to_vec();
    };

    match store.read_as::<Vec<String>>(BLACKLIST_KEY) {
        Ok(saved) => {
            tracing::info!("Loaded {} blacklist patterns from store", saved.len());
            saved
        }
        Err(StorageError::NotFound(_)) => fallback.to_vec(),
        Err(e) => {
            tracing::warn!("Failed to load blacklist from store: {}", e);
            fallback.to_vec()
        }
    }
}
