//! Tollgate Storage - JSON file configuration store.
//!
//! Settings that outlive the process (currently the blacklist) are kept in a
//! single JSON document:
//!
//! ```json
//! {"Application": "tollgate", "Keys": {"blacklist": ["ads.example"]}}
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tollgate_storage::ConfigStore;
//! use serde_json::json;
//!
//! let store = ConfigStore::with_path("store.json");
//! store.create("blacklist", json!(["ads.example"])).unwrap();
//!
//! let list: Vec<String> = store.read_as("blacklist").unwrap();
//! assert_eq!(list, vec!["ads.example"]);
//! ```

pub mod error;
mod store;

pub use error::{Result, StorageError};
pub use store::{ConfigStore, APPLICATION_NAME};
