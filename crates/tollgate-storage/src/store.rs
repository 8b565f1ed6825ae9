//! File-backed key/value store.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, StorageError};

/// Value written to the document's `Application` field.
pub const APPLICATION_NAME: &str = "tollgate";

/// On-disk document layout.
#[derive(Debug, Serialize, Deserialize)]
struct Document {
    #[serde(rename = "Application")]
    application: String,
    #[serde(rename = "Keys", default)]
    keys: BTreeMap<String, Value>,
}

impl Document {
    fn empty() -> Self {
        Self {
            application: APPLICATION_NAME.to_string(),
            keys: BTreeMap::new(),
        }
    }

    /// A `null` value counts as absent.
    fn contains(&self, key: &str) -> bool {
        matches!(self.keys.get(key), Some(v) if !v.is_null())
    }
}

/// JSON configuration store backed by a single file.
///
/// Every operation reads the file, applies the change, and writes it back
/// while holding one lock, so concurrent writers on the same handle never
/// lose updates. A missing file reads as an empty store.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    /// Open the store in the default app data directory.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(Self::default_path()?))
    }

    /// Open the store at a specific path. The file is created on first write.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Using config store at: {:?}", path);
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Get the default store path.
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "tollgate", "tollgate")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("store.json"))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or overwrite a key, creating the file if needed.
    pub fn create(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        doc.keys.insert(key.to_string(), value);
        self.save(&doc)?;
        debug!(key, "Stored config key");
        Ok(())
    }

    /// Read the value of a key.
    pub fn read(&self, key: &str) -> Result<Value> {
        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        if !doc.contains(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(doc.keys.remove(key).unwrap_or(Value::Null))
    }

    /// Read a key and deserialize it.
    pub fn read_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.read(key)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Overwrite an existing key. Fails with `NotFound` if it is absent.
    pub fn update(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        if !doc.contains(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        doc.keys.insert(key.to_string(), value);
        self.save(&doc)
    }

    /// Remove a key. Fails with `NotFound` if it is absent.
    pub fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        if !doc.contains(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        doc.keys.remove(key);
        self.save(&doc)
    }

    /// Reset the store to an empty document.
    pub fn delete_all(&self) -> Result<()> {
        let _guard = self.lock.lock();
        self.save(&Document::empty())
    }

    /// Remove the backing file.
    pub fn delete_store(&self) -> Result<()> {
        let _guard = self.lock.lock();
        fs::remove_file(&self.path)?;
        info!("Removed config store at: {:?}", self.path);
        Ok(())
    }

    /// All keys with non-null values, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock();
        let doc = self.load()?;
        Ok(doc
            .keys
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k)
            .collect())
    }

    fn load(&self) -> Result<Document> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::empty()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, doc: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let encoded = serde_json::to_vec(doc)?;
        fs::write(&self.path, encoded)?;
        Ok(())
    }
}
