//! Storage adapters for the Paygate SDK
//!
//! The SDK only persists one thing: the device identifier that scopes all
//! gateway listings. Where it lives is up to the host application, so
//! persistence goes through [`StorageAdapter`].

use std::collections::HashMap;
use std::sync::RwLock;

/// Storage keys
pub mod keys {
    pub const DEVICE_ID: &str = concat!("paygate:", "device_id");
}

/// Storage adapter trait for custom storage implementations
pub trait StorageAdapter: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value by key
    fn set(&self, key: &str, value: &str);

    /// Remove a value by key
    fn remove(&self, key: &str);
}

/// In-memory storage. Nothing survives the process; mostly useful for tests
/// and for hosts that persist the device id themselves.
#[derive(Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage").finish()
    }
}

/// File-based storage adapter
///
/// Keeps a write-through in-memory copy and rewrites `paygate.json` in the
/// given directory on every change.
#[cfg(feature = "native-storage")]
pub struct FileStorage {
    path: std::path::PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

#[cfg(feature = "native-storage")]
impl FileStorage {
    /// Open storage in `storage_dir`, loading any previously saved data.
    ///
    /// The directory is created if it does not exist yet; returns `None`
    /// when it cannot be created or read.
    pub fn new(storage_dir: &std::path::Path) -> Option<Self> {
        std::fs::create_dir_all(storage_dir).ok()?;

        let path = storage_dir.join("paygate.json");
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };

        Some(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self) {
        if let Ok(entries) = self.entries.read() {
            if let Ok(contents) = serde_json::to_string_pretty(&*entries) {
                let _ = std::fs::write(&self.path, contents);
            }
        }
    }
}

#[cfg(feature = "native-storage")]
impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.to_string());
        }
        self.persist();
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
        self.persist();
    }
}

#[cfg(feature = "native-storage")]
impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .finish()
    }
}
