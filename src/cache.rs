//! Synchronous key/value cache used as the offline fallback for tags.
//!
//! Implementations:
//! - `MemoryCache` - process-local, for tests
//! - `FileCache` - one JSON object file on disk, read and written whole

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Cache key holding the serialized tag list.
pub const TAGS_CACHE_KEY: &str = "lieux:tags_v1";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to write cache file '{0}': {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to encode cache: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Local string key/value persistence. Access never suspends.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

/// Cache persisted as a JSON object file.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries. A missing or unreadable file is an empty cache.
    fn read_entries(&self) -> BTreeMap<String, String> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache file {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Write(parent.into(), e))?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents).map_err(|e| CacheError::Write(self.path.clone(), e))
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_entries().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_entries();
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_entries();
        if entries.remove(key).is_some() {
            if let Err(e) = self.write_entries(&entries) {
                tracing::warn!("Failed to remove cache key {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k"), None);
        cache.set("k", "v").unwrap();
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        cache.remove("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_file_cache_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("cache.json");

        let cache = FileCache::new(&path);
        cache.set(TAGS_CACHE_KEY, "[]").unwrap();
        cache.set("other", "x").unwrap();

        let reopened = FileCache::new(&path);
        assert_eq!(reopened.get(TAGS_CACHE_KEY).as_deref(), Some("[]"));

        reopened.remove(TAGS_CACHE_KEY);
        assert_eq!(cache.get(TAGS_CACHE_KEY), None);
        assert_eq!(cache.get("other").as_deref(), Some("x"));
    }

    #[test]
    fn test_file_cache_tolerates_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = FileCache::new(&path);
        assert_eq!(cache.get("k"), None);
        cache.set("k", "v").unwrap();
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }
}
