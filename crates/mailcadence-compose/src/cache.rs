//! Fingerprint-keyed cache for derived content (the résumé text).
//!
//! Entries are keyed by the SHA-256 of the source bytes, so an edited source
//! misses the cache on its own. `invalidate` and `clear` drop entries
//! explicitly. The cache is shared by reference; nothing global.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Debug, Default)]
pub struct ContentCache {
    entries: Mutex<HashMap<String, String>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Cached value for `source`, deriving and storing it on a miss.
    pub fn get_or_derive<F>(&self, source: &[u8], derive: F) -> String
    where
        F: FnOnce(&[u8]) -> String,
    {
        let key = fingerprint(source);
        if let Some(hit) = self.get(&key) {
            tracing::debug!("🗃️ Content cache hit ({})", &key[..12]);
            return hit;
        }
        let value = derive(source);
        self.lock().insert(key, value.clone());
        value
    }

    /// Drop the entry derived from `source`. Returns whether one existed.
    pub fn invalidate(&self, source: &[u8]) -> bool {
        self.lock().remove(&fingerprint(source)).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // a poisoned map only ever holds complete entries
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
