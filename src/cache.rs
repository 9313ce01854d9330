use chrono::Local;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// One cached snapshot: the most recent full payload for a dataset plus a
/// human-readable timestamp shown as "last updated" in the dashboard.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Value,
    pub last_update: String,
}

/// Snapshot cache keyed by dataset name.
///
/// There is no TTL and no eviction policy: staleness is resolved entirely
/// by explicit invalidation (a refresh request or the sync action), which
/// keeps the cache a plain key-value service rather than ambient state.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<String, CachedEntry>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        SnapshotCache::default()
    }

    pub fn get(&self, key: &str) -> Option<CachedEntry> {
        self.entries.read().unwrap().get(key).cloned()
    }

    /// Store a snapshot, stamping it with the current local time. Returns
    /// the timestamp so callers can echo it in the response.
    pub fn set(&self, key: &str, data: Value) -> String {
        let last_update = Local::now().format("%H:%M:%S %d/%m/%Y").to_string();
        self.entries.write().unwrap().insert(
            key.to_string(),
            CachedEntry {
                data,
                last_update: last_update.clone(),
            },
        );
        last_update
    }

    pub fn clear(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
    }

    pub fn clear_all(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().unwrap().keys().cloned().collect()
    }
}
