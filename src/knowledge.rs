//! Persistent selector knowledge store.
//!
//! Maps (page context → element key → selector string). Loaded once at
//! startup, rewritten to disk in full after every successful mutation.
//! Mutations come only from discovery; lookups come from the resolver on
//! every resolve call.
//!
//! All writers funnel through a single save lock so concurrent bulk
//! discoveries for different contexts cannot interleave the whole-file
//! rewrite.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

type SelectorMap = HashMap<String, HashMap<String, String>>;

/// Durable (context, element) → selector mapping with failure decay.
pub struct KnowledgeStore {
    path: PathBuf,
    map: RwLock<SelectorMap>,
    /// Consecutive-failure counters, in-memory only.
    failures: DashMap<(String, String), u32>,
    save_lock: Mutex<()>,
    purge_threshold: u32,
}

impl KnowledgeStore {
    /// Create an empty store backed by `path`. Does not touch the disk.
    pub fn new(path: impl Into<PathBuf>, purge_threshold: u32) -> Self {
        Self {
            path: path.into(),
            map: RwLock::new(HashMap::new()),
            failures: DashMap::new(),
            save_lock: Mutex::new(()),
            purge_threshold,
        }
    }

    /// Create a store and load the on-disk snapshot if one exists.
    pub fn open(path: impl Into<PathBuf>, purge_threshold: u32) -> Self {
        let store = Self::new(path, purge_threshold);
        store.load();
        store
    }

    /// Load the snapshot from disk into memory.
    ///
    /// A missing file or parse failure initializes to an empty mapping and
    /// never raises.
    pub fn load(&self) {
        let loaded: SelectorMap = match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!(
                        "knowledge snapshot at {} is corrupt ({e}); starting empty",
                        self.path.display()
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        *self.map.write() = loaded;
    }

    /// Atomically rewrite the on-disk snapshot from the in-memory mapping.
    ///
    /// I/O failure is logged and leaves in-memory state intact; it is never
    /// fatal to the caller.
    pub fn save(&self) {
        let _guard = self.save_lock.lock();

        let snapshot = self.map.read().clone();
        let serialized = match serde_json::to_string_pretty(&snapshot) {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to serialize knowledge snapshot: {e}");
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    log::error!("failed to create {}: {e}", parent.display());
                    return;
                }
            }
        }

        // Write to a sibling temp file, then rename over the snapshot.
        let tmp = self.path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, serialized) {
            log::error!("failed to write {}: {e}", tmp.display());
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            log::error!("failed to replace {}: {e}", self.path.display());
        }
    }

    /// Cached selector for (context, element), if any.
    pub fn get(&self, context: &str, element: &str) -> Option<String> {
        self.map.read().get(context)?.get(element).cloned()
    }

    /// Insert or overwrite one selector, then persist.
    ///
    /// Called only by discovery. Resets the entry's failure counter.
    pub fn upsert(&self, context: &str, element: &str, selector: &str) {
        {
            let mut map = self.map.write();
            map.entry(context.to_string())
                .or_default()
                .insert(element.to_string(), selector.to_string());
        }
        self.failures
            .remove(&(context.to_string(), element.to_string()));
        self.save();
    }

    /// Insert or overwrite several selectors under one context with a
    /// single persist. Returns the number of entries written.
    pub fn upsert_batch(&self, context: &str, entries: &HashMap<String, String>) -> usize {
        if entries.is_empty() {
            return 0;
        }
        {
            let mut map = self.map.write();
            let ctx = map.entry(context.to_string()).or_default();
            for (element, selector) in entries {
                ctx.insert(element.clone(), selector.clone());
            }
        }
        for element in entries.keys() {
            self.failures
                .remove(&(context.to_string(), element.clone()));
        }
        self.save();
        entries.len()
    }

    /// All element keys currently known under a context.
    pub fn context_keys(&self, context: &str) -> Vec<String> {
        self.map
            .read()
            .get(context)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Record a selector failure. After the purge threshold is hit the
    /// entry is removed from the store so discovery starts fresh.
    ///
    /// Returns the consecutive-failure count for the entry.
    pub fn record_failure(&self, context: &str, element: &str) -> u32 {
        if self.get(context, element).is_none() {
            return 0;
        }

        let key = (context.to_string(), element.to_string());
        let failures = {
            let mut counter = self.failures.entry(key.clone()).or_insert(0);
            *counter = counter.saturating_add(1);
            *counter
        };

        if failures >= self.purge_threshold {
            log::warn!(
                "selector '{element}' in '{context}' failed {failures} times; purging stale entry"
            );
            {
                let mut map = self.map.write();
                if let Some(ctx) = map.get_mut(context) {
                    ctx.remove(element);
                    if ctx.is_empty() {
                        map.remove(context);
                    }
                }
            }
            self.failures.remove(&key);
            self.save();
        } else {
            log::debug!(
                "failure {failures}/{} recorded for '{element}' in '{context}'",
                self.purge_threshold
            );
        }
        failures
    }

    /// Number of selectors across all contexts.
    pub fn len(&self) -> usize {
        self.map.read().values().map(|m| m.len()).sum()
    }

    /// Whether the store holds no selectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot path this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, KnowledgeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open(dir.path().join("knowledge.json"), 3);
        (dir, store)
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let (_dir, store) = temp_store();
        assert!(store.is_empty());
        assert!(store.get("match_page", "home_score").is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(&path, "{not valid json").unwrap();

        let store = KnowledgeStore::open(&path, 3);
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_get_and_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");

        {
            let store = KnowledgeStore::open(&path, 3);
            store.upsert("match_page", "home_score", ".score-home");
            assert_eq!(
                store.get("match_page", "home_score").as_deref(),
                Some(".score-home")
            );
        }

        // Fresh instance reads the persisted snapshot.
        let reloaded = KnowledgeStore::open(&path, 3);
        assert_eq!(
            reloaded.get("match_page", "home_score").as_deref(),
            Some(".score-home")
        );
    }

    #[test]
    fn test_upsert_overwrites_single_active_selector() {
        let (_dir, store) = temp_store();
        store.upsert("match_page", "home_score", ".old");
        store.upsert("match_page", "home_score", ".new");

        assert_eq!(store.get("match_page", "home_score").as_deref(), Some(".new"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_upsert_batch_saves_once() {
        let (_dir, store) = temp_store();
        let mut entries = HashMap::new();
        entries.insert("home_score".to_string(), ".h".to_string());
        entries.insert("away_score".to_string(), ".a".to_string());

        assert_eq!(store.upsert_batch("match_page", &entries), 2);
        assert_eq!(store.len(), 2);

        let mut keys = store.context_keys("match_page");
        keys.sort();
        assert_eq!(keys, vec!["away_score", "home_score"]);
    }

    #[test]
    fn test_failure_decay_purges_after_threshold() {
        let (_dir, store) = temp_store();
        store.upsert("match_page", "home_score", ".score");

        assert_eq!(store.record_failure("match_page", "home_score"), 1);
        assert!(store.get("match_page", "home_score").is_some());
        assert_eq!(store.record_failure("match_page", "home_score"), 2);
        assert!(store.get("match_page", "home_score").is_some());
        assert_eq!(store.record_failure("match_page", "home_score"), 3);
        assert!(store.get("match_page", "home_score").is_none());
        assert!(store.context_keys("match_page").is_empty());
    }

    #[test]
    fn test_failure_on_absent_entry_is_noop() {
        let (_dir, store) = temp_store();
        assert_eq!(store.record_failure("nowhere", "nothing"), 0);
    }

    #[test]
    fn test_upsert_resets_failure_counter() {
        let (_dir, store) = temp_store();
        store.upsert("match_page", "home_score", ".score");
        store.record_failure("match_page", "home_score");
        store.record_failure("match_page", "home_score");

        // A successful re-discovery clears the decay.
        store.upsert("match_page", "home_score", ".score-v2");
        assert_eq!(store.record_failure("match_page", "home_score"), 1);
        assert!(store.get("match_page", "home_score").is_some());
    }

    #[test]
    fn test_save_failure_keeps_memory_state() {
        // Point the store at an unwritable path; save logs and moves on.
        let store = KnowledgeStore::new("/proc/selector_heal_nope/knowledge.json", 3);
        store.upsert("ctx", "key", ".sel");
        assert_eq!(store.get("ctx", "key").as_deref(), Some(".sel"));
    }
}
