use crate::artifacts::Artifact;
use crate::storage::KeyValueStore;

pub const HISTORY_KEY: &str = "avatar-history";
pub const MAX_HISTORY: usize = 10;

/// Bounded, most-recent-first list of generated artifacts, persisted as a JSON
/// array under [`HISTORY_KEY`].
///
/// Entries only ever leave through capacity eviction.
#[derive(Debug)]
pub struct HistoryCache<S: KeyValueStore> {
    store: S,
    entries: Vec<Artifact>,
    load_error: Option<String>,
}

impl<S: KeyValueStore> HistoryCache<S> {
    /// An empty cache that has not read storage yet.
    pub fn new(store: S) -> Self {
        Self {
            store,
            entries: Vec::new(),
            load_error: None,
        }
    }

    /// Reads persisted history. Unreadable or malformed data is recorded in
    /// [`HistoryCache::load_error`] and leaves the cache empty.
    pub fn load(store: S) -> Self {
        let mut cache = Self::new(store);
        cache.reload();
        cache
    }

    pub fn reload(&mut self) {
        self.load_error = None;
        self.entries = match self.store.get(HISTORY_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Artifact>>(&raw) {
                Ok(mut entries) => {
                    entries.truncate(MAX_HISTORY);
                    entries
                }
                Err(err) => {
                    self.load_error = Some(format!("Failed to load history: {err}"));
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                self.load_error = Some(format!("Failed to load history: {err:#}"));
                Vec::new()
            }
        };
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn entries(&self) -> &[Artifact] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn select(&self, index: usize) -> Option<&Artifact> {
        self.entries.get(index)
    }

    /// Prepends `artifact`, evicts past [`MAX_HISTORY`], and persists.
    pub fn record(&mut self, artifact: Artifact) -> anyhow::Result<()> {
        self.entries.insert(0, artifact);
        self.entries.truncate(MAX_HISTORY);
        self.persist()
    }

    /// Writes the current sequence. An empty sequence is never written, so a
    /// transient empty state cannot clobber a stored history.
    pub fn persist(&self) -> anyhow::Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let raw = serde_json::to_string(&self.entries)?;
        self.store.set(HISTORY_KEY, &raw)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::storage::{JsonFileStore, MemoryStore};

    fn artifact(idx: i64) -> Artifact {
        Artifact::new(format!("<svg>cat{idx}</svg>"), 1_000 + idx)
    }

    #[test]
    fn keeps_ten_most_recent_newest_first() -> anyhow::Result<()> {
        let mut cache = HistoryCache::load(MemoryStore::new());
        for idx in 0..15 {
            cache.record(artifact(idx))?;
        }

        let stamps: Vec<i64> = cache.entries().iter().map(|a| a.created_at).collect();
        assert_eq!(stamps, (5..15).rev().map(|idx| 1_000 + idx).collect::<Vec<_>>());

        let reloaded = HistoryCache::load(cache.store());
        assert_eq!(reloaded.entries(), cache.entries());
        Ok(())
    }

    #[test]
    fn empty_cache_never_overwrites_stored_history() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.set(HISTORY_KEY, r#"[{"svg":"<svg>cat1</svg>","timestamp":123456789}]"#)?;

        let fresh = HistoryCache::new(&store);
        assert!(fresh.is_empty());
        fresh.persist()?;

        let loaded = HistoryCache::load(&store);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].content, "<svg>cat1</svg>");
        Ok(())
    }

    #[test]
    fn malformed_history_recovers_to_empty() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.set(HISTORY_KEY, "{not json")?;

        let mut cache = HistoryCache::load(&store);
        assert!(cache.is_empty());
        assert!(cache
            .load_error()
            .is_some_and(|reason| reason.starts_with("Failed to load history")));

        cache.record(artifact(1))?;
        let raw = store.get(HISTORY_KEY)?.unwrap_or_default();
        let parsed: Value = serde_json::from_str(&raw)?;
        assert_eq!(parsed.as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[test]
    fn truncated_storage_file_records_load_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("local-storage.json");
        std::fs::write(&path, r#"{"avatar-history": "[{\"svg\":"#)?;

        let mut cache = HistoryCache::load(JsonFileStore::new(&path));
        assert!(cache.is_empty());
        assert!(cache
            .load_error()
            .is_some_and(|reason| reason.starts_with("Failed to load history")));

        cache.record(artifact(4))?;
        let reloaded = HistoryCache::load(JsonFileStore::new(&path));
        assert_eq!(reloaded.entries(), &[artifact(4)]);
        assert!(reloaded.load_error().is_none());
        Ok(())
    }

    #[test]
    fn oversized_persisted_history_is_truncated_on_load() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let many: Vec<Artifact> = (0..12).map(artifact).collect();
        store.set(HISTORY_KEY, &serde_json::to_string(&many)?)?;

        let cache = HistoryCache::load(&store);
        assert_eq!(cache.len(), MAX_HISTORY);
        assert_eq!(cache.entries()[0], artifact(0));
        Ok(())
    }

    #[test]
    fn select_does_not_reorder() -> anyhow::Result<()> {
        let mut cache = HistoryCache::load(MemoryStore::new());
        cache.record(artifact(1))?;
        cache.record(artifact(2))?;

        assert_eq!(cache.select(1), Some(&artifact(1)));
        assert_eq!(cache.select(5), None);
        assert_eq!(cache.entries(), &[artifact(2), artifact(1)]);
        Ok(())
    }

    #[test]
    fn persists_through_json_file_store() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("local-storage.json");
        let mut cache = HistoryCache::load(JsonFileStore::new(&path));
        cache.record(artifact(3))?;

        let reloaded = HistoryCache::load(JsonFileStore::new(&path));
        assert_eq!(reloaded.entries(), &[artifact(3)]);
        assert!(reloaded.load_error().is_none());
        Ok(())
    }
}
