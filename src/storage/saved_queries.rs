// Saved queries
// Named SQL snippets kept as a single JSON object

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::store::{JsonStore, StorageResult};

pub type SavedQueryMap = BTreeMap<String, String>;

pub struct SavedQueryStore {
    store: JsonStore<SavedQueryMap>,
}

impl SavedQueryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    /// All saved queries. Unreadable content is logged and reads as empty.
    pub fn get_saved_queries(&self) -> SavedQueryMap {
        match self.store.load() {
            Ok(queries) => queries,
            Err(e) => {
                tracing::warn!("Ignoring unreadable saved-queries store: {}", e);
                SavedQueryMap::new()
            }
        }
    }

    pub fn get_query(&self, name: &str) -> Option<String> {
        self.get_saved_queries().remove(name)
    }

    /// Save or overwrite a named query. Writing over a corrupt store is refused.
    pub fn save_query(&self, name: &str, sql: &str) -> StorageResult<()> {
        self.store.update(|queries| {
            queries.insert(name.to_string(), sql.to_string());
        })?;
        tracing::info!("Saved query '{}'", name);
        Ok(())
    }

    /// Remove a named query; returns whether it existed
    pub fn remove_query(&self, name: &str) -> StorageResult<bool> {
        let removed = self.store.update(|queries| queries.remove(name).is_some())?;
        if removed {
            tracing::info!("Removed saved query '{}'", name);
        }
        Ok(removed)
    }
}
