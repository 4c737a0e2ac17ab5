// Connection aliases
// Short names mapped to full connection strings, resolved before a provider connects

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::store::{JsonStore, StorageResult};

pub type AliasMap = BTreeMap<String, String>;

/// Entry written when the alias file is first created, so operators have a template to edit
pub const PLACEHOLDER_ALIAS: (&str, &str) = (
    "ExampleAlias",
    "Server=localhost;Database=master;User Id=sa;Password=changeme;TrustServerCertificate=true;",
);

pub struct AliasResolver {
    store: JsonStore<AliasMap>,
}

impl AliasResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.store.path()
    }

    /// Read the alias mapping. Never fails: a missing store is created with a
    /// placeholder and reads as empty, a corrupt one is logged and reads as empty.
    pub fn get_aliases(&self) -> AliasMap {
        if !self.store.exists() {
            let placeholder = AliasMap::from([(PLACEHOLDER_ALIAS.0.to_string(), PLACEHOLDER_ALIAS.1.to_string())]);
            match self.store.save(&placeholder) {
                Ok(()) => tracing::info!("Created alias store at {:?}", self.store.path()),
                Err(e) => tracing::warn!("Could not create alias store {:?}: {}", self.store.path(), e),
            }
            return AliasMap::new();
        }

        match self.store.load() {
            Ok(aliases) => aliases,
            Err(e) => {
                tracing::warn!("Ignoring unreadable alias store: {}", e);
                AliasMap::new()
            }
        }
    }

    /// Map an alias to its connection string, or hand back the input unchanged
    pub fn resolve(&self, input: &str) -> String {
        match self.get_aliases().get(input) {
            Some(connection_string) => {
                tracing::info!("Alias '{}' resolved", input);
                connection_string.clone()
            }
            None => {
                tracing::info!("Input not a known alias, used as literal connection string");
                input.to_string()
            }
        }
    }

    /// Add or replace an alias
    pub fn set_alias(&self, name: &str, connection_string: &str) -> StorageResult<()> {
        self.store.update(|aliases| {
            aliases.insert(name.to_string(), connection_string.to_string());
        })?;
        tracing::info!("Saved alias '{}'", name);
        Ok(())
    }

    /// Remove an alias; returns whether it existed
    pub fn remove_alias(&self, name: &str) -> StorageResult<bool> {
        let removed = self.store.update(|aliases| aliases.remove(name).is_some())?;
        if removed {
            tracing::info!("Removed alias '{}'", name);
        } else {
            tracing::debug!("Alias '{}' not present, nothing removed", name);
        }
        Ok(removed)
    }
}
