// Provider Registry
// Maps each database type to a factory for its provider

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::drivers::MssqlProvider;
use crate::db::traits::{DatabaseProvider, DatabaseType, ProviderError};
use crate::storage::QueryAuditor;

/// Builds a fresh, disconnected provider that audits into the given store
pub type ProviderFactory = Arc<dyn Fn(Arc<QueryAuditor>) -> Box<dyn DatabaseProvider> + Send + Sync>;

/// Registry for provider factories
pub struct ProviderRegistry {
    factories: HashMap<DatabaseType, ProviderFactory>,
    auditor: Arc<QueryAuditor>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new(auditor: Arc<QueryAuditor>) -> Self {
        Self {
            factories: HashMap::new(),
            auditor,
        }
    }

    /// Registry with every built-in engine (SQL Server only)
    pub fn with_defaults(auditor: Arc<QueryAuditor>) -> Self {
        let mut registry = Self::new(auditor);
        registry.register(
            DatabaseType::Mssql,
            Arc::new(|auditor: Arc<QueryAuditor>| Box::new(MssqlProvider::new(auditor)) as Box<dyn DatabaseProvider>),
        );
        registry
    }

    pub fn register(&mut self, db_type: DatabaseType, factory: ProviderFactory) {
        self.factories.insert(db_type, factory);
        tracing::debug!("Registered provider for {}", db_type.display_name());
    }

    pub fn unregister(&mut self, db_type: DatabaseType) -> bool {
        let removed = self.factories.remove(&db_type).is_some();
        if removed {
            tracing::debug!("Unregistered provider for {}", db_type.display_name());
        }
        removed
    }

    pub fn has_provider(&self, db_type: DatabaseType) -> bool {
        self.factories.contains_key(&db_type)
    }

    pub fn supported_types(&self) -> Vec<DatabaseType> {
        self.factories.keys().copied().collect()
    }

    /// Build a disconnected provider. Unregistered engines fail with `NotImplemented`.
    pub fn create(&self, db_type: DatabaseType) -> Result<Box<dyn DatabaseProvider>, ProviderError> {
        match self.factories.get(&db_type) {
            Some(factory) => Ok(factory(Arc::clone(&self.auditor))),
            None => {
                tracing::error!("No provider registered for {}", db_type.display_name());
                Err(ProviderError::NotImplemented {
                    provider: db_type.display_name(),
                    operation: "create_provider",
                })
            }
        }
    }
}
