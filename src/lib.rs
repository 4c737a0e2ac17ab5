//! SQL Server operator toolkit.
//!
//! A pluggable provider layer for connecting to a database, browsing its schema,
//! running audited ad-hoc queries and managing backups, plus the local JSON
//! stores (query history, connection aliases, saved queries) that back it.

pub mod config;
pub mod db;
pub mod logging;
pub mod storage;

use std::sync::Arc;

use config::AppConfig;
use db::{DatabaseProvider, DatabaseType, ProviderError, ProviderRegistry};
use logging::LoggingGuard;
use storage::{AliasResolver, HistoryAggregator, HistorySummary, QueryAuditor, SavedQueryStore, StorageResult};

/// Everything a front end needs: stores, the provider registry and the logging guard
pub struct AppState {
    pub config: AppConfig,
    pub auditor: Arc<QueryAuditor>,
    pub aliases: AliasResolver,
    pub saved_queries: SavedQueryStore,
    pub aggregator: HistoryAggregator,
    pub registry: ProviderRegistry,
    _logging: Option<LoggingGuard>,
}

impl AppState {
    /// Install logging, then open the stores and the default registry
    pub fn init(config: AppConfig) -> Self {
        let guard = logging::init_logging(&config.log_config());
        if !guard.is_file_backed() {
            tracing::warn!("Log directory {:?} unavailable, logging to stderr only", config.log_dir);
        }
        tracing::info!("Starting with data directory {:?}", config.data_dir);

        let mut state = Self::with_stores(config);
        state._logging = Some(guard);
        state
    }

    /// Stores and registry only; leaves the global subscriber alone
    pub fn with_stores(config: AppConfig) -> Self {
        let auditor = Arc::new(QueryAuditor::new(config.history_path()));
        tracing::debug!("Query history at {:?}", auditor.path());

        Self {
            aliases: AliasResolver::new(config.aliases_path()),
            saved_queries: SavedQueryStore::new(config.saved_queries_path()),
            aggregator: HistoryAggregator::new(Arc::clone(&auditor)),
            registry: ProviderRegistry::with_defaults(Arc::clone(&auditor)),
            auditor,
            config,
            _logging: None,
        }
    }

    /// Resolve `input` as an alias (or use it verbatim), build a provider and connect it
    pub async fn connect(&self, input: &str, db_type: DatabaseType) -> Result<Box<dyn DatabaseProvider>, ProviderError> {
        let connection_string = self.aliases.resolve(input);
        let mut provider = self.registry.create(db_type)?;
        provider.connect(&connection_string).await?;
        Ok(provider)
    }

    /// Summary of the audited history for one database
    pub fn history_summary(&self, database: &str) -> StorageResult<Option<HistorySummary>> {
        self.aggregator.get_stats(database)
    }
}
