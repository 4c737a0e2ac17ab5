// Database Provider Contract
// The capability set every engine provider exposes; unsupported operations fail loudly

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::backup::{BackupKind, BackupOutcome, BackupRecord, LatestBackup};
use crate::db::base::ProviderBase;
use crate::db::connection::SessionError;
use crate::db::diagnostics::{EditionInfo, LoginInfo, PerformanceStats};
use crate::db::query::QueryResult;
use crate::db::schema::{IndexDescriptor, TableDescriptor};
use crate::storage::StorageError;

/// Supported database types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    Mssql,
    Postgresql,
    Mysql,
    Sqlite,
}

impl DatabaseType {
    /// Display name for operators
    pub fn display_name(&self) -> &'static str {
        match self {
            DatabaseType::Mssql => "Microsoft SQL Server",
            DatabaseType::Postgresql => "PostgreSQL",
            DatabaseType::Mysql => "MySQL",
            DatabaseType::Sqlite => "SQLite",
        }
    }
}

/// Errors raised by providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Not connected to a database")]
    NotConnected,

    #[error("Already connected to {0}; disconnect first")]
    AlreadyConnected(String),

    #[error("Connection failed for '{input}': {source}")]
    Connection {
        /// Attempted input with secrets redacted
        input: String,
        #[source]
        source: SessionError,
    },

    #[error("{operation} is not implemented by the {provider} provider")]
    NotImplemented {
        provider: &'static str,
        operation: &'static str,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error(transparent)]
    Store(#[from] StorageError),
}

impl ProviderError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, ProviderError::NotConnected)
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ProviderError::NotImplemented { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

impl From<SessionError> for ProviderError {
    fn from(err: SessionError) -> Self {
        ProviderError::QueryExecution(err.to_string())
    }
}

/// Provider trait - every database engine implements this.
///
/// Each method except `connect` and `disconnect` fails with
/// [`ProviderError::NotConnected`] while disconnected, before touching the engine.
/// Default bodies fail with [`ProviderError::NotImplemented`], so a partially
/// built engine still satisfies the contract and callers can detect gaps.
#[async_trait]
pub trait DatabaseProvider: Send {
    // --- Metadata ---
    fn database_type(&self) -> DatabaseType;

    /// Shared provider state
    fn base(&self) -> &ProviderBase;

    fn base_mut(&mut self) -> &mut ProviderBase;

    /// Display name; the connected database's real name once connected
    fn name(&self) -> &str {
        self.base().name()
    }

    fn is_connected(&self) -> bool {
        self.base().is_connected()
    }

    // --- Connection Management ---
    /// Open the connection described by `input` (a literal connection string)
    async fn connect(&mut self, _input: &str) -> Result<(), ProviderError> {
        Err(self.base().not_implemented("connect"))
    }

    /// Release the connection. Safe to call repeatedly.
    async fn disconnect(&mut self) -> Result<(), ProviderError> {
        self.base_mut().release().await;
        Ok(())
    }

    // --- Query Execution ---
    /// Run operator SQL verbatim. Engine failures come back as `QueryResult::Failed`.
    async fn run_query(&mut self, _sql: &str) -> Result<QueryResult, ProviderError> {
        Err(self.base().unsupported("run_query"))
    }

    // --- Schema Metadata ---
    async fn get_tables(&mut self) -> Result<Vec<TableDescriptor>, ProviderError> {
        Err(self.base().unsupported("get_tables"))
    }

    /// Schema of one table; `NotFound` if it does not exist
    async fn get_table_schema(&mut self, _table: &str) -> Result<TableDescriptor, ProviderError> {
        Err(self.base().unsupported("get_table_schema"))
    }

    async fn get_indexes(&mut self) -> Result<Vec<IndexDescriptor>, ProviderError> {
        Err(self.base().unsupported("get_indexes"))
    }

    // --- Backups ---
    /// Back up the connected database. Engine failures come back as `BackupOutcome::Failed`.
    async fn new_backup(
        &mut self,
        _destination: &str,
        _kind: BackupKind,
        _compressed: bool,
    ) -> Result<BackupOutcome, ProviderError> {
        Err(self.base().unsupported("new_backup"))
    }

    async fn get_backup_history(&mut self) -> Result<Vec<BackupRecord>, ProviderError> {
        Err(self.base().unsupported("get_backup_history"))
    }

    async fn get_latest_backup(&mut self) -> Result<LatestBackup, ProviderError> {
        Err(self.base().unsupported("get_latest_backup"))
    }

    // --- Server Diagnostics ---
    async fn get_edition(&mut self) -> Result<EditionInfo, ProviderError> {
        Err(self.base().unsupported("get_edition"))
    }

    async fn get_performance_stats(&mut self) -> Result<PerformanceStats, ProviderError> {
        Err(self.base().unsupported("get_performance_stats"))
    }

    async fn get_users(&mut self) -> Result<Vec<LoginInfo>, ProviderError> {
        Err(self.base().unsupported("get_users"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::{EngineSession, SessionError};
    use crate::db::query::RowSet;

    /// An engine that only knows how to connect
    struct SkeletonProvider {
        base: ProviderBase,
    }

    struct NullSession;

    #[async_trait]
    impl EngineSession for NullSession {
        async fn query(&mut self, _sql: &str) -> Result<RowSet, SessionError> {
            Ok(RowSet::default())
        }

        async fn execute(&mut self, _sql: &str) -> Result<u64, SessionError> {
            Ok(0)
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[async_trait]
    impl DatabaseProvider for SkeletonProvider {
        fn database_type(&self) -> DatabaseType {
            DatabaseType::Postgresql
        }

        fn base(&self) -> &ProviderBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ProviderBase {
            &mut self.base
        }

        async fn connect(&mut self, input: &str) -> Result<(), ProviderError> {
            self.base.attach(Box::new(NullSession), input);
            Ok(())
        }
    }

    fn skeleton() -> SkeletonProvider {
        SkeletonProvider {
            base: ProviderBase::new("PostgreSQL", "skeleton"),
        }
    }

    #[tokio::test]
    async fn test_defaults_require_connection_first() {
        let mut provider = skeleton();

        assert!(provider.get_tables().await.unwrap_err().is_not_connected());
        assert!(provider.run_query("SELECT 1").await.unwrap_err().is_not_connected());
        assert!(provider.get_users().await.unwrap_err().is_not_connected());
    }

    #[tokio::test]
    async fn test_defaults_are_not_implemented_when_connected() {
        let mut provider = skeleton();
        provider.connect("pg").await.unwrap();

        let err = provider.get_indexes().await.unwrap_err();
        assert!(err.is_not_implemented());
        assert_eq!(err.to_string(), "get_indexes is not implemented by the PostgreSQL provider");

        assert!(provider.run_query("SELECT 1").await.unwrap_err().is_not_implemented());
        assert!(provider
            .new_backup("/tmp/x.bak", BackupKind::Full, false)
            .await
            .unwrap_err()
            .is_not_implemented());
        assert!(provider.get_latest_backup().await.unwrap_err().is_not_implemented());
    }

    #[tokio::test]
    async fn test_default_disconnect_is_idempotent() {
        let mut provider = skeleton();
        provider.connect("pg").await.unwrap();
        assert!(provider.is_connected());

        provider.disconnect().await.unwrap();
        assert!(!provider.is_connected());
        provider.disconnect().await.unwrap();
        assert!(!provider.is_connected());
    }

    #[test]
    fn test_default_connect_is_not_implemented() {
        let base = ProviderBase::new("MySQL", "mysql");
        assert!(base.not_implemented("connect").is_not_implemented());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(DatabaseType::Mssql.display_name(), "Microsoft SQL Server");
        assert_eq!(DatabaseType::Sqlite.display_name(), "SQLite");
    }
}
