// MS-SQL Provider
// DatabaseProvider for SQL Server over one dedicated tiberius session, with audited execution

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::backup::{
    build_backup_command, map_backup_history, map_latest_backup, BackupKind, BackupOutcome, BackupRecord,
    LatestBackup, BACKUP_HISTORY_SQL, LATEST_BACKUP_SQL,
};
use crate::db::base::ProviderBase;
use crate::db::connection::{redact_connection_string, Connector, TiberiusConnector};
use crate::db::diagnostics::{
    map_edition, map_logins, scalar_f64, scalar_i64, EditionInfo, LoginInfo, PerformanceStats, BATCH_REQUESTS_SQL,
    CONNECTIONS_SQL, CPU_BUSY_SQL, EDITION_SQL, LOGINS_SQL, MEMORY_IN_USE_SQL,
};
use crate::db::query::{
    is_dml, normalize_affected_rows, CellValue, QueryFailure, QueryResult, ResultTable, RowSet,
};
use crate::db::schema::{
    map_indexes, map_tables, parse_table_name, table_schema_query, tables_query, IndexDescriptor, TableDescriptor,
    INDEXES_SQL,
};
use crate::db::traits::{DatabaseProvider, DatabaseType, ProviderError};
use crate::storage::{QueryAuditor, QueryLogEntry};

const ENGINE: &str = "SQL Server";

/// Config key naming the schema used for unqualified table names
pub const DEFAULT_SCHEMA_KEY: &str = "default_schema";

const CURRENT_DATABASE_SQL: &str = "SELECT DB_NAME()";

/// SQL Server provider. The connector is swappable so the provider can run
/// against a scripted session in tests.
pub struct MssqlProvider<C: Connector = TiberiusConnector> {
    base: ProviderBase,
    connector: C,
    auditor: Arc<QueryAuditor>,
}

impl MssqlProvider {
    pub fn new(auditor: Arc<QueryAuditor>) -> Self {
        Self::with_connector(TiberiusConnector, auditor)
    }
}

impl<C: Connector> MssqlProvider<C> {
    pub fn with_connector(connector: C, auditor: Arc<QueryAuditor>) -> Self {
        Self {
            base: ProviderBase::new(ENGINE, DatabaseType::Mssql.display_name()),
            connector,
            auditor,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base.set_config(key, value);
        self
    }

    /// Record one history entry. A history write failure never replaces the query's own result.
    fn audit(&self, entry: QueryLogEntry) {
        if let Err(e) = self.auditor.append(entry) {
            tracing::error!("Failed to record query history in {:?}: {}", self.auditor.path(), e);
        }
    }

    /// Run an unaudited read-only catalog query
    async fn catalog(&mut self, operation: &'static str, sql: &str) -> Result<RowSet, ProviderError> {
        let session = self.base.session(operation)?;
        session.query(sql).await.map_err(|e| {
            tracing::error!("{} failed on '{}': {}", operation, self.base.name(), e);
            ProviderError::QueryExecution(e.to_string())
        })
    }
}

/// Fractional milliseconds since `started`
fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[async_trait]
impl<C: Connector> DatabaseProvider for MssqlProvider<C> {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mssql
    }

    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProviderBase {
        &mut self.base
    }

    async fn connect(&mut self, input: &str) -> Result<(), ProviderError> {
        let redacted = redact_connection_string(input);

        if self.base.is_connected() {
            tracing::error!(
                "Connect to '{}' rejected: already connected to '{}'",
                redacted,
                self.base.name()
            );
            return Err(ProviderError::AlreadyConnected(self.base.name().to_string()));
        }

        tracing::info!("Connecting to {}", redacted);

        let mut session = match self.connector.open(input).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Connection to '{}' failed: {}", redacted, e);
                return Err(ProviderError::Connection { input: redacted, source: e });
            }
        };

        let name = match session.query(CURRENT_DATABASE_SQL).await {
            Ok(rows) => rows
                .scalar()
                .and_then(CellValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.base.name().to_string()),
            Err(e) => {
                tracing::error!("Connected to '{}' but could not read the database name: {}", redacted, e);
                if let Err(close_err) = session.close().await {
                    tracing::warn!("Error while closing rejected session: {}", close_err);
                }
                return Err(ProviderError::Connection { input: redacted, source: e });
            }
        };

        self.base.attach(session, name);
        tracing::info!("Connected to database '{}'", self.base.name());
        Ok(())
    }

    async fn run_query(&mut self, sql: &str) -> Result<QueryResult, ProviderError> {
        let database = self.base.name().to_string();
        let session = self.base.session("run_query")?;

        let query_id = Uuid::new_v4();
        tracing::debug!("Executing query {} on '{}': {}", query_id, database, sql);

        let started = Instant::now();
        let outcome = if is_dml(sql) {
            session.execute(sql).await.map(|affected| RowSet {
                rows_affected: Some(affected),
                ..RowSet::default()
            })
        } else {
            session.query(sql).await
        };
        let execution_time_ms = elapsed_ms(started);

        match outcome {
            Ok(rows) => {
                let affected_rows = normalize_affected_rows(rows.rows_affected);
                self.audit(QueryLogEntry::success(&database, sql, affected_rows, execution_time_ms));
                tracing::info!(
                    "Query {} on '{}' completed in {:.3} ms ({} rows returned, {} affected)",
                    query_id,
                    database,
                    execution_time_ms,
                    rows.rows.len(),
                    affected_rows
                );

                Ok(QueryResult::Table(ResultTable {
                    query_id,
                    columns: rows.columns,
                    rows: rows.rows,
                    affected_rows,
                    execution_time_ms,
                }))
            }
            Err(e) => {
                tracing::error!("Query {} on '{}' failed: {} | SQL: {}", query_id, database, e, sql);
                self.audit(QueryLogEntry::failure(&database, sql, execution_time_ms));

                Ok(QueryResult::Failed(QueryFailure {
                    query_id,
                    message: e.to_string(),
                    execution_time_ms,
                }))
            }
        }
    }

    async fn get_tables(&mut self) -> Result<Vec<TableDescriptor>, ProviderError> {
        let rows = self.catalog("get_tables", &tables_query()).await?;
        let tables = map_tables(&rows);
        tracing::debug!("Loaded {} tables from '{}'", tables.len(), self.base.name());
        Ok(tables)
    }

    async fn get_table_schema(&mut self, table: &str) -> Result<TableDescriptor, ProviderError> {
        let (schema, table_name) = parse_table_name(table);
        let schema = schema.or_else(|| self.base.config_value(DEFAULT_SCHEMA_KEY).map(str::to_string));
        let sql = table_schema_query(schema.as_deref(), &table_name);

        let rows = self.catalog("get_table_schema", &sql).await?;
        map_tables(&rows).into_iter().next().ok_or_else(|| {
            tracing::error!("Table '{}' not found in '{}'", table, self.base.name());
            ProviderError::NotFound(format!("Table '{}'", table))
        })
    }

    async fn get_indexes(&mut self) -> Result<Vec<IndexDescriptor>, ProviderError> {
        let rows = self.catalog("get_indexes", INDEXES_SQL).await?;
        Ok(map_indexes(&rows))
    }

    async fn new_backup(
        &mut self,
        destination: &str,
        kind: BackupKind,
        compressed: bool,
    ) -> Result<BackupOutcome, ProviderError> {
        let database = self.base.name().to_string();
        let session = self.base.session("new_backup")?;

        let command = build_backup_command(&database, destination, kind, compressed);
        tracing::info!("Starting {} backup of '{}' to {}", kind, database, destination);

        let started = Instant::now();
        let outcome = session.query(&command).await;
        let execution_time_ms = elapsed_ms(started);

        match outcome {
            Ok(_) => {
                self.audit(QueryLogEntry::success(&database, &command, 0, execution_time_ms));
                tracing::info!("{} backup of '{}' completed in {:.3} ms", kind, database, execution_time_ms);
                Ok(BackupOutcome::Completed {
                    command,
                    execution_time_ms,
                })
            }
            Err(e) => {
                tracing::error!("{} backup of '{}' to {} failed: {}", kind, database, destination, e);
                self.audit(QueryLogEntry::failure(&database, &command, execution_time_ms));
                Ok(BackupOutcome::Failed {
                    command,
                    message: e.to_string(),
                    execution_time_ms,
                })
            }
        }
    }

    async fn get_backup_history(&mut self) -> Result<Vec<BackupRecord>, ProviderError> {
        let rows = self.catalog("get_backup_history", BACKUP_HISTORY_SQL).await?;
        Ok(map_backup_history(&rows))
    }

    async fn get_latest_backup(&mut self) -> Result<LatestBackup, ProviderError> {
        let rows = self.catalog("get_latest_backup", LATEST_BACKUP_SQL).await?;
        Ok(map_latest_backup(&rows))
    }

    async fn get_edition(&mut self) -> Result<EditionInfo, ProviderError> {
        let rows = self.catalog("get_edition", EDITION_SQL).await?;
        map_edition(&rows)
    }

    /// All four counters must succeed; any failure fails the snapshot
    async fn get_performance_stats(&mut self) -> Result<PerformanceStats, ProviderError> {
        let batch_requests = scalar_i64(
            &self.catalog("get_performance_stats", BATCH_REQUESTS_SQL).await?,
            "Batch requests",
        )?;
        let connections = scalar_i64(
            &self.catalog("get_performance_stats", CONNECTIONS_SQL).await?,
            "Connections",
        )?;
        let cpu_busy_percent = scalar_f64(
            &self.catalog("get_performance_stats", CPU_BUSY_SQL).await?,
            "CPU busy",
        )?;
        let memory_in_use_mb = scalar_i64(
            &self.catalog("get_performance_stats", MEMORY_IN_USE_SQL).await?,
            "Memory in use",
        )?;

        Ok(PerformanceStats {
            batch_requests,
            connections,
            cpu_busy_percent,
            memory_in_use_mb,
        })
    }

    async fn get_users(&mut self) -> Result<Vec<LoginInfo>, ProviderError> {
        let rows = self.catalog("get_users", LOGINS_SQL).await?;
        Ok(map_logins(&rows))
    }
}
