// Database Module
// Provider contract, shared provider state, the SQL Server provider and its catalog queries

pub mod backup;
pub mod base;
pub mod connection;
pub mod diagnostics;
pub mod drivers;
pub mod query;
pub mod registry;
pub mod schema;
pub mod traits;

pub use backup::{BackupKind, BackupOutcome, BackupRecord, LatestBackup};
pub use base::ProviderBase;
pub use connection::{Connector, EngineSession, SessionError, TiberiusConnector};
pub use diagnostics::{EditionInfo, LoginInfo, PerformanceStats};
pub use drivers::MssqlProvider;
pub use query::{CellValue, QueryFailure, QueryResult, ResultColumn, ResultTable, RowSet};
pub use registry::{ProviderFactory, ProviderRegistry};
pub use schema::{ColumnDescriptor, IndexColumn, IndexDescriptor, IndexKind, SortDirection, TableDescriptor};
pub use traits::{DatabaseProvider, DatabaseType, ProviderError};
