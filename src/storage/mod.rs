// Local persistence
// Query history, connection aliases and saved queries, each a JSON file at an injected path

pub mod aliases;
pub mod history;
pub mod saved_queries;
pub mod stats;
pub mod store;

pub use aliases::{AliasMap, AliasResolver};
pub use history::{ExecutionStatus, QueryAuditor, QueryLogEntry};
pub use saved_queries::{SavedQueryMap, SavedQueryStore};
pub use stats::{HistoryAggregator, HistorySummary};
pub use store::{JsonStore, StorageError, StorageResult};
