// Query audit trail
// Append-only record of every query and backup attempt, persisted as a JSON array

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::store::{JsonStore, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    Failure,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "Success",
            ExecutionStatus::Failure => "Failure",
        }
    }
}

/// One audited execution. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryLogEntry {
    pub database: String,
    pub query_text: String,
    pub execution_status: ExecutionStatus,
    pub affected_rows: u64,
    /// Milliseconds, fractional
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

impl QueryLogEntry {
    /// Create an entry for a successful execution, stamped now
    pub fn success(
        database: impl Into<String>,
        query_text: impl Into<String>,
        affected_rows: u64,
        execution_time: f64,
    ) -> Self {
        Self {
            database: database.into(),
            query_text: query_text.into(),
            execution_status: ExecutionStatus::Success,
            affected_rows,
            execution_time,
            timestamp: Utc::now(),
        }
    }

    /// Create an entry for a failed execution; affected rows are always 0
    pub fn failure(database: impl Into<String>, query_text: impl Into<String>, execution_time: f64) -> Self {
        Self {
            database: database.into(),
            query_text: query_text.into(),
            execution_status: ExecutionStatus::Failure,
            affected_rows: 0,
            execution_time,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.execution_status == ExecutionStatus::Success
    }
}

/// Append-only query history backed by a JSON file.
///
/// Corrupt history is always reported to the caller; an audit trail must not
/// quietly read as empty.
pub struct QueryAuditor {
    store: JsonStore<Vec<QueryLogEntry>>,
}

impl QueryAuditor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.store.path()
    }

    /// Append one entry. No deduplication.
    pub fn append(&self, entry: QueryLogEntry) -> StorageResult<()> {
        tracing::debug!(
            "Auditing {} query on {} ({:.3} ms, {} rows)",
            entry.execution_status.as_str(),
            entry.database,
            entry.execution_time,
            entry.affected_rows
        );
        let len = self.store.update(|entries| {
            entries.push(entry);
            entries.len()
        })?;
        tracing::debug!("Query history now holds {} entries", len);
        Ok(())
    }

    /// Full-store read in append order
    pub fn entries(&self) -> StorageResult<Vec<QueryLogEntry>> {
        self.store.load().map_err(|e| {
            tracing::error!("Failed to read query history {:?}: {}", self.store.path(), e);
            e
        })
    }

    /// Entries for one database, optionally restricted to one status, in append order
    pub fn query(&self, database: &str, status: Option<ExecutionStatus>) -> StorageResult<Vec<QueryLogEntry>> {
        let entries = self
            .entries()?
            .into_iter()
            .filter(|entry| entry.database == database)
            .filter(|entry| status.map_or(true, |s| entry.execution_status == s))
            .collect();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn auditor() -> (tempfile::TempDir, QueryAuditor) {
        let dir = tempdir().unwrap();
        let auditor = QueryAuditor::new(dir.path().join("history.json"));
        (dir, auditor)
    }

    #[test]
    fn test_append_then_read_preserves_fields() {
        let (_dir, auditor) = auditor();
        let entry = QueryLogEntry::success("TestDB", "SELECT 1", 0, 12.25);

        auditor.append(entry.clone()).unwrap();

        let entries = auditor.entries().unwrap();
        assert_eq!(entries, vec![entry]);
    }

    #[test]
    fn test_append_twice_keeps_both() {
        let (_dir, auditor) = auditor();
        let entry = QueryLogEntry::success("TestDB", "SELECT 1", 0, 12.0);

        auditor.append(entry.clone()).unwrap();
        auditor.append(entry.clone()).unwrap();

        assert_eq!(auditor.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_failure_entry_has_zero_rows() {
        let entry = QueryLogEntry::failure("TestDB", "SELEC 1", 4.0);
        assert_eq!(entry.affected_rows, 0);
        assert!(!entry.is_success());
    }

    #[test]
    fn test_query_filters_database_and_status() {
        let (_dir, auditor) = auditor();
        auditor.append(QueryLogEntry::success("db1", "SELECT 1", 0, 100.0)).unwrap();
        auditor.append(QueryLogEntry::failure("db1", "SELEC", 50.0)).unwrap();
        auditor.append(QueryLogEntry::success("db2", "SELECT 2", 0, 300.0)).unwrap();

        assert_eq!(auditor.query("db1", None).unwrap().len(), 2);

        let failures = auditor.query("db1", Some(ExecutionStatus::Failure)).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].query_text, "SELEC");

        assert!(auditor.query("db3", None).unwrap().is_empty());
    }

    #[test]
    fn test_serialized_field_names() {
        let entry = QueryLogEntry::success("TestDB", "UPDATE t SET x = 1", 3, 8.5);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["Database"], "TestDB");
        assert_eq!(json["QueryText"], "UPDATE t SET x = 1");
        assert_eq!(json["ExecutionStatus"], "Success");
        assert_eq!(json["AffectedRows"], 3);
        assert_eq!(json["ExecutionTime"], 8.5);
        assert!(json["Timestamp"].is_string());
    }

    #[test]
    fn test_placeholder_object_reads_empty() {
        let (_dir, auditor) = auditor();
        std::fs::write(auditor.path(), "{}").unwrap();

        assert!(auditor.entries().unwrap().is_empty());

        auditor.append(QueryLogEntry::success("TestDB", "SELECT 1", 0, 1.0)).unwrap();
        assert_eq!(auditor.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_history_is_raised() {
        let (_dir, auditor) = auditor();
        std::fs::write(auditor.path(), "not json").unwrap();

        assert!(auditor.entries().unwrap_err().is_corrupt());
        assert!(auditor.query("TestDB", None).is_err());
        assert!(auditor.append(QueryLogEntry::success("TestDB", "SELECT 1", 0, 1.0)).is_err());
    }

    #[test]
    fn test_fractional_execution_time_loads() {
        let (_dir, auditor) = auditor();
        std::fs::write(
            auditor.path(),
            r#"[{"Database":"db1","QueryText":"SELECT 1","ExecutionStatus":"Success","AffectedRows":0,"ExecutionTime":12.5,"Timestamp":"2024-05-01T12:00:00Z"},
               {"Database":"db1","QueryText":"SELECT 2","ExecutionStatus":"Success","AffectedRows":0,"ExecutionTime":7,"Timestamp":"2024-05-01T12:00:01Z"}]"#,
        )
        .unwrap();

        let entries = auditor.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].execution_time, 12.5);
        assert_eq!(entries[1].execution_time, 7.0);
    }
}
