// Server Diagnostics
// Edition, performance snapshot and login catalog queries

use serde::{Deserialize, Serialize};

use crate::db::query::{CellValue, RowSet};
use crate::db::traits::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionInfo {
    pub edition: String,
    pub product_version: String,
    pub product_level: String,
}

/// Point-in-time server snapshot built from four independent counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Cumulative batch requests since the server started
    pub batch_requests: i64,
    pub connections: i64,
    pub cpu_busy_percent: f64,
    pub memory_in_use_mb: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInfo {
    pub name: String,
    pub login_type: String,
    pub is_disabled: bool,
    pub created: String,
    pub modified: String,
}

pub const EDITION_SQL: &str = "SELECT \
    CAST(SERVERPROPERTY('Edition') AS nvarchar(128)) AS edition, \
    CAST(SERVERPROPERTY('ProductVersion') AS nvarchar(128)) AS product_version, \
    CAST(SERVERPROPERTY('ProductLevel') AS nvarchar(128)) AS product_level";

pub const BATCH_REQUESTS_SQL: &str = "SELECT CAST(cntr_value AS bigint) AS batch_requests \
    FROM sys.dm_os_performance_counters \
    WHERE counter_name = 'Batch Requests/sec'";

pub const CONNECTIONS_SQL: &str = "SELECT CAST(COUNT(*) AS bigint) AS connections FROM sys.dm_exec_connections";

pub const CPU_BUSY_SQL: &str = "SELECT CAST(@@CPU_BUSY AS float) * 100.0 \
    / NULLIF(CAST(@@CPU_BUSY AS float) + @@IDLE + @@IO_BUSY, 0) AS cpu_busy_percent";

pub const MEMORY_IN_USE_SQL: &str = "SELECT CAST(physical_memory_in_use_kb / 1024 AS bigint) AS memory_in_use_mb \
    FROM sys.dm_os_process_memory";

pub const LOGINS_SQL: &str = r#"
SELECT
    name,
    type_desc,
    is_disabled,
    CONVERT(varchar(19), create_date, 120) AS created,
    CONVERT(varchar(19), modify_date, 120) AS modified
FROM sys.server_principals
WHERE type IN ('S', 'U', 'G', 'E', 'X')
  AND name NOT LIKE '##%'
ORDER BY name
"#;

fn text(row: &[CellValue], idx: usize) -> String {
    row.get(idx)
        .and_then(CellValue::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

pub fn map_edition(rows: &RowSet) -> Result<EditionInfo, ProviderError> {
    let row = rows
        .rows
        .first()
        .ok_or_else(|| ProviderError::QueryExecution("Server returned no edition information".into()))?;

    Ok(EditionInfo {
        edition: text(row, 0),
        product_version: text(row, 1),
        product_level: text(row, 2),
    })
}

/// Integer counter from a single-value query
pub fn scalar_i64(rows: &RowSet, metric: &str) -> Result<i64, ProviderError> {
    rows.scalar()
        .and_then(CellValue::as_i64)
        .ok_or_else(|| ProviderError::QueryExecution(format!("{} query returned no value", metric)))
}

pub fn scalar_f64(rows: &RowSet, metric: &str) -> Result<f64, ProviderError> {
    rows.scalar()
        .and_then(CellValue::as_f64)
        .ok_or_else(|| ProviderError::QueryExecution(format!("{} query returned no value", metric)))
}

pub fn map_logins(rows: &RowSet) -> Vec<LoginInfo> {
    rows.rows
        .iter()
        .filter(|row| row.first().and_then(CellValue::as_str).is_some())
        .map(|row| LoginInfo {
            name: text(row, 0),
            login_type: text(row, 1),
            is_disabled: row.get(2).and_then(CellValue::as_bool).unwrap_or(false),
            created: text(row, 3),
            modified: text(row, 4),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(value: CellValue) -> RowSet {
        RowSet {
            columns: Vec::new(),
            rows: vec![vec![value]],
            rows_affected: None,
        }
    }

    #[test]
    fn test_map_edition() {
        let rows = RowSet {
            columns: Vec::new(),
            rows: vec![vec![
                CellValue::String("Developer Edition (64-bit)".into()),
                CellValue::String("16.0.1000.6".into()),
                CellValue::String("RTM".into()),
            ]],
            rows_affected: None,
        };

        let edition = map_edition(&rows).unwrap();
        assert_eq!(edition.edition, "Developer Edition (64-bit)");
        assert_eq!(edition.product_level, "RTM");

        assert!(map_edition(&RowSet::default()).is_err());
    }

    #[test]
    fn test_scalars() {
        assert_eq!(scalar_i64(&single(CellValue::Int(42)), "connections").unwrap(), 42);
        assert_eq!(scalar_f64(&single(CellValue::Float(12.5)), "cpu").unwrap(), 12.5);

        let err = scalar_i64(&single(CellValue::Null), "memory").unwrap_err();
        assert_eq!(err.to_string(), "Query execution error: memory query returned no value");
    }

    #[test]
    fn test_map_logins() {
        let rows = RowSet {
            columns: Vec::new(),
            rows: vec![
                vec![
                    CellValue::String("app_user".into()),
                    CellValue::String("SQL_LOGIN".into()),
                    CellValue::Bool(true),
                    CellValue::String("2024-01-01 00:00:00".into()),
                    CellValue::String("2024-02-01 00:00:00".into()),
                ],
                vec![CellValue::Null],
            ],
            rows_affected: None,
        };

        let logins = map_logins(&rows);
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0].login_type, "SQL_LOGIN");
        assert!(logins[0].is_disabled);
    }
}
