// Query Results
// Normalized result shapes shared by every provider, plus tiberius row conversion

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tiberius::numeric::Numeric;
use tiberius::{Column, ColumnType, Row};
use uuid::Uuid;

/// Represents a single cell value in the result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(String),
    Binary(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Text view of string-like cells
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) | CellValue::DateTime(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; bits and whole floats are widened
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Bool(b) => Some(i64::from(*b)),
            CellValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(f) => Some(*f),
            CellValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean view; SQL Server bit columns may arrive as ints depending on the protocol path
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            CellValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Convert a tiberius column value to CellValue
    pub fn from_row(row: &Row, idx: usize, col_type: &ColumnType) -> Self {
        match col_type {
            ColumnType::Null => CellValue::Null,

            // Integer types
            ColumnType::Int1 => row
                .try_get::<u8, _>(idx)
                .ok()
                .flatten()
                .map(|v| CellValue::Int(v as i64))
                .unwrap_or(CellValue::Null),
            ColumnType::Int2 => row
                .try_get::<i16, _>(idx)
                .ok()
                .flatten()
                .map(|v| CellValue::Int(v as i64))
                .unwrap_or(CellValue::Null),
            ColumnType::Int4 => row
                .try_get::<i32, _>(idx)
                .ok()
                .flatten()
                .map(|v| CellValue::Int(v as i64))
                .unwrap_or(CellValue::Null),
            ColumnType::Int8 => row
                .try_get::<i64, _>(idx)
                .ok()
                .flatten()
                .map(CellValue::Int)
                .unwrap_or(CellValue::Null),
            ColumnType::Intn => row
                .try_get::<i64, _>(idx)
                .ok()
                .flatten()
                .map(CellValue::Int)
                .or_else(|| row.try_get::<i32, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)))
                .or_else(|| row.try_get::<i16, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)))
                .or_else(|| row.try_get::<u8, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)))
                .unwrap_or(CellValue::Null),

            // Float types
            ColumnType::Float4 => row
                .try_get::<f32, _>(idx)
                .ok()
                .flatten()
                .map(|v| CellValue::Float(v as f64))
                .unwrap_or(CellValue::Null),
            ColumnType::Float8 | ColumnType::Money | ColumnType::Money4 => row
                .try_get::<f64, _>(idx)
                .ok()
                .flatten()
                .map(CellValue::Float)
                .unwrap_or(CellValue::Null),
            ColumnType::Floatn => row
                .try_get::<f64, _>(idx)
                .ok()
                .flatten()
                .map(CellValue::Float)
                .or_else(|| row.try_get::<f32, _>(idx).ok().flatten().map(|v| CellValue::Float(v as f64)))
                .unwrap_or(CellValue::Null),

            ColumnType::Decimaln | ColumnType::Numericn => row
                .try_get::<Numeric, _>(idx)
                .ok()
                .flatten()
                .map(|n| CellValue::Float(f64::from(n)))
                .unwrap_or(CellValue::Null),

            ColumnType::Bit | ColumnType::Bitn => row
                .try_get::<bool, _>(idx)
                .ok()
                .flatten()
                .map(CellValue::Bool)
                .unwrap_or(CellValue::Null),

            // String types
            ColumnType::BigVarChar
            | ColumnType::BigChar
            | ColumnType::NVarchar
            | ColumnType::NChar
            | ColumnType::Text
            | ColumnType::NText => row
                .try_get::<&str, _>(idx)
                .ok()
                .flatten()
                .map(|s| CellValue::String(s.to_string()))
                .unwrap_or(CellValue::Null),

            // Date/Time types
            ColumnType::Datetime
            | ColumnType::Datetime2
            | ColumnType::Datetimen
            | ColumnType::Datetime4 => row
                .try_get::<NaiveDateTime, _>(idx)
                .ok()
                .flatten()
                .map(|dt| CellValue::DateTime(dt.to_string()))
                .unwrap_or(CellValue::Null),
            ColumnType::DatetimeOffsetn => row
                .try_get::<DateTime<Utc>, _>(idx)
                .ok()
                .flatten()
                .map(|dt| CellValue::DateTime(dt.to_rfc3339()))
                .unwrap_or(CellValue::Null),
            ColumnType::Daten => row
                .try_get::<NaiveDate, _>(idx)
                .ok()
                .flatten()
                .map(|d| CellValue::DateTime(d.to_string()))
                .unwrap_or(CellValue::Null),
            ColumnType::Timen => row
                .try_get::<NaiveTime, _>(idx)
                .ok()
                .flatten()
                .map(|t| CellValue::DateTime(t.to_string()))
                .unwrap_or(CellValue::Null),

            ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => row
                .try_get::<&[u8], _>(idx)
                .ok()
                .flatten()
                .map(|b| CellValue::Binary(b.to_vec()))
                .unwrap_or(CellValue::Null),

            ColumnType::Guid => row
                .try_get::<tiberius::Uuid, _>(idx)
                .ok()
                .flatten()
                .map(|u| CellValue::String(u.to_string()))
                .unwrap_or(CellValue::Null),

            ColumnType::Xml => row
                .try_get::<&tiberius::xml::XmlData, _>(idx)
                .ok()
                .flatten()
                .map(|xml| CellValue::String(xml.to_owned().into_string()))
                .unwrap_or(CellValue::Null),

            // Default: try as string
            _ => row
                .try_get::<&str, _>(idx)
                .ok()
                .flatten()
                .map(|s| CellValue::String(s.to_string()))
                .unwrap_or(CellValue::Null),
        }
    }
}

/// Column metadata for a result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    pub data_type: String,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

impl From<&Column> for ResultColumn {
    fn from(col: &Column) -> Self {
        Self {
            name: col.name().to_string(),
            data_type: format_sql_data_type(&col.column_type()),
        }
    }
}

/// Engine-neutral rows as handed back by an engine session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<CellValue>>,
    /// Rows touched by a DML statement; `None` when the engine cannot tell
    pub rows_affected: Option<u64>,
}

impl RowSet {
    /// Convert the first result set of a tiberius batch.
    ///
    /// `columns` comes from the stream metadata so an empty result keeps its shape.
    pub fn from_tiberius(columns: Vec<ResultColumn>, rows: &[Row]) -> Self {
        let col_types: Vec<ColumnType> = rows
            .first()
            .map(|first| first.columns().iter().map(|c| c.column_type()).collect())
            .unwrap_or_default();

        let rows = rows
            .iter()
            .map(|row| {
                col_types
                    .iter()
                    .enumerate()
                    .map(|(idx, col_type)| CellValue::from_row(row, idx, col_type))
                    .collect()
            })
            .collect();

        Self {
            columns,
            rows,
            rows_affected: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First cell of the first row, the shape of every scalar catalog query
    pub fn scalar(&self) -> Option<&CellValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Successful tabular result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub query_id: Uuid,
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<CellValue>>,
    pub affected_rows: u64,
    pub execution_time_ms: f64,
}

/// Structured failure reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub query_id: Uuid,
    pub message: String,
    pub execution_time_ms: f64,
}

/// Outcome of an ad-hoc query: a table or a failure, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResult {
    Table(ResultTable),
    Failed(QueryFailure),
}

impl QueryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Table(_))
    }

    pub fn table(&self) -> Option<&ResultTable> {
        match self {
            QueryResult::Table(table) => Some(table),
            QueryResult::Failed(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            QueryResult::Table(_) => None,
            QueryResult::Failed(failure) => Some(&failure.message),
        }
    }

    pub fn execution_time_ms(&self) -> f64 {
        match self {
            QueryResult::Table(table) => table.execution_time_ms,
            QueryResult::Failed(failure) => failure.execution_time_ms,
        }
    }
}

/// Whether a statement reports affected rows instead of a result set.
///
/// Only single statements qualify: a `;`-separated batch goes through the
/// query path so trailing result sets are not dropped. Batches without a
/// separator are classified by their first keyword.
pub fn is_dml(sql: &str) -> bool {
    if !is_single_statement(sql) {
        return false;
    }

    let first_word = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_uppercase();

    matches!(first_word.as_str(), "INSERT" | "UPDATE" | "DELETE" | "MERGE")
}

/// False when a `;` outside quotes or brackets is followed by more text
fn is_single_statement(sql: &str) -> bool {
    let mut closing: Option<char> = None;

    for (idx, c) in sql.char_indices() {
        match closing {
            Some(end) if c == end => closing = None,
            Some(_) => {}
            None => match c {
                '\'' => closing = Some('\''),
                '"' => closing = Some('"'),
                '[' => closing = Some(']'),
                ';' => {
                    if sql[idx + 1..].chars().any(|c| !c.is_whitespace() && c != ';') {
                        return false;
                    }
                }
                _ => {}
            },
        }
    }
    true
}

/// Normalize the engine's affected-row report. Unknown counts become 0.
pub fn normalize_affected_rows(rows_affected: Option<u64>) -> u64 {
    rows_affected.unwrap_or(0)
}

/// Convert Tiberius ColumnType to user-friendly SQL data type string
pub fn format_sql_data_type(col_type: &ColumnType) -> String {
    match col_type {
        ColumnType::Int1 => "tinyint".to_string(),
        ColumnType::Int2 => "smallint".to_string(),
        ColumnType::Int4 => "int".to_string(),
        ColumnType::Int8 => "bigint".to_string(),
        ColumnType::Intn => "int".to_string(),

        ColumnType::Float4 => "real".to_string(),
        ColumnType::Float8 | ColumnType::Floatn => "float".to_string(),

        ColumnType::Decimaln => "decimal".to_string(),
        ColumnType::Numericn => "numeric".to_string(),
        ColumnType::Money => "money".to_string(),
        ColumnType::Money4 => "smallmoney".to_string(),

        ColumnType::Bit | ColumnType::Bitn => "bit".to_string(),

        ColumnType::BigVarChar => "varchar".to_string(),
        ColumnType::BigChar => "char".to_string(),
        ColumnType::NVarchar => "nvarchar".to_string(),
        ColumnType::NChar => "nchar".to_string(),
        ColumnType::Text => "text".to_string(),
        ColumnType::NText => "ntext".to_string(),

        ColumnType::BigVarBin => "varbinary".to_string(),
        ColumnType::BigBinary => "binary".to_string(),
        ColumnType::Image => "image".to_string(),

        ColumnType::Datetime | ColumnType::Datetimen => "datetime".to_string(),
        ColumnType::Datetime2 => "datetime2".to_string(),
        ColumnType::Datetime4 => "smalldatetime".to_string(),
        ColumnType::Daten => "date".to_string(),
        ColumnType::Timen => "time".to_string(),
        ColumnType::DatetimeOffsetn => "datetimeoffset".to_string(),

        ColumnType::Guid => "uniqueidentifier".to_string(),
        ColumnType::Xml => "xml".to_string(),
        ColumnType::Null => "null".to_string(),

        _ => format!("{:?}", col_type).to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sql_data_type() {
        assert_eq!(format_sql_data_type(&ColumnType::Int4), "int");
        assert_eq!(format_sql_data_type(&ColumnType::Float8), "float");
        assert_eq!(format_sql_data_type(&ColumnType::NVarchar), "nvarchar");
        assert_eq!(format_sql_data_type(&ColumnType::Datetime2), "datetime2");
        assert_eq!(format_sql_data_type(&ColumnType::Money4), "smallmoney");
    }

    #[test]
    fn test_is_dml() {
        assert!(is_dml("UPDATE dbo.Users SET name = 'x'"));
        assert!(is_dml("  insert into t values (1)"));
        assert!(is_dml("delete\nfrom t"));
        assert!(is_dml("MERGE INTO target USING source ON 1 = 1 WHEN MATCHED THEN DELETE;"));
        assert!(!is_dml("SELECT * FROM t"));
        assert!(!is_dml("WITH cte AS (SELECT 1 AS x) UPDATE t SET y = 1"));
        assert!(!is_dml(""));
    }

    #[test]
    fn test_is_dml_batches() {
        assert!(!is_dml("UPDATE t SET x = 1; SELECT * FROM t"));
        assert!(!is_dml("DELETE FROM t;\nSELECT @@ROWCOUNT"));
        assert!(is_dml("DELETE FROM t;"));
        assert!(is_dml("DELETE FROM t; ;  \n"));
        assert!(is_dml("UPDATE t SET x = ';' WHERE y = 'a;b'"));
        assert!(is_dml("UPDATE [odd;name] SET x = 1"));
        assert!(is_dml("UPDATE t SET note = 'it''s; fine'"));
    }

    #[test]
    fn test_normalize_affected_rows() {
        assert_eq!(normalize_affected_rows(None), 0);
        assert_eq!(normalize_affected_rows(Some(42)), 42);
    }

    #[test]
    fn test_cell_value_views() {
        assert_eq!(CellValue::Int(1).as_bool(), Some(true));
        assert_eq!(CellValue::Bool(false).as_i64(), Some(0));
        assert_eq!(CellValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(CellValue::Float(3.5).as_i64(), None);
        assert_eq!(CellValue::DateTime("2024-01-01 10:00:00".into()).as_str(), Some("2024-01-01 10:00:00"));
        assert!(CellValue::Null.is_null());
        assert_eq!(CellValue::String("x".into()).as_f64(), None);
    }

    #[test]
    fn test_query_result_accessors() {
        let id = Uuid::new_v4();
        let failed = QueryResult::Failed(QueryFailure {
            query_id: id,
            message: "Invalid object name 'nope'.".to_string(),
            execution_time_ms: 3.5,
        });
        assert!(!failed.is_success());
        assert!(failed.table().is_none());
        assert_eq!(failed.error_message(), Some("Invalid object name 'nope'."));
        assert_eq!(failed.execution_time_ms(), 3.5);

        let table = QueryResult::Table(ResultTable {
            query_id: id,
            columns: vec![ResultColumn::new("n", "int")],
            rows: vec![vec![CellValue::Int(1)]],
            affected_rows: 0,
            execution_time_ms: 7.0,
        });
        assert!(table.is_success());
        assert_eq!(table.error_message(), None);
        assert_eq!(table.table().map(|t| t.rows.len()), Some(1));
    }

    #[test]
    fn test_query_result_serializes_with_status_tag() {
        let failed = QueryResult::Failed(QueryFailure {
            query_id: Uuid::nil(),
            message: "boom".to_string(),
            execution_time_ms: 0.0,
        });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["message"], "boom");
    }

    #[test]
    fn test_rowset_scalar() {
        let empty = RowSet::default();
        assert!(empty.scalar().is_none());
        assert!(empty.is_empty());

        let set = RowSet {
            columns: vec![ResultColumn::new("", "nvarchar")],
            rows: vec![vec![CellValue::String("TestDB".into())]],
            rows_affected: None,
        };
        assert_eq!(set.scalar().and_then(CellValue::as_str), Some("TestDB"));
    }

    #[test]
    fn test_empty_result_keeps_columns() {
        let set = RowSet::from_tiberius(vec![ResultColumn::new("id", "int"), ResultColumn::new("name", "nvarchar")], &[]);

        assert!(set.is_empty());
        assert_eq!(set.columns.len(), 2);
        assert_eq!(set.columns[1].name, "name");
        assert_eq!(set.rows_affected, None);
    }
}
