// Schema Metadata
// SQL Server catalog queries for tables, columns and indexes, and their row mapping

use serde::{Deserialize, Serialize};

use crate::db::query::{CellValue, RowSet};

/// A column of a user table, with the key/index roles it plays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub is_unique: bool,
    pub is_nullable: bool,
    pub is_indexed: bool,
}

impl ColumnDescriptor {
    /// Strongest role for display: PK > FK > UNIQUE > INDEX
    pub fn key_label(&self) -> Option<&'static str> {
        if self.is_primary_key {
            Some("PK")
        } else if self.is_foreign_key {
            Some("FK")
        } else if self.is_unique {
            Some("UNIQUE")
        } else if self.is_indexed {
            Some("INDEX")
        } else {
            None
        }
    }
}

/// A user table and its columns in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// `schema.table`
    pub name: String,
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    PrimaryKey,
    UniqueClustered,
    UniqueNonclustered,
    Other,
}

impl IndexKind {
    /// Classify with precedence primary key > unique clustered > unique nonclustered > other
    pub fn classify(is_primary_key: bool, is_unique: bool, type_desc: &str) -> Self {
        if is_primary_key {
            IndexKind::PrimaryKey
        } else if is_unique && type_desc.eq_ignore_ascii_case("CLUSTERED") {
            IndexKind::UniqueClustered
        } else if is_unique && type_desc.eq_ignore_ascii_case("NONCLUSTERED") {
            IndexKind::UniqueNonclustered
        } else {
            IndexKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// `schema.table`
    pub table: String,
    pub name: String,
    /// Key columns only, in key order
    pub columns: Vec<IndexColumn>,
    pub kind: IndexKind,
    pub size_kb: u64,
    /// Last read access since the server started; `None` if unused
    pub last_used: Option<String>,
}

const COLUMN_CATALOG_SQL: &str = r#"
SELECT
    s.name AS schema_name,
    t.name AS table_name,
    c.name AS column_name,
    ty.name AS data_type,
    c.is_nullable,
    CAST(CASE WHEN EXISTS (
        SELECT 1 FROM sys.index_columns ic
        JOIN sys.indexes i ON i.object_id = ic.object_id AND i.index_id = ic.index_id
        WHERE ic.object_id = c.object_id AND ic.column_id = c.column_id AND i.is_primary_key = 1
    ) THEN 1 ELSE 0 END AS bit) AS is_primary_key,
    CAST(CASE WHEN EXISTS (
        SELECT 1 FROM sys.foreign_key_columns fkc
        WHERE fkc.parent_object_id = c.object_id AND fkc.parent_column_id = c.column_id
    ) THEN 1 ELSE 0 END AS bit) AS is_foreign_key,
    CAST(CASE WHEN EXISTS (
        SELECT 1 FROM sys.index_columns ic
        JOIN sys.indexes i ON i.object_id = ic.object_id AND i.index_id = ic.index_id
        WHERE ic.object_id = c.object_id AND ic.column_id = c.column_id
          AND i.is_unique = 1 AND i.is_primary_key = 0 AND ic.is_included_column = 0
    ) THEN 1 ELSE 0 END AS bit) AS is_unique,
    CAST(CASE WHEN EXISTS (
        SELECT 1 FROM sys.index_columns ic
        WHERE ic.object_id = c.object_id AND ic.column_id = c.column_id AND ic.is_included_column = 0
    ) THEN 1 ELSE 0 END AS bit) AS is_indexed
FROM sys.tables t
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.columns c ON c.object_id = t.object_id
JOIN sys.types ty ON ty.user_type_id = c.user_type_id
WHERE t.is_ms_shipped = 0
"#;

pub const INDEXES_SQL: &str = r#"
SELECT
    s.name + '.' + t.name AS table_name,
    i.name AS index_name,
    c.name AS column_name,
    ic.is_descending_key,
    ic.is_included_column,
    i.is_primary_key,
    i.is_unique,
    i.type_desc,
    CAST(ISNULL(ps.used_kb, 0) AS bigint) AS size_kb,
    CONVERT(varchar(19), us.last_used, 120) AS last_used
FROM sys.indexes i
JOIN sys.tables t ON t.object_id = i.object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
OUTER APPLY (
    SELECT SUM(p.used_page_count) * 8 AS used_kb
    FROM sys.dm_db_partition_stats p
    WHERE p.object_id = i.object_id AND p.index_id = i.index_id
) ps
OUTER APPLY (
    SELECT MAX(v.last_used) AS last_used
    FROM sys.dm_db_index_usage_stats u
    CROSS APPLY (VALUES (u.last_user_seek), (u.last_user_scan), (u.last_user_lookup)) AS v(last_used)
    WHERE u.database_id = DB_ID() AND u.object_id = i.object_id AND u.index_id = i.index_id
) us
WHERE i.type <> 0
  AND i.is_hypothetical = 0
  AND ic.is_included_column = 0
  AND t.is_ms_shipped = 0
ORDER BY table_name, i.name, ic.key_ordinal
"#;

/// Catalog query for every user table
pub fn tables_query() -> String {
    format!("{}ORDER BY t.name, s.name, c.column_id", COLUMN_CATALOG_SQL)
}

/// Catalog query for one table. Without a schema, the caller's default schema is used.
pub fn table_schema_query(schema: Option<&str>, table: &str) -> String {
    let schema_condition = match schema {
        Some(schema) => format!("s.name = N'{}'", escape_literal(schema)),
        None => "s.name = SCHEMA_NAME()".to_string(),
    };

    format!(
        "{}  AND {} AND t.name = N'{}'\nORDER BY c.column_id",
        COLUMN_CATALOG_SQL,
        schema_condition,
        escape_literal(table)
    )
}

/// Escape a value for use inside a single-quoted T-SQL literal
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Split `table`, `schema.table` or `[schema].[table]` into parts
pub fn parse_table_name(input: &str) -> (Option<String>, String) {
    let input = input.trim();
    let mut depth = 0;
    let mut split_at = None;

    for (idx, ch) in input.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            '.' if depth == 0 => split_at = Some(idx),
            _ => {}
        }
    }

    match split_at {
        Some(idx) => (
            Some(unquote_identifier(&input[..idx])),
            unquote_identifier(&input[idx + 1..]),
        ),
        None => (None, unquote_identifier(input)),
    }
}

fn unquote_identifier(part: &str) -> String {
    let part = part.trim();
    match part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
        Some(inner) => inner.replace("]]", "]"),
        None => part.to_string(),
    }
}

fn text(row: &[CellValue], idx: usize) -> Option<String> {
    row.get(idx).and_then(CellValue::as_str).map(str::to_string)
}

fn flag(row: &[CellValue], idx: usize) -> bool {
    row.get(idx).and_then(CellValue::as_bool).unwrap_or(false)
}

/// Group column rows into tables, preserving query order
pub fn map_tables(rows: &RowSet) -> Vec<TableDescriptor> {
    let mut tables: Vec<TableDescriptor> = Vec::new();

    for row in &rows.rows {
        let (Some(schema_name), Some(table_name), Some(column_name)) = (text(row, 0), text(row, 1), text(row, 2))
        else {
            continue;
        };

        let column = ColumnDescriptor {
            name: column_name,
            data_type: text(row, 3).unwrap_or_default(),
            is_nullable: flag(row, 4),
            is_primary_key: flag(row, 5),
            is_foreign_key: flag(row, 6),
            is_unique: flag(row, 7),
            is_indexed: flag(row, 8),
        };

        match tables.last_mut() {
            Some(table) if table.schema_name == schema_name && table.table_name == table_name => {
                table.columns.push(column);
            }
            _ => tables.push(TableDescriptor {
                name: format!("{}.{}", schema_name, table_name),
                schema_name,
                table_name,
                columns: vec![column],
            }),
        }
    }

    tables
}

/// Group index key rows into indexes. Included columns are never reported.
pub fn map_indexes(rows: &RowSet) -> Vec<IndexDescriptor> {
    let mut indexes: Vec<IndexDescriptor> = Vec::new();

    for row in &rows.rows {
        let (Some(table), Some(name), Some(column_name)) = (text(row, 0), text(row, 1), text(row, 2)) else {
            continue;
        };

        if flag(row, 4) {
            continue;
        }

        let column = IndexColumn {
            name: column_name,
            direction: if flag(row, 3) {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            },
        };

        match indexes.last_mut() {
            Some(index) if index.table == table && index.name == name => index.columns.push(column),
            _ => {
                let type_desc = text(row, 7).unwrap_or_default();
                indexes.push(IndexDescriptor {
                    kind: IndexKind::classify(flag(row, 5), flag(row, 6), &type_desc),
                    size_kb: row.get(8).and_then(CellValue::as_i64).unwrap_or(0).max(0) as u64,
                    last_used: text(row, 9),
                    table,
                    name,
                    columns: vec![column],
                });
            }
        }
    }

    indexes
}
