// Backups
// BACKUP DATABASE command construction and msdb backup catalog mapping

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::query::{CellValue, RowSet};
use crate::db::schema::escape_literal;
use crate::db::traits::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupKind {
    Full,
    Differential,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Full => "Full",
            BackupKind::Differential => "Differential",
        }
    }

    /// msdb `backupset.type` code
    pub fn from_catalog_code(code: &str) -> Option<Self> {
        match code.trim() {
            "D" => Some(BackupKind::Full),
            "I" => Some(BackupKind::Differential),
            _ => None,
        }
    }
}

impl FromStr for BackupKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(BackupKind::Full),
            "differential" | "diff" => Ok(BackupKind::Differential),
            other => Err(ProviderError::Backup(format!(
                "Unknown backup type '{}', expected Full or Differential",
                other
            ))),
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed backup of the connected database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub database: String,
    pub started_at: String,
    pub finished_at: String,
    pub kind: BackupKind,
    pub destination: String,
    pub user: String,
}

/// Most recent backup finish time, or an explicit none
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "finished_at", rename_all = "snake_case")]
pub enum LatestBackup {
    None,
    /// `yyyy-mm-dd hh:mi:ss`
    At(String),
}

impl fmt::Display for LatestBackup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatestBackup::None => f.write_str("none"),
            LatestBackup::At(ts) => f.write_str(ts),
        }
    }
}

/// Result of a backup attempt, reported rather than raised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupOutcome {
    Completed {
        command: String,
        execution_time_ms: f64,
    },
    Failed {
        command: String,
        message: String,
        execution_time_ms: f64,
    },
}

impl BackupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BackupOutcome::Completed { .. })
    }

    pub fn command(&self) -> &str {
        match self {
            BackupOutcome::Completed { command, .. } | BackupOutcome::Failed { command, .. } => command,
        }
    }
}

/// Build the T-SQL backup statement. Differential and compression are the only options.
pub fn build_backup_command(database: &str, destination: &str, kind: BackupKind, compressed: bool) -> String {
    let mut command = format!(
        "BACKUP DATABASE [{}] TO DISK = N'{}'",
        database.replace(']', "]]"),
        escape_literal(destination)
    );

    let mut options = Vec::new();
    if kind == BackupKind::Differential {
        options.push("DIFFERENTIAL");
    }
    if compressed {
        options.push("COMPRESSION");
    }

    if !options.is_empty() {
        command.push_str(" WITH ");
        command.push_str(&options.join(", "));
    }
    command
}

pub const BACKUP_HISTORY_SQL: &str = r#"
SELECT
    bs.database_name,
    CONVERT(varchar(19), bs.backup_start_date, 120) AS started_at,
    CONVERT(varchar(19), bs.backup_finish_date, 120) AS finished_at,
    bs.type,
    bmf.physical_device_name,
    bs.user_name
FROM msdb.dbo.backupset bs
JOIN msdb.dbo.backupmediafamily bmf ON bmf.media_set_id = bs.media_set_id
WHERE bs.database_name = DB_NAME()
  AND bs.type IN ('D', 'I')
ORDER BY bs.backup_finish_date DESC
"#;

pub const LATEST_BACKUP_SQL: &str = r#"
SELECT CONVERT(varchar(19), MAX(backup_finish_date), 120) AS latest_backup
FROM msdb.dbo.backupset
WHERE database_name = DB_NAME()
  AND type IN ('D', 'I')
"#;

fn text(row: &[CellValue], idx: usize) -> String {
    row.get(idx)
        .and_then(CellValue::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

pub fn map_backup_history(rows: &RowSet) -> Vec<BackupRecord> {
    rows.rows
        .iter()
        .filter_map(|row| {
            let kind = BackupKind::from_catalog_code(&text(row, 3))?;
            Some(BackupRecord {
                database: text(row, 0),
                started_at: text(row, 1),
                finished_at: text(row, 2),
                kind,
                destination: text(row, 4),
                user: text(row, 5),
            })
        })
        .collect()
}

pub fn map_latest_backup(rows: &RowSet) -> LatestBackup {
    match rows.scalar().and_then(CellValue::as_str) {
        Some(ts) if !ts.trim().is_empty() => LatestBackup::At(ts.to_string()),
        _ => LatestBackup::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_compressed_command() {
        let cmd = build_backup_command("TestDB", "C:\\backups\\test.bak", BackupKind::Full, true);
        assert_eq!(
            cmd,
            "BACKUP DATABASE [TestDB] TO DISK = N'C:\\backups\\test.bak' WITH COMPRESSION"
        );
        assert!(!cmd.contains("DIFFERENTIAL"));
    }

    #[test]
    fn test_differential_uncompressed_command() {
        let cmd = build_backup_command("TestDB", "/var/opt/mssql/test.bak", BackupKind::Differential, false);
        assert!(cmd.contains("WITH DIFFERENTIAL"));
        assert!(!cmd.contains("COMPRESSION"));
    }

    #[test]
    fn test_full_uncompressed_has_no_options() {
        let cmd = build_backup_command("Odd]Name", "/tmp/o'brien.bak", BackupKind::Full, false);
        assert_eq!(cmd, "BACKUP DATABASE [Odd]]Name] TO DISK = N'/tmp/o''brien.bak'");
    }

    #[test]
    fn test_parse_backup_kind() {
        assert_eq!("Full".parse::<BackupKind>().unwrap(), BackupKind::Full);
        assert_eq!(" differential ".parse::<BackupKind>().unwrap(), BackupKind::Differential);

        let err = "Log".parse::<BackupKind>().unwrap_err();
        assert!(matches!(err, ProviderError::Backup(_)));
    }

    #[test]
    fn test_map_backup_history() {
        let s = |v: &str| CellValue::String(v.to_string());
        let rows = RowSet {
            columns: Vec::new(),
            rows: vec![
                vec![
                    s("TestDB"),
                    s("2024-03-02 01:00:00"),
                    s("2024-03-02 01:00:05"),
                    s("I"),
                    s("/b/diff.bak"),
                    s("sa"),
                ],
                vec![
                    s("TestDB"),
                    s("2024-03-01 01:00:00"),
                    s("2024-03-01 01:02:00"),
                    s("D"),
                    s("/b/full.bak"),
                    s("sa"),
                ],
            ],
            rows_affected: None,
        };

        let history = map_backup_history(&rows);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, BackupKind::Differential);
        assert_eq!(history[1].kind, BackupKind::Full);
        assert_eq!(history[1].destination, "/b/full.bak");
    }

    #[test]
    fn test_latest_backup_none_sentinel() {
        let empty = RowSet {
            columns: Vec::new(),
            rows: vec![vec![CellValue::Null]],
            rows_affected: None,
        };
        assert_eq!(map_latest_backup(&empty), LatestBackup::None);
        assert_eq!(LatestBackup::None.to_string(), "none");

        let found = RowSet {
            columns: Vec::new(),
            rows: vec![vec![CellValue::String("2024-03-02 01:00:05".into())]],
            rows_affected: None,
        };
        assert_eq!(map_latest_backup(&found), LatestBackup::At("2024-03-02 01:00:05".into()));
    }
}
