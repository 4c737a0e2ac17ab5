// Application configuration
// Where stores and logs live, and how logging is filtered

use std::path::PathBuf;

use crate::logging::LogConfig;
use crate::storage::{StorageError, StorageResult};

/// Overrides the platform data directory
pub const DATA_DIR_ENV: &str = "STEWARD_DATA_DIR";

/// Overrides the log directory (defaults to `<data_dir>/logs`)
pub const LOG_DIR_ENV: &str = "STEWARD_LOG_DIR";

pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;

const HISTORY_FILE: &str = "history.json";
const ALIASES_FILE: &str = "aliases.json";
const SAVED_QUERIES_FILE: &str = "saved_queries.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_retention_days: u32,
    /// Explicit filter; takes precedence over `STEWARD_LOG` and `RUST_LOG`
    pub log_filter: Option<String>,
}

impl AppConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            log_dir: data_dir.join("logs"),
            data_dir,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            log_filter: None,
        }
    }

    /// Platform directories, with `STEWARD_DATA_DIR` / `STEWARD_LOG_DIR` overrides
    pub fn from_env() -> StorageResult<Self> {
        let data_dir = match env_path(DATA_DIR_ENV) {
            Some(dir) => dir,
            None => default_data_dir()?,
        };

        let mut config = Self::new(data_dir);
        if let Some(log_dir) = env_path(LOG_DIR_ENV) {
            config.log_dir = log_dir;
        }
        Ok(config)
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    pub fn with_log_retention_days(mut self, days: u32) -> Self {
        self.log_retention_days = days;
        self
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    pub fn aliases_path(&self) -> PathBuf {
        self.data_dir.join(ALIASES_FILE)
    }

    pub fn saved_queries_path(&self) -> PathBuf {
        self.data_dir.join(SAVED_QUERIES_FILE)
    }

    pub fn log_config(&self) -> LogConfig {
        let config = LogConfig::new(self.log_dir.clone()).with_retention_days(self.log_retention_days);
        match &self.log_filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        }
    }
}

/// Get the default data directory for this platform
pub fn default_data_dir() -> StorageResult<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "sqlsteward", "sqlsteward").ok_or(StorageError::AppDataDir)?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key).filter(|value| !value.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_paths() {
        let config = AppConfig::new("/srv/steward");

        assert_eq!(config.history_path(), PathBuf::from("/srv/steward/history.json"));
        assert_eq!(config.aliases_path(), PathBuf::from("/srv/steward/aliases.json"));
        assert_eq!(config.saved_queries_path(), PathBuf::from("/srv/steward/saved_queries.json"));
        assert_eq!(config.log_dir, PathBuf::from("/srv/steward/logs"));
        assert_eq!(config.log_retention_days, 30);
    }

    #[test]
    fn test_log_config() {
        let config = AppConfig::new("/srv/steward")
            .with_log_dir("/var/log/steward")
            .with_log_filter("warn")
            .with_log_retention_days(7);

        let log = config.log_config();
        assert_eq!(log.log_dir, PathBuf::from("/var/log/steward"));
        assert_eq!(log.log_filter.as_deref(), Some("warn"));
        assert_eq!(log.retention_days, 7);
        assert_eq!(log.file_prefix, "sqlsteward");
    }
}
