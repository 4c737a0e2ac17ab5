//! Diagnostic logging.
//!
//! Every line is written as `<timestamp> [<Level>]: <message>` where the level
//! is one of `Debug`, `Info`, `Warning` or `Error`. Output goes to a daily
//! rotating file (`<prefix>.<YYYY-MM-DD>.log`) and falls back to stderr when the
//! log directory cannot be used. Files older than the retention window are
//! removed at startup.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate, Utc};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// File name prefix; files are named `<prefix>.<date>.log`
    pub file_prefix: String,
    /// Days of log files to keep
    pub retention_days: u32,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            file_prefix: "sqlsteward".to_string(),
            retention_days: 30,
            log_filter: None,
        }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }
}

/// Guard that must be held for the lifetime of the application.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether log lines are going to a file
    pub fn is_file_backed(&self) -> bool {
        self._worker_guard.is_some()
    }
}

/// Line format: `2024-05-01 12:00:00.123 [Info]: message`
pub struct DiagnosticFormat;

/// TRACE folds into Debug
pub fn level_label(level: &Level) -> &'static str {
    match *level {
        Level::TRACE | Level::DEBUG => "Debug",
        Level::INFO => "Info",
        Level::WARN => "Warning",
        Level::ERROR => "Error",
    }
}

impl<S, N> FormatEvent<S, N> for DiagnosticFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        write!(
            writer,
            "{} [{}]: ",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level_label(event.metadata().level())
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Initialize logging with the given configuration.
///
/// If file logging cannot be set up, falls back to stderr only.
pub fn init_logging(config: &LogConfig) -> LoggingGuard {
    match init_file_logging(config) {
        Ok(guard) => LoggingGuard {
            _worker_guard: Some(guard),
        },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {}. Using stderr only.", e);
            init_stderr_logging(config.log_filter.as_deref());
            LoggingGuard { _worker_guard: None }
        }
    }
}

fn init_stderr_logging(filter: Option<&str>) {
    let result = tracing_subscriber::fmt()
        .event_format(DiagnosticFormat)
        .with_writer(io::stderr)
        .with_env_filter(build_env_filter(filter))
        .try_init();

    if let Err(e) = result {
        eprintln!("Warning: Logging already initialized: {}", e);
    }
}

type InitError = Box<dyn std::error::Error + Send + Sync>;

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, InitError> {
    let (writer, guard, purged) = open_log_file(config)?;

    file_subscriber(writer, build_env_filter(config.log_filter.as_deref())).try_init()?;

    if purged > 0 {
        tracing::info!("Removed {} log files older than {} days", purged, config.retention_days);
    }

    Ok(guard)
}

/// Purge expired files, then open today's rotating file behind a background writer.
///
/// Returns the writer, its flush guard and the number of purged files.
fn open_log_file(config: &LogConfig) -> Result<(NonBlocking, WorkerGuard, usize), InitError> {
    std::fs::create_dir_all(&config.log_dir)?;

    let purged = purge_old_logs(&config.log_dir, &config.file_prefix, config.retention_days)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    Ok((non_blocking, guard, purged))
}

/// ANSI must be disabled before the custom event format replaces the default one
fn file_subscriber(writer: NonBlocking, filter: EnvFilter) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_ansi(false)
        .event_format(DiagnosticFormat)
        .with_writer(writer)
        .with_env_filter(filter)
        .finish()
}

/// Build the environment filter from config or defaults.
pub fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    // Priority: custom filter > STEWARD_LOG > RUST_LOG > default
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env("STEWARD_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,tiberius=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,tiberius=warn"
    }
}

/// Remove `<prefix>.<date>.log` files older than `retention_days`.
///
/// The rolling appender names files by UTC date, so the cutoff is a UTC date too.
pub fn purge_old_logs(dir: &Path, prefix: &str, retention_days: u32) -> io::Result<usize> {
    let cutoff = Utc::now().date_naive() - Duration::days(i64::from(retention_days));
    purge_logs_before(dir, prefix, cutoff)
}

/// Remove dated log files strictly older than `cutoff`. Files without a parsable date are kept.
pub fn purge_logs_before(dir: &Path, prefix: &str, cutoff: NaiveDate) -> io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(date) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| log_file_date(name, prefix))
        else {
            continue;
        };

        if date < cutoff {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Warning: Could not remove old log file {:?}: {}", path, e),
            }
        }
    }
    Ok(removed)
}

fn log_file_date(file_name: &str, prefix: &str) -> Option<NaiveDate> {
    let date = file_name.strip_prefix(prefix)?.strip_prefix('.')?.strip_suffix(".log")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn test_line_format() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .event_format(DiagnosticFormat)
            .with_writer(capture.clone())
            .with_max_level(Level::TRACE)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("Disk nearly full");
            tracing::trace!("fine detail");
            tracing::error!("Query failed on '{}'", "TestDB");
        });

        let lines = capture.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(" [Warning]: Disk nearly full"));
        assert!(lines[1].ends_with(" [Debug]: fine detail"));
        assert!(lines[2].ends_with(" [Error]: Query failed on 'TestDB'"));
        assert!(chrono::NaiveDateTime::parse_from_str(&lines[0][..19], "%Y-%m-%d %H:%M:%S").is_ok());
    }

    #[test]
    fn test_level_labels() {
        assert_eq!(level_label(&Level::INFO), "Info");
        assert_eq!(level_label(&Level::WARN), "Warning");
        assert_eq!(level_label(&Level::TRACE), "Debug");
    }

    #[test]
    fn test_custom_filter_wins() {
        assert_eq!(build_env_filter(Some("warn")).to_string(), "warn");
    }

    #[test]
    fn test_purge_logs_before() {
        let dir = tempdir().unwrap();
        for name in [
            "sqlsteward.2024-01-01.log",
            "sqlsteward.2024-03-01.log",
            "other.2024-01-01.log",
            "sqlsteward.notadate.log",
        ] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let cutoff = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(purge_logs_before(dir.path(), "sqlsteward", cutoff).unwrap(), 1);

        assert!(!dir.path().join("sqlsteward.2024-01-01.log").exists());
        assert!(dir.path().join("sqlsteward.2024-03-01.log").exists());
        assert!(dir.path().join("other.2024-01-01.log").exists());
        assert!(dir.path().join("sqlsteward.notadate.log").exists());
    }

    #[test]
    fn test_file_logging_writes_dated_file() {
        let dir = tempdir().unwrap();
        let config = LogConfig::new(dir.path().to_path_buf()).with_filter("info");

        let (writer, guard, purged) = open_log_file(&config).unwrap();
        assert_eq!(purged, 0);

        let subscriber = file_subscriber(writer, build_env_filter(config.log_filter.as_deref()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Connected to database '{}'", "TestDB");
            tracing::debug!("below the filter");
        });
        drop(guard);

        let files: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);

        let name = files[0].file_name().and_then(|n| n.to_str()).unwrap();
        assert_eq!(log_file_date(name, "sqlsteward"), Some(Utc::now().date_naive()));

        let contents = std::fs::read_to_string(&files[0]).unwrap();
        assert!(contents.contains(" [Info]: Connected to database 'TestDB'\n"));
        assert!(!contents.contains("below the filter"));
        assert!(!contents.contains('\u{1b}'));
    }

    #[test]
    fn test_purge_uses_utc_cutoff() {
        let dir = tempdir().unwrap();
        let today = Utc::now().date_naive();
        let expired = today - Duration::days(31);
        let kept = today - Duration::days(30);
        for date in [expired, kept] {
            std::fs::write(dir.path().join(format!("sqlsteward.{}.log", date.format("%Y-%m-%d"))), "x").unwrap();
        }

        assert_eq!(purge_old_logs(dir.path(), "sqlsteward", 30).unwrap(), 1);
        assert!(dir.path().join(format!("sqlsteward.{}.log", kept.format("%Y-%m-%d"))).exists());
    }

    #[test]
    fn test_purge_missing_dir_is_noop() {
        let dir = tempdir().unwrap();
        assert_eq!(purge_old_logs(&dir.path().join("absent"), "sqlsteward", 30).unwrap(), 0);
    }
}
