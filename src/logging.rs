//! Console + file log sink behind the `log` facade.
//!
//! Each record becomes one `[HH:MM:SS.mmm] LEVEL message` line, written to
//! stderr and appended to the main log file. While a session log is set the
//! same line is appended there too.

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Per-session log file, if one is active.
static SESSION_LOG: Mutex<Option<PathBuf>> = Mutex::new(None);

pub struct FileLogger {
    level: LevelFilter,
    path: PathBuf,
}

impl FileLogger {
    pub fn new(level: LevelFilter, path: PathBuf) -> Self {
        Self { level, path }
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(&Local::now().format("%H:%M:%S%.3f").to_string(), record);
        eprint!("{}", line);
        append(&self.path, &line);

        let session = SESSION_LOG.lock().ok().and_then(|p| p.clone());
        if let Some(path) = session {
            append(&path, &line);
        }
    }

    fn flush(&self) {}
}

fn format_line(timestamp: &str, record: &Record) -> String {
    format!("[{}] {} {}\n", timestamp, record.level(), record.args())
}

fn append(path: &Path, line: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = file.write_all(line.as_bytes());
    }
}

/// Installs the logger process-wide. A second call is ignored.
pub fn init_logging(level: LevelFilter, path: PathBuf) {
    if log::set_boxed_logger(Box::new(FileLogger::new(level, path))).is_ok() {
        log::set_max_level(level);
    }
}

/// Starts (or, with `None`, stops) copying log lines to a session log file.
pub fn set_session_log(path: Option<PathBuf>) {
    if let Ok(mut current) = SESSION_LOG.lock() {
        *current = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use tempfile::tempdir;

    #[test]
    fn test_line_format() {
        let line = format_line(
            "12:34:56.789",
            &Record::builder()
                .args(format_args!("tick {}", 3))
                .level(Level::Warn)
                .build(),
        );
        assert_eq!(line, "[12:34:56.789] WARN tick 3\n");
    }

    #[test]
    fn test_logger_appends_to_file_and_filters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");
        let logger = FileLogger::new(LevelFilter::Info, path.clone());

        logger.log(&Record::builder().args(format_args!("kept")).level(Level::Info).build());
        logger.log(&Record::builder().args(format_args!("dropped")).level(Level::Debug).build());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("INFO kept"));
        assert!(!content.contains("dropped"));
    }

    #[test]
    fn test_init_logging_installs_global_logger() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("global.log");
        init_logging(LevelFilter::Info, path.clone());
        // Second install is ignored
        init_logging(LevelFilter::Off, dir.path().join("other.log"));

        log::warn!("logger installed");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("WARN logger installed"));
        assert!(!dir.path().join("other.log").exists());
    }
}
