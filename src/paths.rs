use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the main log file: `<exe_dir>/logs/exp_pace.log`
pub fn get_log_file() -> PathBuf {
    get_logs_dir().join("exp_pace.log")
}

/// Returns the default snapshot directory: `<data_local>/exp-pace/snapshots/`,
/// or `<exe_dir>/snapshots/` when the platform has no data directory.
pub fn get_snapshots_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("exp-pace").join("snapshots"))
        .unwrap_or_else(|| get_exe_dir().join("snapshots"))
}

/// Returns the bundled tesseract directory: `<exe_dir>/tesseract/`
pub fn get_tesseract_dir() -> PathBuf {
    get_exe_dir().join("tesseract")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    Ok(())
}
