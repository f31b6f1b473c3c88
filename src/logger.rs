//! Run logger: writes all log output to a single file in the OS data directory.
//!
//! The file is **truncated at each launch**, so it only ever contains output
//! from the most recent run.
//!
//! Log location:
//!   Windows:  `%APPDATA%\Tessera\tessera.log`
//!   Linux:    `~/.local/share/tessera/tessera.log`
//!   macOS:    `~/Library/Application Support/Tessera/tessera.log`
//!
//! Engine code logs through the `log` facade (`log::info!`, `log::warn!`, ...).
//! Warnings and errors are mirrored to stderr so command-line users see them.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

static LOGGER: OnceLock<RunLogger> = OnceLock::new();

struct RunLogger {
    file: Option<Mutex<File>>,
    path: PathBuf,
    level: LevelFilter,
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] [{}] {}", timestamp(), record.level(), record.args());
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = writeln!(file, "{}", line);
        }
        if record.level() <= Level::Warn {
            eprintln!("{}: {}", record.level().as_str().to_lowercase(), record.args());
        }
    }

    fn flush(&self) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Returns the path to the current run's log file.
pub fn log_path() -> Option<&'static Path> {
    LOGGER.get().map(|l| l.path.as_path())
}

/// Initialise the run logger at the default location.
pub fn init(level: LevelFilter) {
    init_at(log_file_path(), level);
}

/// Initialise the run logger.  Only the first call has any effect.
///
/// * Creates (or truncates) the log file; failure to open it is not fatal.
/// * Installs a panic hook that writes the panic message to the log before
///   running the default handler.
pub fn init_at(path: PathBuf, level: LevelFilter) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => Some(Mutex::new(f)),
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    };

    if LOGGER.set(RunLogger { file, path: path.clone(), level }).is_err() {
        return;
    }
    let Some(logger) = LOGGER.get() else { return };
    if log::set_logger(logger).is_err() {
        return;
    }
    log::set_max_level(level);

    write_raw(&format!("=== tessera run started {} ===", human_timestamp()));
    write_raw(&format!("Log file: {}", path.display()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_raw(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
}

/// Write a line to the log file, bypassing level filtering.
fn write_raw(line: &str) {
    if let Some(logger) = LOGGER.get()
        && let Some(mutex) = &logger.file
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

fn log_file_path() -> PathBuf {
    #[cfg(any(target_os = "windows", target_os = "macos"))]
    let app = "Tessera";
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let app = "tessera";
    data_dir().join(app).join("tessera.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// HH:MM:SS (UTC) within the current day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            let h = (secs % 86400) / 3600;
            let m = (secs % 3600) / 60;
            let s = secs % 60;
            format!("{:02}:{:02}:{:02}", h, m, s)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
