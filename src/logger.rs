//! Session logger: the `log` facade's backend.
//!
//! Every record goes to a single file in the OS data directory which is
//! truncated at each launch, so it only ever holds the most recent session.
//! Warnings and errors are mirrored to stderr. Panics are recorded through a
//! panic hook before the default handler runs.
//!
//! Log location:
//!   Windows:  `%APPDATA%\Sketchboard\sketchboard.log`
//!   Linux:    `~/.local/share/Sketchboard/sketchboard.log`
//!   macOS:    `~/Library/Application Support/Sketchboard/sketchboard.log`
//!
//! Verbosity comes from `SKETCHBOARD_LOG` (`error`..`trace`, default `info`).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

const LEVEL_ENV: &str = "SKETCHBOARD_LOG";

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOGGER: SessionLogger = SessionLogger;

struct SessionLogger;

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{}] [{}] [{}] {}",
            timestamp(),
            record.level(),
            record.target(),
            record.args()
        );
        if record.level() <= Level::Warn {
            eprintln!("{}", line);
        }
        write_line(&line);
    }

    fn flush(&self) {
        if let Some(mutex) = LOG_FILE.get()
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Append a raw line. I/O errors are swallowed so logging never takes the
/// application down.
fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Install the session logger. Safe to call more than once; only the first
/// call has any effect.
///
/// Without a writable data directory records still reach stderr at warn
/// level and above.
pub fn init() {
    let level = std::env::var(LEVEL_ENV)
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    if log::set_logger(&LOGGER).is_err() {
        return;
    }
    log::set_max_level(level);

    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(file) => {
            let _ = LOG_FILE.set(Mutex::new(file));
        }
        Err(e) => eprintln!("[logger] could not open log file {}: {}", path.display(), e),
    }

    write_line(&format!("=== Sketchboard session started (unix {}) ===", unix_seconds()));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("Sketchboard").join("sketchboard.log")
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

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// HH:MM:SS (UTC) within the current day.
fn timestamp() -> String {
    let secs = unix_seconds();
    format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
}
