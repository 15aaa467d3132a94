//! Size-capped debug and crash logs in the temp directory.
//!
//! Both logs stay off unless `--logs` is given. Script bodies, captured
//! output and panic payloads are only written with `--log-content`.

use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const DEBUG_LOG_CAP: u64 = 5 * 1024 * 1024;
const CRASH_LOG_CAP: u64 = 256 * 1024;

static ENABLED: AtomicBool = AtomicBool::new(false);
static CONTENT: AtomicBool = AtomicBool::new(false);
static DEBUG_LOG: OnceLock<Mutex<Option<CappedLog>>> = OnceLock::new();

pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("rundown_debug.log")
}

/// Crash lines carry location and version; payloads only with content logging.
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("rundown_crash.log")
}

/// Append-only file that starts over once a write would pass `cap` bytes.
struct CappedLog {
    path: PathBuf,
    file: fs::File,
    cap: u64,
    len: u64,
}

impl CappedLog {
    fn open(path: &Path, cap: u64) -> Option<Self> {
        let existing = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
        let (file, len) = if existing > cap {
            (Self::truncated(path)?, 0)
        } else {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()?;
            (file, existing)
        };
        Some(Self {
            path: path.to_path_buf(),
            file,
            cap,
            len,
        })
    }

    fn truncated(path: &Path) -> Option<fs::File> {
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .ok()
    }

    fn append(&mut self, line: &str) {
        let size = line.len() as u64;
        if self.len.saturating_add(size) > self.cap {
            match Self::truncated(&self.path) {
                Some(file) => {
                    self.file = file;
                    self.len = 0;
                }
                None => return,
            }
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.len = self.len.saturating_add(size);
        }
    }
}

fn debug_log() -> MutexGuard<'static, Option<CappedLog>> {
    DEBUG_LOG
        .get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn stamped(msg: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("[{secs}] {msg}\n")
}

fn configure(enabled: bool, content: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
    CONTENT.store(enabled && content, Ordering::Relaxed);
    *debug_log() = if enabled {
        CappedLog::open(&log_file_path(), DEBUG_LOG_CAP)
    } else {
        None
    };
}

/// `--no-logs` always wins over `--logs`.
pub fn init_logging(config: &AppConfig) {
    configure(config.logs && !config.no_logs, config.log_content);
}

pub fn log_debug(msg: &str) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    if let Some(log) = debug_log().as_mut() {
        log.append(&stamped(msg));
    }
}

/// Like [`log_debug`], for messages quoting document or child content.
pub fn log_debug_content(msg: &str) {
    if CONTENT.load(Ordering::Relaxed) {
        log_debug(msg);
    }
}

pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = if CONTENT.load(Ordering::Relaxed) {
        let payload = info.payload();
        payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string())
    } else {
        "payload omitted".to_string()
    };
    let line = stamped(&format!(
        "panic at {location}: {payload} (rundown {})",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(mut log) = CappedLog::open(&crash_log_path(), CRASH_LOG_CAP) {
        log.append(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_log_starts_over_when_full() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("debug.log");
        let mut log = CappedLog::open(&path, 16).expect("open");
        log.append("0123456789\n");
        log.append("abcdefghij\n");
        assert_eq!(fs::read_to_string(&path).expect("read"), "abcdefghij\n");
    }

    #[test]
    fn oversized_existing_log_is_truncated_on_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("debug.log");
        fs::write(&path, "x".repeat(64)).expect("seed");
        let mut log = CappedLog::open(&path, 32).expect("open");
        log.append("fresh\n");
        assert_eq!(fs::read_to_string(&path).expect("read"), "fresh\n");
    }

    #[test]
    fn content_logging_requires_both_switches() {
        configure(true, false);
        assert!(ENABLED.load(Ordering::Relaxed));
        assert!(!CONTENT.load(Ordering::Relaxed));
        configure(false, true);
        assert!(!CONTENT.load(Ordering::Relaxed));
        configure(false, false);
    }
}
