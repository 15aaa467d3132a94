use super::pty::set_winsize;
use crate::log_debug;
use anyhow::{anyhow, Result};
use crossterm::terminal::size as terminal_size;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

/// Flag set by SIGWINCH handler to trigger terminal resize.
static SIGWINCH_RECEIVED: AtomicBool = AtomicBool::new(false);
static HANDLER_INSTALLED: OnceLock<bool> = OnceLock::new();

/// Signal handler for terminal resize events.
///
/// Only uses atomic operations (async-signal-safe).
extern "C" fn handle_sigwinch(_: libc::c_int) {
    SIGWINCH_RECEIVED.store(true, Ordering::SeqCst);
}

pub(super) fn install_sigwinch_handler() -> Result<()> {
    let installed = *HANDLER_INSTALLED.get_or_init(|| unsafe {
        // SAFETY: handle_sigwinch is an extern "C" signal handler with no side effects
        // beyond flipping an atomic flag, which is async-signal-safe.
        let handler = handle_sigwinch as *const () as libc::sighandler_t;
        libc::signal(libc::SIGWINCH, handler) != libc::SIG_ERR
    });
    if installed {
        Ok(())
    } else {
        log_debug("failed to install SIGWINCH handler");
        Err(anyhow!("failed to install SIGWINCH handler"))
    }
}

pub(super) fn take_sigwinch() -> bool {
    SIGWINCH_RECEIVED.swap(false, Ordering::SeqCst)
}

/// Host terminal size as `(rows, cols)`, with `cols` optionally pinned.
pub(super) fn host_winsize(cols_override: Option<u16>) -> (u16, u16) {
    let (cols, rows) = terminal_size().unwrap_or((80, 24));
    (rows.max(1), cols_override.unwrap_or(cols).max(1))
}

/// Propagates host resizes to the PTY (and the child) while an execution runs.
pub(super) struct WinsizeForwarder {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WinsizeForwarder {
    pub(super) fn start(master_fd: RawFd, child_pid: i32, cols_override: Option<u16>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        if install_sigwinch_handler().is_err() {
            return Self { stop, handle: None };
        }
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                if take_sigwinch() {
                    let (rows, cols) = host_winsize(cols_override);
                    if set_winsize(master_fd, rows, cols).is_ok() {
                        // SAFETY: SIGWINCH is sent to the child pid owned by this runner.
                        let _ = unsafe { libc::kill(child_pid, libc::SIGWINCH) };
                    }
                }
                thread::sleep(Duration::from_millis(50));
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub(super) fn stop(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WinsizeForwarder {
    fn drop(&mut self) {
        self.release();
    }
}
