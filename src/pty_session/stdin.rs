//! Process-wide standard-input reader shared by interactive executions.
//!
//! Standard input can only be read by one thread, so a single reader is
//! started on first use and executions take turns claiming its output.

use super::io::write_all;
use crate::{lock_or_recover, log_debug};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::io::{self, Read};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

struct StdinHub {
    rx: Receiver<Vec<u8>>,
    claim: Mutex<()>,
}

static STDIN_HUB: OnceLock<StdinHub> = OnceLock::new();

fn hub() -> &'static StdinHub {
    STDIN_HUB.get_or_init(|| {
        let (tx, rx) = unbounded();
        let spawned = thread::Builder::new()
            .name("rundown-stdin".into())
            .spawn(move || {
                let mut stdin = io::stdin();
                let mut buf = [0u8; 1024];
                loop {
                    match stdin.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            log_debug(&format!("stdin read error: {err}"));
                            break;
                        }
                    }
                }
            });
        if let Err(err) = spawned {
            log_debug(&format!("failed to spawn stdin reader: {err}"));
        }
        StdinHub {
            rx,
            claim: Mutex::new(()),
        }
    })
}

/// Carriage returns typed in raw mode are delivered to the child as newlines.
pub(super) fn translate_input(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .map(|byte| if *byte == b'\r' { b'\n' } else { *byte })
        .collect()
}

/// Forwards host keystrokes to one PTY until stopped.
pub(super) struct StdinClaim {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StdinClaim {
    pub(super) fn start(master_fd: RawFd) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let hub = hub();
            let _claim = lock_or_recover(&hub.claim, "stdin claim");
            while !flag.load(Ordering::SeqCst) {
                match hub.rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(bytes) => {
                        if let Err(err) = write_all(master_fd, &translate_input(&bytes)) {
                            log_debug(&format!("stdin forward stopped: {err:#}"));
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
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

impl Drop for StdinClaim {
    fn drop(&mut self) {
        self.release();
    }
}
