use crate::log_debug;
use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// After the child exits, stop reading once the PTY has been quiet this long.
/// Covers background grandchildren that keep the slave side open.
const POST_EXIT_IDLE: Duration = Duration::from_millis(150);

fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Drain the PTY master into `tx` until EOF/EIO, or until the PTY has been
/// idle for a moment after `child_exited` was raised.
pub(super) fn spawn_reader_thread(
    master_fd: RawFd,
    tx: Sender<Vec<u8>>,
    child_exited: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        let mut quiet_since: Option<Instant> = None;
        loop {
            // SAFETY: master_fd stays open until this thread has been joined.
            let n = unsafe {
                libc::read(
                    master_fd,
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                )
            };
            if n > 0 {
                quiet_since = None;
                let data = buffer.get(..n as usize).unwrap_or(&[]).to_vec();
                if tx.send(data).is_err() {
                    break;
                }
                continue;
            }
            if n == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if is_transient(&err) {
                if child_exited.load(Ordering::SeqCst) {
                    let since = *quiet_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= POST_EXIT_IDLE {
                        break;
                    }
                }
                thread::sleep(Duration::from_millis(5));
                continue;
            }
            // EIO is the normal end of stream once the slave side is closed.
            if err.raw_os_error() != Some(libc::EIO) {
                log_debug(&format!("PTY read error: {err}"));
            }
            break;
        }
    })
}

/// Forward keystrokes to the PTY master, retrying short and interrupted writes.
pub(super) fn write_all(fd: RawFd, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        // SAFETY: fd is the open PTY master; data is a valid slice.
        let written = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
        if written < 0 {
            let err = io::Error::last_os_error();
            if is_transient(&err) {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            return Err(anyhow!("failed to forward input to PTY: {err}"));
        }
        if written == 0 {
            return Err(anyhow!("PTY accepted no input bytes"));
        }
        let written = written as usize;
        data = data.get(written..).unwrap_or(&[]);
    }
    Ok(())
}
