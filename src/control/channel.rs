use super::ControlMessage;
use crate::bus::EventBus;
use crate::log_debug;
use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// Environment variable carrying the pipe path into the child.
pub const RPC_ENV_VAR: &str = "RDRPC";

// Host-written markers; the leading SOH keeps them apart from anything a script would print.
const SYNC_MARKER: &str = "\u{1}rundown:sync ";
const CLOSE_MARKER: &str = "\u{1}rundown:close";

/// Named pipe scripts write newline-terminated control messages into.
///
/// The pipe is opened read-write by the host so it never reports EOF while
/// children come and go; a reader thread publishes each line on the bus.
pub struct ControlChannel {
    path: PathBuf,
    fifo: Option<NamedTempFile<()>>,
    writer: File,
    reader: Option<thread::JoinHandle<()>>,
    acks: Receiver<u64>,
    next_sync: u64,
}

impl ControlChannel {
    pub fn open(bus: EventBus) -> Result<Self> {
        let fifo = tempfile::Builder::new()
            .prefix("rundown-rpc-")
            .make(|path| create_fifo(path))
            .context("failed to create control pipe")?;
        let writer = OpenOptions::new()
            .read(true)
            .write(true)
            .open(fifo.path())
            .with_context(|| format!("failed to open control pipe {}", fifo.path().display()))?;
        let reader_file = writer
            .try_clone()
            .context("failed to clone control pipe handle")?;
        let (ack_tx, acks) = unbounded();
        let reader = thread::Builder::new()
            .name("rundown-rpc".into())
            .spawn(move || read_messages(reader_file, &bus, &ack_tx))
            .context("failed to spawn control pipe reader")?;
        log_debug(&format!("control pipe opened at {}", fifo.path().display()));
        Ok(Self {
            path: fifo.path().to_path_buf(),
            fifo: Some(fifo),
            writer,
            reader: Some(reader),
            acks,
            next_sync: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every message written before this call has been published.
    ///
    /// Returns `false` when the reader did not catch up within `timeout`.
    pub fn sync(&mut self, timeout: Duration) -> bool {
        self.next_sync += 1;
        let id = self.next_sync;
        if self
            .writer
            .write_all(format!("{SYNC_MARKER}{id}\n").as_bytes())
            .is_err()
        {
            return false;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.acks.recv_timeout(remaining) {
                Ok(ack) if ack >= id => return true,
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    log_debug("control pipe sync timed out");
                    return false;
                }
            }
        }
    }

    /// Stop the reader and remove the pipe from the filesystem.
    pub fn close(mut self) -> Result<()> {
        self.shutdown();
        match self.fifo.take() {
            Some(fifo) => fifo.close().context("failed to remove control pipe"),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        if self
            .writer
            .write_all(format!("{CLOSE_MARKER}\n").as_bytes())
            .is_ok()
        {
            let _ = reader.join();
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn create_fifo(path: &Path) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    // SAFETY: c_path is a valid NUL-terminated path for the duration of the call.
    if unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn read_messages(file: File, bus: &EventBus, acks: &Sender<u64>) {
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                log_debug(&format!("control pipe read error: {err}"));
                break;
            }
        }
        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches(['\n', '\r']);
        if text == CLOSE_MARKER {
            break;
        }
        if let Some(id) = text.strip_prefix(SYNC_MARKER) {
            if let Ok(id) = id.parse() {
                let _ = acks.send(id);
            }
            continue;
        }
        bus.publish(&ControlMessage::parse(text));
    }
}
