//! Thread-shareable writers used for terminal output and output capture.

use crate::lock_or_recover;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// A cloneable handle on one underlying writer (normally the host terminal).
///
/// The spinner ticker, the renderer and streamed child output all write
/// through the same handle so their bytes never interleave mid-write.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SharedWriter {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Write `bytes` and flush while holding the lock once.
    pub fn emit(&self, bytes: &[u8]) -> io::Result<()> {
        let mut guard = lock_or_recover(&self.inner, "SharedWriter::emit");
        guard.write_all(bytes)?;
        guard.flush()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock_or_recover(&self.inner, "SharedWriter::write").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        lock_or_recover(&self.inner, "SharedWriter::flush").flush()
    }
}

/// In-memory sink whose contents stay readable after the writer is handed off.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        lock_or_recover(&self.inner, "SharedBuffer::contents").clone()
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    pub fn clear(&self) {
        lock_or_recover(&self.inner, "SharedBuffer::clear").clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock_or_recover(&self.inner, "SharedBuffer::write").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
