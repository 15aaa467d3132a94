use super::{Collected, CollectedValue, Modifier};
use crate::bus::EventBus;
use crate::scripts::ScriptManager;
use crate::writer::{SharedBuffer, SharedWriter};
use std::io::Write;

/// Buffers everything the child writes.
#[derive(Default)]
pub struct StdoutCapture {
    buffer: SharedBuffer,
}

impl StdoutCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Modifier for StdoutCapture {
    fn name(&self) -> &'static str {
        "stdout-capture"
    }

    fn sinks(&mut self) -> Vec<Box<dyn Write + Send>> {
        vec![Box::new(self.buffer.clone())]
    }

    fn collect(&mut self, scripts: &ScriptManager, _bus: &EventBus) -> Vec<Collected> {
        let raw = self.buffer.contents_lossy();
        let masked = mask_paths(&raw.replace("\r\n", "\n"), &scripts.paths());
        vec![Collected {
            label: "output",
            value: CollectedValue::Output { masked, raw },
        }]
    }
}

/// Replace every occurrence of each path with `SCRIPT`.
pub fn mask_paths(text: &str, paths: &[String]) -> String {
    paths
        .iter()
        .filter(|path| !path.is_empty())
        .fold(text.to_string(), |acc, path| acc.replace(path.as_str(), "SCRIPT"))
}

/// Forwards child output straight to the terminal.
pub struct StdoutStream {
    out: SharedWriter,
}

impl StdoutStream {
    pub fn new(out: SharedWriter) -> Self {
        Self { out }
    }
}

impl Modifier for StdoutStream {
    fn name(&self) -> &'static str {
        "stdout-stream"
    }

    fn sinks(&mut self) -> Vec<Box<dyn Write + Send>> {
        vec![Box::new(self.out.clone())]
    }
}
