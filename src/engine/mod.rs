//! The engine driver: walks a segment list, renders prose and executes code.
//!
//! Execution is sequential at the segment level. Every code block gets a
//! fresh script manager, modifier set and control channel; environment
//! captured by one block is carried into the next.

mod error_parser;
mod execute;
mod report;
mod substitute;

#[cfg(test)]
mod tests;

pub use error_parser::{parse_error, ErrorLocation, ParsedError};
pub use report::FailureReport;
pub use substitute::{substitute, Substituted};

use crate::annotation::{AnnotationSet, Flag};
use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::log_debug;
use crate::pty_session::PtyRunner;
use crate::render::{AnnotationHandler, InlineMutator, Renderer};
use crate::segments::{self, Segment, SegmentList};
use crate::spinner::SpinnerState;
use crate::writer::SharedWriter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::time::Duration;
use tempfile::TempDir;

/// Exit status for runs ended by an `abort` block.
pub const EXIT_ABORTED: i32 = 254;
/// Exit status for host-side failures (pipe, PTY, missing interpreter).
pub const EXIT_HOST_ERROR: i32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorKind {
    InterpreterNotFound,
    Materialisation,
    ControlChannel,
    Pty,
    Terminal,
    UnknownSection,
}

impl fmt::Display for HostErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HostErrorKind::InterpreterNotFound => "interpreter not found",
            HostErrorKind::Materialisation => "failed to materialise script",
            HostErrorKind::ControlChannel => "control channel failure",
            HostErrorKind::Pty => "pty failure",
            HostErrorKind::Terminal => "terminal failure",
            HostErrorKind::UnknownSection => "unknown section",
        };
        f.write_str(text)
    }
}

/// Result of one segment, consumed by the driver loop.
#[derive(Debug)]
pub enum SegmentOutcome {
    Continue,
    /// Jump to the next heading at the same or a higher level.
    Skip,
    Stop { code: i32 },
    Abort { code: i32 },
    Failed(Box<FailureReport>),
    HostError {
        kind: HostErrorKind,
        error: anyhow::Error,
    },
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Stopped { code: i32 },
    Aborted { code: i32 },
    Failed(Box<FailureReport>),
    HostError {
        kind: HostErrorKind,
        error: anyhow::Error,
    },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Stopped { code } => *code,
            RunOutcome::Aborted { .. } => EXIT_ABORTED,
            RunOutcome::Failed(report) => report.exit_code,
            RunOutcome::HostError { .. } => EXIT_HOST_ERROR,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed | RunOutcome::Stopped { code: 0 })
    }
}

/// What one executed code block left behind.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub line: usize,
    pub language: String,
    pub exit_code: i32,
    /// Captured output, CRLF normalised and script paths replaced with `SCRIPT`.
    pub output: String,
    pub raw_output: String,
    pub env: BTreeMap<String, String>,
    pub duration: Duration,
    pub title: String,
    pub state: SpinnerState,
}

pub struct Engine {
    config: EngineConfig,
    out: SharedWriter,
    bus: EventBus,
    runner: PtyRunner,
    env: BTreeMap<String, String>,
    run_dir: Option<TempDir>,
    records: Vec<ExecutionRecord>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_output(config, SharedWriter::stdout())
    }

    pub fn with_output(config: EngineConfig, out: SharedWriter) -> Self {
        let env = config.env.clone();
        Self {
            config,
            out,
            bus: EventBus::new(),
            runner: PtyRunner::new(),
            env,
            run_dir: None,
            records: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Variables layered over the host environment for the next code block.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// Parse `source` and run it (only the configured section, when one is set).
    pub fn run_document(&mut self, source: &str) -> RunOutcome {
        let segments = segments::build(source);
        match self.config.section.clone() {
            Some(label) => self.run_section(&segments, &label),
            None => self.run(&segments),
        }
    }

    pub fn run(&mut self, segments: &SegmentList) -> RunOutcome {
        if let Some(outcome) = self.begin(segments) {
            return outcome;
        }
        self.walk(segments, 0, segments.len())
    }

    /// Run the heading labelled `label` and everything nested under it,
    /// after the setup blocks of every enclosing heading.
    pub fn run_section(&mut self, segments: &SegmentList, label: &str) -> RunOutcome {
        let Some(start) = segments.find_short_code(label) else {
            return RunOutcome::HostError {
                kind: HostErrorKind::UnknownSection,
                error: anyhow::anyhow!("no heading is labelled `{label}`"),
            };
        };
        if let Some(outcome) = self.begin(segments) {
            return outcome;
        }
        let level = segments.heading(start).map_or(u8::MAX, |heading| heading.level);
        let end = segments.next_heading_at_or_above(start, level);
        tracing::info!(label, start, end, "running section");
        self.walk(segments, start, end)
    }

    fn begin(&mut self, segments: &SegmentList) -> Option<RunOutcome> {
        for diagnostic in segments.diagnostics() {
            let text = format!("warning: line {}: {}\n", diagnostic.line, diagnostic.diagnostic);
            tracing::warn!(line = diagnostic.line, "{}", diagnostic.diagnostic);
            self.emit(text.as_bytes());
        }
        if self.run_dir.is_none() {
            match tempfile::Builder::new().prefix("rundown").tempdir() {
                Ok(dir) => self.run_dir = Some(dir),
                Err(err) => {
                    return Some(RunOutcome::HostError {
                        kind: HostErrorKind::Materialisation,
                        error: anyhow::Error::new(err).context("failed to create run directory"),
                    })
                }
            }
        }
        None
    }

    fn walk(&mut self, segments: &SegmentList, start: usize, end: usize) -> RunOutcome {
        let mut idx = start;
        while idx < end {
            let Some(segment) = segments.get(idx) else {
                break;
            };
            let outcome = match segment {
                Segment::Display(display) => {
                    self.render_nodes(&display.nodes, display.level);
                    SegmentOutcome::Continue
                }
                Segment::Heading(heading) => match self.run_ancestor_setups(segments, idx) {
                    SegmentOutcome::Continue => {
                        let mut buf = Vec::new();
                        let _ = Renderer::new(heading.level, self.config.color)
                            .render_heading(heading, &mut buf);
                        self.emit(&buf);
                        SegmentOutcome::Continue
                    }
                    other => other,
                },
                Segment::Setup(setup) => {
                    if setup.has_run() {
                        SegmentOutcome::Continue
                    } else {
                        setup.mark_run();
                        self.execute(&setup.code)
                    }
                }
                Segment::Code(code) => self.execute(code),
                Segment::Separator => {
                    self.emit(b"\n");
                    SegmentOutcome::Continue
                }
            };
            match outcome {
                SegmentOutcome::Continue => idx += 1,
                SegmentOutcome::Skip => {
                    let level = match segment.level() {
                        Some(0) | None => u8::MAX,
                        Some(level) => level,
                    };
                    idx = segments.next_heading_at_or_above(idx, level);
                }
                SegmentOutcome::Stop { code } => return RunOutcome::Stopped { code },
                SegmentOutcome::Abort { code } => return RunOutcome::Aborted { code },
                SegmentOutcome::Failed(report) => {
                    if self.config.failure_reports {
                        let text = report.render(self.config.width(), self.config.color);
                        self.emit(text.as_bytes());
                    }
                    return RunOutcome::Failed(report);
                }
                SegmentOutcome::HostError { kind, error } => {
                    log_debug(&format!("host error ({kind}): {error:#}"));
                    self.emit(format!("rundown: {kind}: {error:#}\n").as_bytes());
                    return RunOutcome::HostError { kind, error };
                }
            }
        }
        RunOutcome::Completed
    }

    /// Setup blocks of every heading enclosing `idx` (excluding `idx` itself), root first.
    fn run_ancestor_setups(&mut self, segments: &SegmentList, idx: usize) -> SegmentOutcome {
        for heading_idx in segments.heading_chain(idx) {
            if heading_idx == idx {
                continue;
            }
            let Some(heading) = segments.heading(heading_idx) else {
                continue;
            };
            for setup_idx in &heading.setups {
                let Some(setup) = segments.setup(*setup_idx) else {
                    continue;
                };
                if setup.has_run() {
                    continue;
                }
                setup.mark_run();
                match self.execute(&setup.code) {
                    SegmentOutcome::Continue | SegmentOutcome::Skip => {}
                    other => return other,
                }
            }
        }
        SegmentOutcome::Continue
    }

    fn render_nodes(&self, nodes: &[crate::markdown::Node], level: u8) {
        let mutator = EnvMutator { engine_env: &self.env };
        let mut handler = DiagnosticLogger;
        let mut buf = Vec::new();
        {
            let mut renderer = Renderer::new(level, self.config.color)
                .with_mutator(&mutator)
                .with_handler(&mut handler);
            for node in nodes {
                if let Err(err) = renderer.render(node, &mut buf) {
                    log_debug(&format!("render failed: {err}"));
                }
            }
        }
        self.emit(&buf);
    }

    fn emit(&self, bytes: &[u8]) {
        if let Err(err) = self.out.emit(bytes) {
            log_debug(&format!("terminal write failed: {err}"));
        }
    }

    /// Engine variables first, then the host environment.
    fn lookup(&self, name: &str) -> Option<String> {
        lookup_in(&self.env, name)
    }
}

fn lookup_in(engine_env: &BTreeMap<String, String>, name: &str) -> Option<String> {
    engine_env
        .get(name)
        .cloned()
        .or_else(|| env::var(name).ok())
}

/// Applies `$VAR` substitution to inline spans flagged `sub-env`.
struct EnvMutator<'a> {
    engine_env: &'a BTreeMap<String, String>,
}

impl InlineMutator for EnvMutator<'_> {
    fn mutate(&self, annotations: &AnnotationSet, rendered: Vec<u8>) -> Vec<u8> {
        if !annotations.has(Flag::SubEnv) {
            return rendered;
        }
        let text = String::from_utf8_lossy(&rendered);
        substitute(&text, |name| lookup_in(self.engine_env, name))
            .text
            .into_bytes()
    }
}

/// Annotation blocks left inside prose have no effect; note them in the debug log.
struct DiagnosticLogger;

impl AnnotationHandler for DiagnosticLogger {
    fn on_annotation(&mut self, annotations: &AnnotationSet) {
        log_debug(&format!(
            "annotation block outside a code context: {:?}",
            annotations.flags().collect::<Vec<_>>()
        ));
    }
}
