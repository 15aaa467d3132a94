//! One code block: annotation decisions, script preparation, the PTY run
//! and classification of the exit status.

use super::error_parser::parse_error;
use super::report::FailureReport;
use super::substitute::substitute;
use super::{Engine, ExecutionRecord, HostErrorKind, ParsedError, SegmentOutcome};
use crate::annotation::{AnnotationSet, Flag, Param};
use crate::config::SpinnerMode;
use crate::control::{ControlChannel, RPC_ENV_VAR};
use crate::lock_or_recover;
use crate::log_debug;
use crate::log_debug_content;
use crate::markdown::{Node, NodeKind};
use crate::modifiers::{
    EnvCapture, ModifierSet, SpinnerConstant, SpinnerFromScript, StdoutCapture, StdoutStream,
    TrackProgress,
};
use crate::pty_session::{PreparedCommand, RunOptions, TerminalModeError};
use crate::render::Renderer;
use crate::scripts::{find_interpreter, InterpreterNotFound, Script, ScriptManager};
use crate::segments::CodeSegment;
use crate::spinner::{self, LiveSpinner, SharedSpinner, SilentSpinner, SpinnerState};
use anyhow::Context;
use std::env;
use std::fs;
use std::time::Duration;

const DEFAULT_TITLE: &str = "Running";
const PROGRESS_KEY: &str = "block";
const SYNC_TIMEOUT: Duration = Duration::from_secs(2);

impl Engine {
    pub(super) fn execute(&mut self, code: &CodeSegment) -> SegmentOutcome {
        let annotations = &code.annotations;
        let Some(language) = code.language.as_deref() else {
            self.reveal(code, &code.source);
            return SegmentOutcome::Continue;
        };
        tracing::debug!(line = code.line, language, "code block");

        let (body, unresolved) = if annotations.has(Flag::SubEnv) {
            let substituted = substitute(&code.source, |name| self.lookup(name));
            (substituted.text, substituted.unresolved)
        } else {
            (code.source.clone(), Vec::new())
        };

        if let Some(name) = annotations.param(Param::Save) {
            return self.save(code, name, &body);
        }

        if annotations.has(Flag::NoRun) {
            if !annotations.has(Flag::Reveal) {
                return SegmentOutcome::Continue;
            }
            self.reveal(code, &body);
            if annotations.has(Flag::SubEnv) && !unresolved.is_empty() {
                return SegmentOutcome::Failed(Box::new(FailureReport {
                    exit_code: 1,
                    document_line: code.line,
                    source: code.source.clone(),
                    output: String::new(),
                    error: ParsedError::Opaque(format!(
                        "unresolved variables: {}",
                        unresolved.join(", ")
                    )),
                }));
            }
            return SegmentOutcome::Continue;
        }

        if annotations.has(Flag::Reveal) {
            self.reveal(code, &body);
        }

        let invocation = annotations.param(Param::With).unwrap_or(language).to_string();
        self.run_block(code, &invocation, body)
    }

    fn run_block(&mut self, code: &CodeSegment, invocation: &str, body: String) -> SegmentOutcome {
        let annotations = &code.annotations;
        if let Err(err) = find_interpreter(invocation) {
            return host_error_for(err, HostErrorKind::Materialisation);
        }
        log_debug_content(&format!("code block at line {}:\n{body}", code.line));

        let title = spinner_title(annotations, &body);
        let spinner = self.spinner_for(code);
        lock_or_recover(&spinner, "Engine::run_block start").start(&title);

        let interactive = annotations.has(Flag::Interactive);
        let mut modifiers = ModifierSet::new();
        modifiers.push(StdoutCapture::new());
        if annotations.has(Flag::Stdout) || interactive {
            modifiers.push(StdoutStream::new(self.out.clone()));
        }
        if annotations.has(Flag::Env) {
            modifiers.push(EnvCapture::new());
        }
        modifiers.push(SpinnerFromScript::new(
            spinner.clone(),
            annotations.has(Flag::NamedAll),
        ));
        modifiers.push(SpinnerConstant::new(spinner.clone()));
        if self.config.track_progress {
            modifiers.push(TrackProgress::new(PROGRESS_KEY));
        }
        tracing::debug!(modifiers = ?modifiers.names(), "modifiers selected");

        let mut scripts = ScriptManager::in_temp_dir();
        scripts.set_base(Script::new("main", invocation, body));

        let channel = match ControlChannel::open(self.bus.clone()) {
            Ok(channel) => channel,
            Err(error) => {
                lock_or_recover(&spinner, "Engine::run_block").finish(SpinnerState::Error);
                return SegmentOutcome::HostError {
                    kind: HostErrorKind::ControlChannel,
                    error,
                };
            }
        };

        let prepared = modifiers
            .prepare(&mut scripts, &self.bus)
            .and_then(|()| scripts.materialise_all());
        if let Err(err) = prepared {
            // Unsubscribe anything prepare registered before giving up.
            let _ = modifiers.collect(&scripts, &self.bus);
            let _ = channel.close();
            lock_or_recover(&spinner, "Engine::run_block").finish(SpinnerState::Error);
            return host_error_for(err, HostErrorKind::Materialisation);
        }

        let command = match self.command_for(&scripts, &channel) {
            Ok(command) => command,
            Err(error) => {
                let _ = modifiers.collect(&scripts, &self.bus);
                let _ = channel.close();
                lock_or_recover(&spinner, "Engine::run_block").finish(SpinnerState::Error);
                return SegmentOutcome::HostError {
                    kind: HostErrorKind::Materialisation,
                    error,
                };
            }
        };

        let options = RunOptions {
            interactive,
            cols: self.config.cols,
        };
        let run = self
            .runner
            .run(&command, modifiers.sinks(), &self.bus, options);
        let mut channel = channel;
        if !channel.sync(SYNC_TIMEOUT) {
            tracing::warn!(line = code.line, "control messages may be incomplete");
        }
        let results = modifiers.collect(&scripts, &self.bus);
        if let Err(err) = channel.close() {
            log_debug(&format!("{err:#}"));
        }

        let exit_code = match run {
            Ok(exit_code) => exit_code,
            Err(error) => {
                lock_or_recover(&spinner, "Engine::run_block").finish(SpinnerState::Error);
                return host_error_for(error, HostErrorKind::Pty);
            }
        };

        let (masked, raw) = results
            .output()
            .map(|(masked, raw)| (masked.to_string(), raw.to_string()))
            .unwrap_or_default();
        log_debug_content(&format!("output of line {}:\n{masked}", code.line));

        let captured_env = results.env().cloned().unwrap_or_default();
        if annotations.has(Flag::Env) {
            self.env
                .extend(captured_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let (outcome, state) = classify(exit_code, annotations);
        lock_or_recover(&spinner, "Engine::run_block finish").finish(state);
        tracing::info!(line = code.line, exit_code, ?state, "code block finished");

        let outcome = match outcome {
            Classified::Continue => SegmentOutcome::Continue,
            Classified::Skip => SegmentOutcome::Skip,
            Classified::Stop => SegmentOutcome::Stop { code: exit_code },
            Classified::Abort => SegmentOutcome::Abort { code: exit_code },
            Classified::Fail => SegmentOutcome::Failed(Box::new(FailureReport {
                exit_code,
                document_line: code.line,
                source: code.source.clone(),
                output: masked.clone(),
                error: parse_error(&raw, &scripts),
            })),
        };

        self.records.push(ExecutionRecord {
            line: code.line,
            language: invocation.to_string(),
            exit_code,
            output: masked,
            raw_output: raw,
            env: captured_env,
            duration: results.duration().unwrap_or_default(),
            title: results
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| title.clone()),
            state,
        });
        outcome
    }

    fn command_for(
        &self,
        scripts: &ScriptManager,
        channel: &ControlChannel,
    ) -> anyhow::Result<PreparedCommand> {
        let program = scripts
            .base()
            .and_then(Script::path)
            .context("base script was not materialised")?;
        let host = env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        Ok(PreparedCommand::new(program)
            .envs(host)
            .envs(self.env.clone())
            .env(RPC_ENV_VAR, channel.path().display().to_string())
            .envs(scripts.env_refs())
            .current_dir(&self.config.working_dir))
    }

    fn spinner_for(&self, code: &CodeSegment) -> SharedSpinner {
        let annotations = &code.annotations;
        let silent = annotations.has(Flag::NoSpin)
            || annotations.has(Flag::Interactive)
            || self.config.spinner == SpinnerMode::Silent;
        if silent {
            return spinner::shared(SilentSpinner::new());
        }
        let live = LiveSpinner::new(self.out.clone(), code.level, self.config.width());
        if annotations.has(Flag::Stdout) {
            spinner::shared(live.static_output())
        } else {
            spinner::shared(live)
        }
    }

    /// Write the body to the run directory and bind its path to the upper-cased stem.
    fn save(&mut self, code: &CodeSegment, name: &str, body: &str) -> SegmentOutcome {
        let Some(dir) = self.run_dir.as_ref().map(|dir| dir.path().to_path_buf()) else {
            return SegmentOutcome::HostError {
                kind: HostErrorKind::Materialisation,
                error: anyhow::anyhow!("no run directory for save={name}"),
            };
        };
        let Some(file_name) = std::path::Path::new(name).file_name() else {
            return SegmentOutcome::HostError {
                kind: HostErrorKind::Materialisation,
                error: anyhow::anyhow!("invalid save target `{name}`"),
            };
        };
        let path = dir.join(file_name);
        if let Err(err) = fs::write(&path, body) {
            return SegmentOutcome::HostError {
                kind: HostErrorKind::Materialisation,
                error: anyhow::Error::new(err)
                    .context(format!("failed to save {}", path.display())),
            };
        }
        let key = save_key(name);
        log_debug(&format!("saved {} as ${key}", path.display()));
        self.env.insert(key, path.display().to_string());
        if code.annotations.has(Flag::Reveal) {
            self.reveal(code, body);
        }
        SegmentOutcome::Continue
    }

    fn reveal(&self, code: &CodeSegment, body: &str) {
        let node = with_literal(&code.node, body);
        let mut buf = Vec::new();
        if let Err(err) = Renderer::new(code.level, self.config.color).render(&node, &mut buf) {
            log_debug(&format!("render failed: {err}"));
        }
        self.emit(&buf);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Classified {
    Continue,
    Skip,
    Stop,
    Abort,
    Fail,
}

/// Map an exit status and the block's flags to the next step and the spinner's final glyph.
pub(super) fn classify(exit_code: i32, annotations: &AnnotationSet) -> (Classified, SpinnerState) {
    if exit_code == 0 {
        if annotations.has(Flag::SkipOnSuccess) {
            (Classified::Skip, SpinnerState::Skipped)
        } else if annotations.has(Flag::StopOk) {
            (Classified::Stop, SpinnerState::Success)
        } else {
            (Classified::Continue, SpinnerState::Success)
        }
    } else if annotations.has(Flag::SkipOnFailure) {
        (Classified::Skip, SpinnerState::Skipped)
    } else if annotations.has(Flag::SkipOnSuccess) {
        (Classified::Continue, SpinnerState::Skipped)
    } else if annotations.has(Flag::IgnoreFailure) {
        (Classified::Continue, SpinnerState::Error)
    } else if annotations.has(Flag::Abort) {
        (Classified::Abort, SpinnerState::Error)
    } else if annotations.has(Flag::StopFail) {
        (Classified::Stop, SpinnerState::Error)
    } else {
        (Classified::Fail, SpinnerState::Error)
    }
}

/// `spinner=` wins, then the first comment line with `named`, then a fixed label.
pub(super) fn spinner_title(annotations: &AnnotationSet, body: &str) -> String {
    if let Some(title) = annotations.param(Param::Spinner) {
        return title.to_string();
    }
    if annotations.has(Flag::Named) {
        if let Some(title) = body.lines().find_map(comment_text) {
            return title;
        }
    }
    DEFAULT_TITLE.to_string()
}

fn comment_text(line: &str) -> Option<String> {
    let line = line.trim_start();
    let rest = ["#>", "#", "//", "--", ";"]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))?;
    let text = rest.trim();
    (!text.is_empty() && !text.starts_with('!')).then(|| text.to_string())
}

/// `deploy.conf` binds `DEPLOY`; anything outside `[A-Z0-9_]` becomes `_`.
pub(super) fn save_key(name: &str) -> String {
    let stem = std::path::Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name);
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn with_literal(node: &Node, body: &str) -> Node {
    let mut node = node.clone();
    if let NodeKind::CodeBlock(block) = &mut node.kind {
        block.literal = body.to_string();
    }
    node
}

pub(super) fn host_error_for(error: anyhow::Error, fallback: HostErrorKind) -> SegmentOutcome {
    let kind = if error.downcast_ref::<InterpreterNotFound>().is_some() {
        HostErrorKind::InterpreterNotFound
    } else if error.downcast_ref::<TerminalModeError>().is_some() {
        HostErrorKind::Terminal
    } else {
        fallback
    };
    SegmentOutcome::HostError { kind, error }
}
