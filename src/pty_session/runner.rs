use super::io::spawn_reader_thread;
use super::pty::{close_fd, exit_code, set_nonblocking, spawn_pty_child, wait_child, ChildSpec};
use super::stdin::StdinClaim;
use super::winsize::{host_winsize, WinsizeForwarder};
use crate::bus::EventBus;
use crate::control::OscExtractor;
use crate::log_debug;
use crate::terminal_restore::TerminalRestoreGuard;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::bounded;
use std::env;
use std::ffi::{CString, OsStr};
use std::io::{IsTerminal, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const DEFAULT_TERM: &str = "xterm-256color";

/// A fully resolved child command: program, arguments, complete environment, directory.
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    working_dir: PathBuf,
}

impl PreparedCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: PathBuf::from("."),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set `key`, replacing any earlier value.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env.retain(|(existing, _)| *existing != key);
        self.env.push((key, value.into()));
        self
    }

    pub fn envs<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        vars.into_iter()
            .fold(self, |command, (key, value)| command.env(key, value))
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    fn child_spec(&self) -> Result<ChildSpec> {
        let mut argv = vec![to_cstring(self.program.as_os_str())?];
        for arg in &self.args {
            argv.push(CString::new(arg.as_str()).context("argument contains NUL")?);
        }
        let mut envp = Vec::with_capacity(self.env.len() + 1);
        for (key, value) in &self.env {
            envp.push(CString::new(format!("{key}={value}")).context("environment contains NUL")?);
        }
        if self.env_value("TERM").is_none() {
            let term = env::var("TERM").unwrap_or_else(|_| DEFAULT_TERM.to_string());
            envp.push(CString::new(format!("TERM={term}")).context("TERM contains NUL")?);
        }
        Ok(ChildSpec {
            argv,
            envp,
            working_dir: to_cstring(self.working_dir.as_os_str())?,
        })
    }
}

fn to_cstring(value: &OsStr) -> Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| anyhow!("path contains NUL: {value:?}"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Forward host keystrokes to the child (and switch the terminal to raw mode).
    pub interactive: bool,
    /// Pin the PTY width instead of following the host terminal.
    pub cols: Option<u16>,
}

/// Strips control sequences from PTY output and copies the rest to every sink.
struct FanOut {
    osc: OscExtractor,
    sinks: Vec<Box<dyn Write + Send>>,
}

impl FanOut {
    fn write_chunk(&mut self, chunk: &[u8]) {
        let visible = self.osc.filter(chunk);
        self.broadcast(&visible);
    }

    fn finish(&mut self) {
        let tail = self.osc.finish();
        self.broadcast(&tail);
        for sink in &mut self.sinks {
            let _ = sink.flush();
        }
    }

    fn broadcast(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        for sink in &mut self.sinks {
            if let Err(err) = sink.write_all(bytes).and_then(|_| sink.flush()) {
                log_debug(&format!("output sink write failed: {err}"));
            }
        }
    }
}

/// The host terminal could not be switched into raw mode.
#[derive(Debug)]
pub struct TerminalModeError(pub std::io::Error);

impl std::fmt::Display for TerminalModeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to enable raw mode: {}", self.0)
    }
}

impl std::error::Error for TerminalModeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Runs one prepared command under a PTY and reports its exit code.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtyRunner;

impl PtyRunner {
    pub fn new() -> Self {
        Self
    }

    /// Child output (minus control sequences) reaches every sink; control
    /// sequences are published on `bus`. Returns once the child has exited and
    /// its output has been fully copied.
    pub fn run(
        &self,
        command: &PreparedCommand,
        sinks: Vec<Box<dyn Write + Send>>,
        bus: &EventBus,
        options: RunOptions,
    ) -> Result<i32> {
        let spec = command.child_spec()?;
        let stdin_is_tty = std::io::stdin().is_terminal();
        let forward_stdin = options.interactive && stdin_is_tty;

        let guard = TerminalRestoreGuard::new();
        if forward_stdin {
            guard.enable_raw_mode().map_err(TerminalModeError)?;
        }

        let (rows, cols) = host_winsize(options.cols);
        // SAFETY: spec holds valid C strings; the fd is closed and the pid reaped below.
        let (master_fd, child_pid) = unsafe { spawn_pty_child(&spec, rows, cols) }
            .with_context(|| format!("failed to spawn {}", command.program.display()))?;
        log_debug(&format!(
            "spawned {} as pid {child_pid}",
            command.program.display()
        ));
        // SAFETY: master_fd was just returned by openpty.
        if let Err(err) = unsafe { set_nonblocking(master_fd) } {
            log_debug(&format!("failed to set PTY non-blocking: {err:#}"));
        }

        let child_exited = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded::<Vec<u8>>(100);
        let reader = spawn_reader_thread(master_fd, tx, Arc::clone(&child_exited));
        let mut fan_out = FanOut {
            osc: OscExtractor::new(bus.clone()),
            sinks,
        };
        let copier = thread::spawn(move || {
            for chunk in rx {
                fan_out.write_chunk(&chunk);
            }
            fan_out.finish();
        });
        let resize = std::io::stdout()
            .is_terminal()
            .then(|| WinsizeForwarder::start(master_fd, child_pid, options.cols));
        let stdin = forward_stdin.then(|| StdinClaim::start(master_fd));

        let status = wait_child(child_pid);
        child_exited.store(true, Ordering::SeqCst);

        if let Some(stdin) = stdin {
            stdin.stop();
        }
        if let Some(resize) = resize {
            resize.stop();
        }
        let _ = reader.join();
        let _ = copier.join();
        // SAFETY: every thread using master_fd has been joined.
        unsafe { close_fd(master_fd) };
        guard.restore();

        let status = status?;
        let code = exit_code(status);
        tracing::debug!(pid = child_pid, code, "child exited");
        Ok(code)
    }
}
