//! Materialises code blocks as executable script files.
//!
//! A code block becomes a *base* script; modifiers may add auxiliary scripts
//! (wrappers) and rewrite the base before anything touches the filesystem.
//! Every script's path is exported to the others as `SCRIPT_<NAME>`.

mod rewrite;

#[cfg(test)]
mod tests;

pub use rewrite::{comment_to_control, env_capture_prefix, progress_wrapper, spinner_control};

use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Interpreters whose scripts understand POSIX shell syntax.
const SHELL_LIKE: &[&str] = &["sh", "bash", "zsh", "dash", "ksh", "ash"];

/// Shebang line plus the blank line that follows it.
pub const HEADER_LINES: usize = 2;

pub struct Script {
    name: String,
    invocation: String,
    source: String,
    prefix: String,
    materialised: Option<TempPath>,
}

impl Script {
    pub fn new(name: impl Into<String>, invocation: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invocation: invocation.into(),
            source: source.into(),
            prefix: String::new(),
            materialised: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invocation(&self) -> &str {
        &self.invocation
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prepend `text` ahead of any prefix already installed.
    pub fn prepend(&mut self, text: &str) {
        let mut prefix = text.to_string();
        if !prefix.is_empty() && !prefix.ends_with('\n') {
            prefix.push('\n');
        }
        prefix.push_str(&self.prefix);
        self.prefix = prefix;
    }

    pub fn path(&self) -> Option<&Path> {
        self.materialised.as_deref()
    }

    /// `SCRIPT_<NAME>` with the name upper-cased and non-alphanumerics mapped to `_`.
    pub fn env_name(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() {
                    ch.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("SCRIPT_{name}")
    }

    /// The interpreter's base name, e.g. `bash` for `/bin/bash -e`.
    pub fn interpreter(&self) -> Option<String> {
        let words = shell_words::split(&self.invocation).ok()?;
        let first = words.into_iter().next()?;
        Path::new(&first)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn is_shell_like(&self) -> bool {
        self.interpreter()
            .is_some_and(|name| SHELL_LIKE.contains(&name.as_str()))
    }

    /// Lines before the body starts: the header plus every prefix line.
    pub fn offset_lines(&self) -> usize {
        HEADER_LINES + self.prefix.matches('\n').count()
    }

    /// Map a line number reported by the interpreter back to the body.
    pub fn body_line(&self, reported: usize) -> Option<usize> {
        reported
            .checked_sub(self.offset_lines())
            .filter(|line| *line > 0)
    }

    pub fn contents(&self) -> String {
        // `env -S` splits multi-word invocations such as `python3 -u`.
        let split = if self.invocation.split_whitespace().nth(1).is_some() {
            "-S "
        } else {
            ""
        };
        let mut contents = format!("#!/usr/bin/env {split}{}\n\n", self.invocation);
        contents.push_str(&self.prefix);
        contents.push_str(&self.source);
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents
    }

    fn materialise(&mut self, dir: &Path) -> Result<()> {
        let stem: String = self.name.to_ascii_lowercase();
        let mut file = tempfile::Builder::new()
            .prefix(&format!("rd-{stem}-"))
            .tempfile_in(dir)
            .with_context(|| format!("failed to create script file for {}", self.name))?;
        file.write_all(self.contents().as_bytes())
            .with_context(|| format!("failed to write script {}", self.name))?;
        file.flush()?;
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o700))
            .with_context(|| format!("failed to mark script {} executable", self.name))?;
        // Closing the handle now keeps exec from failing with ETXTBSY.
        self.materialised = Some(file.into_temp_path());
        Ok(())
    }
}

/// Ordered collection of the scripts taking part in one execution.
pub struct ScriptManager {
    dir: PathBuf,
    scripts: Vec<Script>,
    base: Option<usize>,
}

impl ScriptManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            scripts: Vec::new(),
            base: None,
        }
    }

    pub fn in_temp_dir() -> Self {
        Self::new(env::temp_dir())
    }

    pub fn set_base(&mut self, script: Script) {
        self.scripts.push(script);
        self.base = Some(self.scripts.len() - 1);
    }

    pub fn add_aux(&mut self, script: Script) {
        self.scripts.push(script);
    }

    /// Install `script` as the new base; the old base stays reachable as an auxiliary script.
    pub fn wrap_base(&mut self, script: Script) {
        self.set_base(script);
    }

    pub fn base(&self) -> Option<&Script> {
        self.base.and_then(|idx| self.scripts.get(idx))
    }

    /// The first script added: the code block itself, before any wrapping.
    pub fn original(&self) -> Option<&Script> {
        self.scripts.first()
    }

    pub fn original_mut(&mut self) -> Option<&mut Script> {
        self.scripts.first_mut()
    }

    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    pub fn materialise_all(&mut self) -> Result<()> {
        for script in &mut self.scripts {
            find_interpreter(&script.invocation)?;
            script.materialise(&self.dir)?;
            log_debug(&format!(
                "materialised script {} ({})",
                script.name, script.invocation
            ));
        }
        Ok(())
    }

    /// `SCRIPT_<NAME>=<path>` pairs for every materialised script.
    pub fn env_refs(&self) -> Vec<(String, String)> {
        self.scripts
            .iter()
            .filter_map(|script| {
                script
                    .path()
                    .map(|path| (script.env_name(), path.display().to_string()))
            })
            .collect()
    }

    /// Paths of every materialised script, longest first so masking never leaves a partial path.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .scripts
            .iter()
            .filter_map(|script| script.path().map(|path| path.display().to_string()))
            .collect();
        paths.sort_by_key(|path| std::cmp::Reverse(path.len()));
        paths
    }

    /// Delete every materialised file.
    pub fn remove_all(&mut self) {
        for script in &mut self.scripts {
            if let Some(path) = script.materialised.take() {
                if let Err(err) = path.close() {
                    log_debug(&format!("failed to remove script {}: {err}", script.name));
                }
            }
        }
    }
}

impl Drop for ScriptManager {
    fn drop(&mut self) {
        self.remove_all();
    }
}

/// Error raised when the interpreter named by a code block cannot be found.
#[derive(Debug)]
pub struct InterpreterNotFound {
    pub invocation: String,
}

impl std::fmt::Display for InterpreterNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interpreter `{}` not found on PATH", self.invocation)
    }
}

impl std::error::Error for InterpreterNotFound {}

/// Resolve the first word of `invocation` to an executable path.
pub fn find_interpreter(invocation: &str) -> Result<PathBuf> {
    let words = shell_words::split(invocation)
        .with_context(|| format!("invalid interpreter invocation `{invocation}`"))?;
    let program = words
        .first()
        .ok_or_else(|| anyhow!("empty interpreter invocation"))?;
    let not_found = || {
        anyhow::Error::new(InterpreterNotFound {
            invocation: program.clone(),
        })
    };
    if program.contains('/') {
        let path = PathBuf::from(program);
        return if is_executable(&path) {
            Ok(path)
        } else {
            Err(not_found())
        };
    }
    let search = env::var_os("PATH").ok_or_else(not_found)?;
    env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_found)
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
