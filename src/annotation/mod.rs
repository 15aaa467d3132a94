//! Author annotations attached to code blocks and headings.
//!
//! An [`AnnotationSet`] is a set of boolean flags plus a map of named string
//! parameters. Names the engine does not recognise are kept so they can be
//! reported as diagnostics, but they never abort parsing.

mod lexer;
#[cfg(test)]
mod tests;

pub use lexer::{tokenize, Token};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Flags understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    NoSpin,
    Interactive,
    SkipOnSuccess,
    SkipOnFailure,
    Stdout,
    Stderr,
    Reveal,
    NoRun,
    Named,
    NamedAll,
    Env,
    StopOk,
    StopFail,
    IgnoreFailure,
    Abort,
    SubEnv,
    Setup,
    Borg,
    Desc,
}

impl Flag {
    pub const ALL: [Flag; 19] = [
        Flag::NoSpin,
        Flag::Interactive,
        Flag::SkipOnSuccess,
        Flag::SkipOnFailure,
        Flag::Stdout,
        Flag::Stderr,
        Flag::Reveal,
        Flag::NoRun,
        Flag::Named,
        Flag::NamedAll,
        Flag::Env,
        Flag::StopOk,
        Flag::StopFail,
        Flag::IgnoreFailure,
        Flag::Abort,
        Flag::SubEnv,
        Flag::Setup,
        Flag::Borg,
        Flag::Desc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Flag::NoSpin => "nospin",
            Flag::Interactive => "interactive",
            Flag::SkipOnSuccess => "skip-on-success",
            Flag::SkipOnFailure => "skip-on-failure",
            Flag::Stdout => "stdout",
            Flag::Stderr => "stderr",
            Flag::Reveal => "reveal",
            Flag::NoRun => "norun",
            Flag::Named => "named",
            Flag::NamedAll => "named-all",
            Flag::Env => "env",
            Flag::StopOk => "stop-ok",
            Flag::StopFail => "stop-fail",
            Flag::IgnoreFailure => "ignore-failure",
            Flag::Abort => "abort",
            Flag::SubEnv => "sub-env",
            Flag::Setup => "setup",
            Flag::Borg => "borg",
            Flag::Desc => "desc",
        }
    }

    pub fn from_name(name: &str) -> Option<Flag> {
        Flag::ALL.into_iter().find(|flag| flag.name() == name)
    }
}

/// Parameters understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Save,
    With,
    Label,
    Desc,
    Spinner,
}

impl Param {
    pub const ALL: [Param; 5] = [
        Param::Save,
        Param::With,
        Param::Label,
        Param::Desc,
        Param::Spinner,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Param::Save => "save",
            Param::With => "with",
            Param::Label => "label",
            Param::Desc => "desc",
            Param::Spinner => "spinner",
        }
    }

    pub fn from_name(name: &str) -> Option<Param> {
        Param::ALL.into_iter().find(|param| param.name() == name)
    }
}

/// `skip_on_success` and `skip-on-success` name the same flag.
pub fn normalize_name(name: &str) -> String {
    name.trim().replace('_', "-")
}

/// Flags and parameters carried by an annotation block or inline.
///
/// A name is never both a flag and a parameter within one set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationSet {
    flags: BTreeSet<String>,
    params: BTreeMap<String, String>,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an annotation string such as `nospin label="intro" with:zsh`.
    pub fn parse(input: &str) -> Self {
        let mut set = Self::new();
        for token in tokenize(input) {
            match token {
                Token::Flag(name) => set.insert_flag_name(&name),
                Token::Param { name, value } => set.insert_param_name(&name, value),
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.params.is_empty()
    }

    pub fn has(&self, flag: Flag) -> bool {
        self.flags.contains(flag.name())
    }

    pub fn param(&self, param: Param) -> Option<&str> {
        self.params.get(param.name()).map(String::as_str)
    }

    pub fn insert_flag(&mut self, flag: Flag) {
        self.insert_flag_name(flag.name());
    }

    pub fn insert_param(&mut self, param: Param, value: impl Into<String>) {
        self.insert_param_name(param.name(), value.into());
    }

    fn insert_flag_name(&mut self, name: &str) {
        let name = normalize_name(name);
        if name.is_empty() {
            return;
        }
        self.params.remove(&name);
        self.flags.insert(name);
    }

    fn insert_param_name(&mut self, name: &str, value: String) {
        let name = normalize_name(name);
        if name.is_empty() {
            return;
        }
        self.flags.remove(&name);
        self.params.insert(name, value);
    }

    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(String::as_str)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Combine two sets; `other` wins wherever the two disagree.
    pub fn merge(&self, other: &AnnotationSet) -> AnnotationSet {
        let mut merged = self.clone();
        merged.merge_from(other);
        merged
    }

    pub fn merge_from(&mut self, other: &AnnotationSet) {
        for flag in &other.flags {
            self.insert_flag_name(flag);
        }
        for (name, value) in &other.params {
            self.insert_param_name(name, value.clone());
        }
    }

    /// Report every flag or parameter name the engine does not know.
    pub fn diagnostics(&self) -> Vec<AnnotationDiagnostic> {
        let mut out = Vec::new();
        for flag in &self.flags {
            if Flag::from_name(flag).is_none() {
                out.push(AnnotationDiagnostic::UnknownFlag(flag.clone()));
            }
        }
        for name in self.params.keys() {
            if Param::from_name(name).is_none() {
                out.push(AnnotationDiagnostic::UnknownParam(name.clone()));
            }
        }
        out
    }
}

/// Non-fatal problems found while reading annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AnnotationDiagnostic {
    UnknownFlag(String),
    UnknownParam(String),
}

impl fmt::Display for AnnotationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationDiagnostic::UnknownFlag(name) => write!(f, "unknown annotation flag `{name}`"),
            AnnotationDiagnostic::UnknownParam(name) => {
                write!(f, "unknown annotation parameter `{name}`")
            }
        }
    }
}

/// Shared capability of the block and inline annotation nodes.
pub trait Annotated {
    fn annotations(&self) -> &AnnotationSet;
}

impl Annotated for AnnotationSet {
    fn annotations(&self) -> &AnnotationSet {
        self
    }
}
