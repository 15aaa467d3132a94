//! Composable policies applied around one code-block execution.
//!
//! Each modifier may rewrite scripts and subscribe to the bus during
//! [`Modifier::prepare`], contribute output sinks, and report values from
//! [`Modifier::collect`] once the child has exited and its output drained.

mod env;
mod output;
mod progress;
mod spinner;


pub use env::EnvCapture;
pub use output::{mask_paths, StdoutCapture, StdoutStream};
pub use progress::TrackProgress;
pub use spinner::{SpinnerConstant, SpinnerFromScript};

use crate::bus::EventBus;
use crate::scripts::ScriptManager;
use anyhow::Result;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectedValue {
    /// Captured child output; `masked` has script paths replaced and CRLF normalised.
    Output { masked: String, raw: String },
    Env(BTreeMap<String, String>),
    Duration { elapsed: Duration, exit_code: Option<i32> },
    Title(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected {
    pub label: &'static str,
    pub value: CollectedValue,
}

pub trait Modifier: Send {
    fn name(&self) -> &'static str;

    fn prepare(&mut self, _scripts: &mut ScriptManager, _bus: &EventBus) -> Result<()> {
        Ok(())
    }

    fn sinks(&mut self) -> Vec<Box<dyn Write + Send>> {
        Vec::new()
    }

    fn collect(&mut self, _scripts: &ScriptManager, _bus: &EventBus) -> Vec<Collected> {
        Vec::new()
    }
}

/// Modifiers in registration order; hooks run in that order too.
#[derive(Default)]
pub struct ModifierSet {
    modifiers: Vec<Box<dyn Modifier>>,
}

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, modifier: impl Modifier + 'static) {
        self.modifiers.push(Box::new(modifier));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modifiers.iter().map(|modifier| modifier.name()).collect()
    }

    pub fn prepare(&mut self, scripts: &mut ScriptManager, bus: &EventBus) -> Result<()> {
        for modifier in &mut self.modifiers {
            modifier.prepare(scripts, bus)?;
        }
        Ok(())
    }

    pub fn sinks(&mut self) -> Vec<Box<dyn Write + Send>> {
        self.modifiers
            .iter_mut()
            .flat_map(|modifier| modifier.sinks())
            .collect()
    }

    pub fn collect(&mut self, scripts: &ScriptManager, bus: &EventBus) -> CollectedResults {
        let values = self
            .modifiers
            .iter_mut()
            .flat_map(|modifier| modifier.collect(scripts, bus))
            .collect();
        CollectedResults { values }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectedResults {
    values: Vec<Collected>,
}

impl CollectedResults {
    pub fn values(&self) -> &[Collected] {
        &self.values
    }

    pub fn output(&self) -> Option<(&str, &str)> {
        self.values.iter().find_map(|item| match &item.value {
            CollectedValue::Output { masked, raw } => Some((masked.as_str(), raw.as_str())),
            _ => None,
        })
    }

    pub fn env(&self) -> Option<&BTreeMap<String, String>> {
        self.values.iter().find_map(|item| match &item.value {
            CollectedValue::Env(env) => Some(env),
            _ => None,
        })
    }

    pub fn duration(&self) -> Option<Duration> {
        self.values.iter().find_map(|item| match &item.value {
            CollectedValue::Duration { elapsed, .. } => Some(*elapsed),
            _ => None,
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.values.iter().find_map(|item| match &item.value {
            CollectedValue::Title(title) => Some(title.as_str()),
            _ => None,
        })
    }
}
