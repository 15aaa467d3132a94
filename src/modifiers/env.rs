use super::{Collected, CollectedValue, Modifier};
use crate::bus::{EventBus, Subscriber, SubscriptionId};
use crate::control::ControlMessage;
use crate::lock_or_recover;
use crate::scripts::{env_capture_prefix, ScriptManager};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
enum Mode {
    #[default]
    Idle,
    Dump(BTreeMap<String, String>),
    Diff,
}

#[derive(Default)]
struct EnvState {
    mode: Mode,
    dumps: Vec<BTreeMap<String, String>>,
    explicit: BTreeMap<String, String>,
}

impl EnvState {
    fn handle(&mut self, message: &ControlMessage) {
        match message {
            ControlMessage::EnvDump => {
                self.close_dump();
                self.mode = Mode::Dump(BTreeMap::new());
            }
            ControlMessage::EnvDiff => {
                self.close_dump();
                self.mode = Mode::Diff;
            }
            ControlMessage::Done if matches!(self.mode, Mode::Diff) => self.mode = Mode::Idle,
            ControlMessage::Env { key, value } => {
                self.explicit.insert(key.clone(), value.clone());
            }
            ControlMessage::Line(line) if line.is_empty() => self.close_dump(),
            ControlMessage::Line(_) => {
                // Continuation lines of multi-line values carry no `=` and are dropped.
                let Some((key, value)) = message.as_assignment() else {
                    return;
                };
                match &mut self.mode {
                    Mode::Dump(current) => {
                        current.insert(key.to_string(), value.to_string());
                    }
                    Mode::Diff => {
                        self.explicit.insert(key.to_string(), value.to_string());
                    }
                    Mode::Idle => {}
                }
            }
            _ => {}
        }
    }

    fn close_dump(&mut self) {
        if !matches!(self.mode, Mode::Dump(_)) {
            return;
        }
        if let Mode::Dump(dump) = std::mem::take(&mut self.mode) {
            self.dumps.push(dump);
        }
    }

    /// Keys whose value changed between the first and last dump, plus explicit assignments.
    fn result(&mut self) -> BTreeMap<String, String> {
        self.close_dump();
        let mut changed = BTreeMap::new();
        if let (Some(before), Some(after)) = (self.dumps.first(), self.dumps.last()) {
            if self.dumps.len() >= 2 {
                for (key, value) in after {
                    if before.get(key) != Some(value) {
                        changed.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        changed.extend(self.explicit.clone());
        changed
    }
}

/// Captures environment changes made by a shell-like script.
#[derive(Default)]
pub struct EnvCapture {
    state: Arc<Mutex<EnvState>>,
    subscription: Option<SubscriptionId>,
}

impl EnvCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Modifier for EnvCapture {
    fn name(&self) -> &'static str {
        "env-capture"
    }

    fn prepare(&mut self, scripts: &mut ScriptManager, bus: &EventBus) -> Result<()> {
        let state = Arc::clone(&self.state);
        let subscriber: Arc<dyn Subscriber> = Arc::new(move |message: &ControlMessage| {
            lock_or_recover(&state, "EnvCapture").handle(message);
        });
        self.subscription = Some(bus.subscribe(subscriber));
        if let Some(script) = scripts.original_mut() {
            if script.is_shell_like() {
                script.prepend(&env_capture_prefix());
            }
        }
        Ok(())
    }

    fn collect(&mut self, _scripts: &ScriptManager, bus: &EventBus) -> Vec<Collected> {
        if let Some(id) = self.subscription.take() {
            bus.unsubscribe(id);
        }
        let env = lock_or_recover(&self.state, "EnvCapture::collect").result();
        vec![Collected {
            label: "env",
            value: CollectedValue::Env(env),
        }]
    }
}
