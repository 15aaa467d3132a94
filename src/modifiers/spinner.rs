use super::{Collected, CollectedValue, Modifier};
use crate::bus::{EventBus, Subscriber, SubscriptionId};
use crate::control::{decode_title, ControlMessage};
use crate::lock_or_recover;
use crate::scripts::{comment_to_control, ScriptManager};
use crate::spinner::SharedSpinner;
use anyhow::Result;
use std::sync::Arc;

/// Lets the script pause and resume the spinner with `STOPSPINNER` / `STARTSPINNER`.
pub struct SpinnerConstant {
    spinner: SharedSpinner,
    subscription: Option<SubscriptionId>,
}

impl SpinnerConstant {
    pub fn new(spinner: SharedSpinner) -> Self {
        Self {
            spinner,
            subscription: None,
        }
    }
}

impl Modifier for SpinnerConstant {
    fn name(&self) -> &'static str {
        "spinner-constant"
    }

    fn prepare(&mut self, _scripts: &mut ScriptManager, bus: &EventBus) -> Result<()> {
        let spinner = Arc::clone(&self.spinner);
        let subscriber: Arc<dyn Subscriber> =
            Arc::new(move |message: &ControlMessage| match message {
                ControlMessage::StartSpinner => {
                    lock_or_recover(&spinner, "SpinnerConstant start").resume()
                }
                ControlMessage::StopSpinner => {
                    lock_or_recover(&spinner, "SpinnerConstant stop").pause()
                }
                _ => {}
            });
        self.subscription = Some(bus.subscribe(subscriber));
        Ok(())
    }

    fn collect(&mut self, _scripts: &ScriptManager, bus: &EventBus) -> Vec<Collected> {
        if let Some(id) = self.subscription.take() {
            bus.unsubscribe(id);
        }
        Vec::new()
    }
}

/// Retitles the spinner from `#>` comments (or every comment with `all_comments`),
/// `SETSPINNER` payloads and `Name:` messages.
pub struct SpinnerFromScript {
    spinner: SharedSpinner,
    all_comments: bool,
    subscription: Option<SubscriptionId>,
}

impl SpinnerFromScript {
    pub fn new(spinner: SharedSpinner, all_comments: bool) -> Self {
        Self {
            spinner,
            all_comments,
            subscription: None,
        }
    }
}

impl Modifier for SpinnerFromScript {
    fn name(&self) -> &'static str {
        "spinner-from-script"
    }

    fn prepare(&mut self, scripts: &mut ScriptManager, bus: &EventBus) -> Result<()> {
        if let Some(script) = scripts.original_mut() {
            if script.is_shell_like() {
                let rewritten = comment_to_control(script.source(), self.all_comments);
                script.set_source(rewritten);
            }
        }
        let spinner = Arc::clone(&self.spinner);
        let subscriber: Arc<dyn Subscriber> = Arc::new(move |message: &ControlMessage| {
            let title = match message {
                ControlMessage::SetSpinner(payload) => decode_title(payload),
                ControlMessage::Name(title) => title.clone(),
                _ => return,
            };
            lock_or_recover(&spinner, "SpinnerFromScript").push_step(&title);
        });
        self.subscription = Some(bus.subscribe(subscriber));
        Ok(())
    }

    fn collect(&mut self, _scripts: &ScriptManager, bus: &EventBus) -> Vec<Collected> {
        if let Some(id) = self.subscription.take() {
            bus.unsubscribe(id);
        }
        let title = lock_or_recover(&self.spinner, "SpinnerFromScript::collect").title();
        vec![Collected {
            label: "spinner-title",
            value: CollectedValue::Title(title),
        }]
    }
}
