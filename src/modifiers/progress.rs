use super::{Collected, CollectedValue, Modifier};
use crate::bus::{EventBus, Subscriber, SubscriptionId};
use crate::control::ControlMessage;
use crate::lock_or_recover;
use crate::scripts::{progress_wrapper, Script, ScriptManager};
use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Timing {
    started: Option<Instant>,
    elapsed: Option<Duration>,
    exit_code: Option<i32>,
}

/// Wraps the base script in a bash wrapper that reports start and end over the control pipe.
pub struct TrackProgress {
    key: String,
    timing: Arc<Mutex<Timing>>,
    subscription: Option<SubscriptionId>,
}

impl TrackProgress {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            timing: Arc::default(),
            subscription: None,
        }
    }
}

impl Modifier for TrackProgress {
    fn name(&self) -> &'static str {
        "track-progress"
    }

    fn prepare(&mut self, scripts: &mut ScriptManager, bus: &EventBus) -> Result<()> {
        let target = scripts
            .base()
            .map(Script::env_name)
            .ok_or_else(|| anyhow!("progress tracking needs a base script"))?;
        scripts.wrap_base(Script::new(
            "progress",
            "bash",
            progress_wrapper(&self.key, &target),
        ));

        let key = self.key.clone();
        let timing = Arc::clone(&self.timing);
        let subscriber: Arc<dyn Subscriber> =
            Arc::new(move |message: &ControlMessage| match message {
                ControlMessage::Start { key: started } if *started == key => {
                    lock_or_recover(&timing, "TrackProgress start").started = Some(Instant::now());
                }
                ControlMessage::End { key: ended, code } if *ended == key => {
                    let mut timing = lock_or_recover(&timing, "TrackProgress end");
                    timing.elapsed = timing.started.map(|started| started.elapsed());
                    timing.exit_code = Some(*code);
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
        let timing = lock_or_recover(&self.timing, "TrackProgress::collect");
        let elapsed = timing
            .elapsed
            .or_else(|| timing.started.map(|started| started.elapsed()))
            .unwrap_or_default();
        vec![Collected {
            label: "duration",
            value: CollectedValue::Duration {
                elapsed,
                exit_code: timing.exit_code,
            },
        }]
    }
}
