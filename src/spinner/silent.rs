use super::{Spinner, SpinnerState};

/// Draws nothing; remembers what it was told so callers can inspect it.
#[derive(Debug, Default, Clone)]
pub struct SilentSpinner {
    title: String,
    steps: Vec<String>,
    state: Option<SpinnerState>,
    paused: bool,
}

impl SilentSpinner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn state(&self) -> Option<SpinnerState> {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Spinner for SilentSpinner {
    fn start(&mut self, title: &str) {
        self.title = title.to_string();
        self.state = Some(SpinnerState::Running);
    }

    fn push_step(&mut self, title: &str) {
        self.steps.push(title.to_string());
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn finish(&mut self, state: SpinnerState) {
        self.state = Some(state);
    }

    fn title(&self) -> String {
        self.steps.last().unwrap_or(&self.title).clone()
    }
}
