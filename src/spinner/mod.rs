//! Progress indicators shown while a code block runs.

mod live;
mod silent;


pub use live::LiveSpinner;
pub use silent::SilentSpinner;

use serde::Serialize;
use std::sync::{Arc, Mutex};
use unicode_width::UnicodeWidthChar;

pub const SPINNER_BRAILLE: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpinnerState {
    Running,
    Success,
    Error,
    Skipped,
}

impl SpinnerState {
    pub fn glyph(self) -> &'static str {
        match self {
            SpinnerState::Running => "•",
            SpinnerState::Success => "✔",
            SpinnerState::Error => "✖",
            SpinnerState::Skipped => "↷",
        }
    }
}

pub trait Spinner: Send {
    fn start(&mut self, title: &str);
    /// Begin a new sub-step; the previous step (if any) is marked complete.
    fn push_step(&mut self, title: &str);
    /// Stop animating until [`Spinner::resume`].
    fn pause(&mut self);
    fn resume(&mut self);
    fn finish(&mut self, state: SpinnerState);
    /// The most recently displayed title (sub-step titles take precedence).
    fn title(&self) -> String;
}

pub type SharedSpinner = Arc<Mutex<Box<dyn Spinner>>>;

pub fn shared(spinner: impl Spinner + 'static) -> SharedSpinner {
    Arc::new(Mutex::new(Box::new(spinner)))
}

/// Truncate `text` to at most `max_width` terminal columns, adding an ellipsis when cut.
pub fn truncate_to_width(text: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if width + ch_width > max_width {
            if max_width > 0 {
                while width + 1 > max_width {
                    match out.pop() {
                        Some(last) => width -= last.width().unwrap_or(0),
                        None => break,
                    }
                }
                out.push('…');
            }
            return out;
        }
        width += ch_width;
        out.push(ch);
    }
    out
}
