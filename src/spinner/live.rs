use super::{truncate_to_width, Spinner, SpinnerState, SPINNER_BRAILLE};
use crate::lock_or_recover;
use crate::writer::SharedWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(80);
const CLEAR_LINE: &str = "\r\x1b[2K";

#[derive(Default)]
struct LiveState {
    title: String,
    step: Option<String>,
    frame: usize,
    paused: bool,
}

/// Animated spinner drawn on a single terminal line.
///
/// When `animate` is off (child output is streamed to the same terminal)
/// the spinner prints its title once and its final state at the end.
pub struct LiveSpinner {
    out: SharedWriter,
    indent: String,
    width: usize,
    animate: bool,
    state: Arc<Mutex<LiveState>>,
    stop: Arc<AtomicBool>,
    ticker: Option<thread::JoinHandle<()>>,
}

impl LiveSpinner {
    pub fn new(out: SharedWriter, level: u8, width: u16) -> Self {
        let depth = usize::from(level.max(1) - 1);
        Self {
            out,
            indent: "  ".repeat(depth),
            width: usize::from(width.max(10)),
            animate: true,
            state: Arc::new(Mutex::new(LiveState::default())),
            stop: Arc::new(AtomicBool::new(false)),
            ticker: None,
        }
    }

    pub fn static_output(mut self) -> Self {
        self.animate = false;
        self
    }

    fn line(&self, glyph: &str, text: &str) -> String {
        let body = format!("{}{glyph} {text}", self.indent);
        truncate_to_width(&body, self.width.saturating_sub(1))
    }

    fn emit(&self, text: &str) {
        let _ = self.out.emit(text.as_bytes());
    }

    fn spawn_ticker(&mut self) {
        self.stop.store(false, Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        let stop = Arc::clone(&self.stop);
        let out = self.out.clone();
        let indent = self.indent.clone();
        let width = self.width;
        self.ticker = Some(thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                {
                    let mut state = lock_or_recover(&state, "LiveSpinner ticker");
                    if !state.paused {
                        let frame = SPINNER_BRAILLE[state.frame % SPINNER_BRAILLE.len()];
                        state.frame = state.frame.wrapping_add(1);
                        let text = match &state.step {
                            Some(step) => format!("{} › {step}", state.title),
                            None => state.title.clone(),
                        };
                        let body = truncate_to_width(
                            &format!("{indent}{frame} {text}"),
                            width.saturating_sub(1),
                        );
                        let _ = out.emit(format!("{CLEAR_LINE}{body}").as_bytes());
                    }
                }
                thread::sleep(TICK);
            }
        }));
    }

    fn stop_ticker(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.ticker.take() {
            let _ = handle.join();
        }
    }
}

impl Spinner for LiveSpinner {
    fn start(&mut self, title: &str) {
        lock_or_recover(&self.state, "LiveSpinner::start").title = title.to_string();
        if self.animate {
            self.spawn_ticker();
        } else {
            let line = self.line(SpinnerState::Running.glyph(), title);
            self.emit(&format!("{line}\n"));
        }
    }

    fn push_step(&mut self, title: &str) {
        let previous = {
            let mut state = lock_or_recover(&self.state, "LiveSpinner::push_step");
            state.step.replace(title.to_string())
        };
        if self.animate {
            if let Some(previous) = previous {
                let line = self.line(&format!("  {}", SpinnerState::Success.glyph()), &previous);
                self.emit(&format!("{CLEAR_LINE}{line}\n"));
            }
        } else {
            let line = self.line("  ›", title);
            self.emit(&format!("{line}\n"));
        }
    }

    fn pause(&mut self) {
        let mut state = lock_or_recover(&self.state, "LiveSpinner::pause");
        if !state.paused && self.animate {
            let _ = self.out.emit(CLEAR_LINE.as_bytes());
        }
        state.paused = true;
    }

    fn resume(&mut self) {
        lock_or_recover(&self.state, "LiveSpinner::resume").paused = false;
    }

    fn finish(&mut self, state: SpinnerState) {
        self.stop_ticker();
        let (title, step) = {
            let live = lock_or_recover(&self.state, "LiveSpinner::finish");
            (live.title.clone(), live.step.clone())
        };
        let mut text = String::new();
        if self.animate {
            text.push_str(CLEAR_LINE);
            if let Some(step) = step {
                text.push_str(&self.line(&format!("  {}", state.glyph()), &step));
                text.push('\n');
            }
        }
        text.push_str(&self.line(state.glyph(), &title));
        text.push('\n');
        self.emit(&text);
    }

    fn title(&self) -> String {
        let state = lock_or_recover(&self.state, "LiveSpinner::title");
        state.step.clone().unwrap_or_else(|| state.title.clone())
    }
}

impl Drop for LiveSpinner {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}
