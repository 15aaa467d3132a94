//! Runs materialised scripts under a pseudo-terminal.
//!
//! One execution owns a fixed set of threads with explicit join points: the
//! child, the PTY reader, the fan-out copier, the resize forwarder and (for
//! interactive blocks) the standard-input claim. Terminal raw mode is a
//! scoped acquisition released on every exit path.

mod io;
mod pty;
mod runner;
mod stdin;
mod winsize;

#[cfg(test)]
mod tests;

pub use pty::exit_code;
pub use runner::{PreparedCommand, PtyRunner, RunOptions, TerminalModeError};
