//! Command-line parsing and the engine's runtime configuration.

mod defaults;
mod validation;

use clap::{ArgAction, Parser};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use defaults::{DEFAULT_COLS, MAX_COLS, MIN_COLS};

/// CLI options for `rundown`. Validated before anything runs.
#[derive(Debug, Parser, Clone)]
#[command(about = "Execute runnable Markdown documents", author, version)]
pub struct AppConfig {
    /// Markdown document to run
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Run only the section whose heading carries this short code
    #[arg(long, short = 's', value_name = "SHORT_CODE")]
    pub section: Option<String>,

    /// Extra environment for every code block (repeatable)
    #[arg(long = "env", action = ArgAction::Append, value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Disable spinners
    #[arg(long, env = "RUNDOWN_NOSPIN", default_value_t = false)]
    pub nospin: bool,

    /// Terminal width used for rendering and child PTYs
    #[arg(long, env = "RUNDOWN_COLS")]
    pub cols: Option<u16>,

    /// Disable colour and text styling
    #[arg(long = "no-color", default_value_t = false)]
    pub no_color: bool,

    /// Working directory for code blocks (defaults to the document's directory)
    #[arg(long = "cwd", value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Print the segment list as JSON and exit
    #[arg(long = "dump-segments", default_value_t = false)]
    pub dump_segments: bool,

    /// Time every code block through a wrapper script
    #[arg(long = "track-progress", default_value_t = false)]
    pub track_progress: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "RUNDOWN_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "RUNDOWN_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging script bodies and captured output (debug log only)
    #[arg(
        long = "log-content",
        env = "RUNDOWN_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpinnerMode {
    #[default]
    Live,
    Silent,
}

/// Runtime settings for [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub working_dir: PathBuf,
    /// Variables layered over the host environment for every code block.
    pub env: BTreeMap<String, String>,
    pub spinner: SpinnerMode,
    /// Pin the PTY and spinner width; `None` follows the host terminal.
    pub cols: Option<u16>,
    pub color: bool,
    pub track_progress: bool,
    pub failure_reports: bool,
    /// Short code of the only section to run.
    pub section: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env: BTreeMap::new(),
            spinner: SpinnerMode::Live,
            cols: None,
            color: true,
            track_progress: false,
            failure_reports: true,
            section: None,
        }
    }
}

impl EngineConfig {
    /// Width used for spinner lines and failure reports.
    pub fn width(&self) -> u16 {
        self.cols
            .or_else(|| crossterm::terminal::size().ok().map(|(cols, _)| cols))
            .unwrap_or(DEFAULT_COLS)
            .clamp(MIN_COLS, MAX_COLS)
    }
}
