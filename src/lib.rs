//! Runnable Markdown: render a document to the terminal and execute its
//! code blocks under a pseudo-terminal, steered by inline annotations.

pub mod annotation;
pub mod app;
pub mod bus;
pub mod config;
pub mod control;
pub mod engine;
mod lock;
pub mod markdown;
pub mod modifiers;
pub mod pty_session;
pub mod render;
pub mod scripts;
pub mod segments;
pub mod spinner;
mod telemetry;
pub mod terminal_restore;
pub mod writer;

pub(crate) use lock::lock_or_recover;
pub use app::logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub use engine::{Engine, ExecutionRecord, RunOutcome};
pub use telemetry::init_tracing;
