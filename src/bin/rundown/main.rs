//! `rundown` entrypoint: parse flags, set up logging, run one document.

use anyhow::{Context, Result};
use rundown::config::AppConfig;
use rundown::terminal_restore::install_terminal_panic_hook;
use rundown::{init_logging, init_tracing, log_debug, log_file_path, segments, Engine};
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(code) => exit_code(code),
        Err(err) => {
            log_debug(&format!("fatal: {err:#}"));
            eprintln!("rundown: {err:#}");
            exit_code(rundown::engine::EXIT_HOST_ERROR)
        }
    }
}

fn run() -> Result<i32> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);
    install_terminal_panic_hook();
    log_debug("=== rundown started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let source = fs::read_to_string(&config.file)
        .with_context(|| format!("failed to read {}", config.file.display()))?;

    if config.dump_segments {
        let list = segments::build(&source);
        let json = serde_json::to_string_pretty(&list).context("failed to encode segments")?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{json}").context("failed to write segments")?;
        return Ok(0);
    }

    let mut engine = Engine::new(config.engine_config()?);
    let outcome = engine.run_document(&source);
    log_debug(&format!("run finished: {outcome:?}"));
    Ok(outcome.exit_code())
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code.clamp(0, 255)).unwrap_or(u8::MAX))
}
