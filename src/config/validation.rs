use super::{AppConfig, EngineConfig, SpinnerMode, MAX_COLS, MIN_COLS};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if !self.file.is_file() {
            bail!("document not found: {}", self.file.display());
        }
        self.file = self
            .file
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", self.file.display()))?;

        for item in &self.env {
            parse_env_item(item)?;
        }

        if let Some(cols) = self.cols {
            if !(MIN_COLS..=MAX_COLS).contains(&cols) {
                bail!("--cols must be between {MIN_COLS} and {MAX_COLS}, got {cols}");
            }
        }

        if let Some(section) = &self.section {
            if section.trim().is_empty() {
                bail!("--section must not be empty");
            }
        }

        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                bail!("--cwd is not a directory: {}", dir.display());
            }
        }
        Ok(())
    }

    pub fn env_pairs(&self) -> Result<BTreeMap<String, String>> {
        self.env
            .iter()
            .map(|item| parse_env_item(item))
            .collect()
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => self
                .file
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let spinner = if self.nospin {
            SpinnerMode::Silent
        } else {
            SpinnerMode::Live
        };
        Ok(EngineConfig {
            working_dir,
            env: self.env_pairs()?,
            spinner,
            cols: self.cols,
            color: !self.no_color && std::io::stdout().is_terminal(),
            track_progress: self.track_progress,
            failure_reports: true,
            section: self.section.clone(),
        })
    }
}

pub(super) fn parse_env_item(item: &str) -> Result<(String, String)> {
    let Some((key, value)) = item.split_once('=') else {
        bail!("--env expects KEY=VALUE, got `{item}`");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("--env key must not be empty (`{item}`)");
    }
    if !key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        || key.starts_with(|ch: char| ch.is_ascii_digit())
    {
        bail!("--env key `{key}` is not a valid variable name");
    }
    Ok((key.to_string(), value.to_string()))
}
