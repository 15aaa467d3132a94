//! Locates the failing line of a script in captured interpreter output.

use crate::scripts::ScriptManager;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    /// Name of the script the interpreter blamed.
    pub script: String,
    /// 1-based line within the script body (prefix and header removed).
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedError {
    Located(ErrorLocation),
    /// No script path (or no line number) in the output.
    Opaque(String),
}

/// Find the first mention of any materialised script in `output` and read
/// `<path>:<n>: <msg>`, `<path>: <n>: <msg>` or `<path>: line <n>: <msg>`
/// from there.
pub fn parse_error(output: &str, scripts: &ScriptManager) -> ParsedError {
    let clean = strip_ansi_escapes::strip_str(output);
    let earliest = scripts
        .scripts()
        .iter()
        .filter_map(|script| {
            let path = script.path()?.display().to_string();
            clean.find(&path).map(|pos| (pos, path, script))
        })
        .min_by_key(|(pos, _, _)| *pos);
    let Some((pos, path, script)) = earliest else {
        return ParsedError::Opaque(output.to_string());
    };
    let pattern = format!(
        r"^{}: *(?:(\d+)|line:? *(\d+)): *(.*)",
        regex::escape(&path)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return ParsedError::Opaque(output.to_string());
    };
    let Some(caps) = re.captures(&clean[pos..]) else {
        return ParsedError::Opaque(output.to_string());
    };
    let reported = caps
        .get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse::<usize>().ok());
    let Some(line) = reported.and_then(|reported| script.body_line(reported)) else {
        return ParsedError::Opaque(output.to_string());
    };
    ParsedError::Located(ErrorLocation {
        script: script.name().to_string(),
        line,
        message: caps
            .get(3)
            .map(|m| m.as_str().trim_end_matches('\r').to_string())
            .unwrap_or_default(),
    })
}
