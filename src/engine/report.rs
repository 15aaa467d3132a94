use super::error_parser::ParsedError;
use crate::render::style::{Style, FAINT};
use crossterm::style::Color;
use std::io::Write;

const CONTEXT_LINES: usize = 3;
const ERROR_LINE: Style = Style::plain().fg(Color::Red).bold();

/// Everything needed to explain a failed code block to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub exit_code: i32,
    /// Document line where the block's code starts.
    pub document_line: usize,
    /// The block's code as written in the document.
    pub source: String,
    /// Captured output with script paths masked.
    pub output: String,
    pub error: ParsedError,
}

impl FailureReport {
    /// Framed listing around the failing line followed by the interpreter's message.
    pub fn render(&self, width: u16, color: bool) -> String {
        let mut out = Vec::new();
        let rule = "─".repeat(usize::from(width.saturating_sub(2)).min(78));
        let paint = |out: &mut Vec<u8>, style: Style, text: &str| {
            if color {
                let _ = style.apply(out);
            }
            out.extend_from_slice(text.as_bytes());
            if color {
                let _ = Style::plain().apply(out);
            }
        };

        let header = format!(
            "✖ Code block at line {} failed with exit code {}\n",
            self.document_line, self.exit_code
        );
        paint(&mut out, ERROR_LINE, &header);
        paint(&mut out, FAINT, &format!("╭{rule}\n"));
        match &self.error {
            ParsedError::Located(location) => {
                let lines: Vec<&str> = self.source.lines().collect();
                let first = location.line.saturating_sub(CONTEXT_LINES).max(1);
                let last = (location.line + CONTEXT_LINES).min(lines.len());
                let digits = last.to_string().len();
                for number in first..=last {
                    let text = lines.get(number - 1).copied().unwrap_or_default();
                    paint(&mut out, FAINT, "│");
                    if number == location.line {
                        paint(&mut out, ERROR_LINE, &format!("▶{number:>digits$} │ {text}"));
                    } else {
                        paint(&mut out, FAINT, &format!(" {number:>digits$} │ "));
                        out.extend_from_slice(text.as_bytes());
                    }
                    out.push(b'\n');
                }
                paint(&mut out, FAINT, &format!("╰{rule}\n"));
                let _ = writeln!(out, "{}", location.message);
            }
            ParsedError::Opaque(text) => {
                let body = if self.output.is_empty() { text } else { &self.output };
                for line in body.lines() {
                    paint(&mut out, FAINT, "│ ");
                    out.extend_from_slice(line.as_bytes());
                    out.push(b'\n');
                }
                paint(&mut out, FAINT, &format!("╰{rule}\n"));
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}
