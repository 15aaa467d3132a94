//! Source rewrites applied by modifiers before materialisation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use std::sync::OnceLock;

use crate::control::RPC_ENV_VAR;

static CONTROL_COMMENT: OnceLock<Option<Regex>> = OnceLock::new();
static PLAIN_COMMENT: OnceLock<Option<Regex>> = OnceLock::new();

fn control_comment() -> Option<&'static Regex> {
    CONTROL_COMMENT
        .get_or_init(|| Regex::new(r"^(?P<indent>\s*)#>\s+(?P<title>.*)$").ok())
        .as_ref()
}

fn plain_comment() -> Option<&'static Regex> {
    PLAIN_COMMENT
        .get_or_init(|| Regex::new(r"^(?P<indent>\s*)#\s+(?P<title>.*)$").ok())
        .as_ref()
}

/// Shell statement printing an OSC-framed `SETSPINNER` carrying `title`.
pub fn spinner_control(title: &str) -> String {
    let encoded = STANDARD.encode(title.trim());
    // ESC and ST spelled as printf octal escapes.
    format!("printf '\\033]R;SETSPINNER %s\\234' '{encoded}'")
}

/// Replace `#> title` lines (and plain `# title` lines when `all_comments`)
/// with statements that retitle the spinner. Line count is preserved.
pub fn comment_to_control(source: &str, all_comments: bool) -> String {
    let mut rewritten = String::with_capacity(source.len());
    for line in source.split_inclusive('\n') {
        let (body, ending) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        let captures = control_comment()
            .and_then(|re| re.captures(body))
            .or_else(|| {
                if all_comments {
                    plain_comment().and_then(|re| re.captures(body))
                } else {
                    None
                }
            });
        match captures {
            Some(caps) if !caps["title"].trim().is_empty() => {
                rewritten.push_str(&caps["indent"]);
                rewritten.push_str(&spinner_control(&caps["title"]));
            }
            _ => rewritten.push_str(body),
        }
        rewritten.push_str(ending);
    }
    rewritten
}

/// Prefix dumping the environment to the control pipe now and again on exit.
///
/// The exit trap preserves the script's status.
pub fn env_capture_prefix() -> String {
    format!(
        "__rd_envdump() {{ {{ echo ENVDUMP; env; echo; }} > \"${RPC_ENV_VAR}\"; }}\n\
         __rd_envdump\n\
         trap '__rd_status=$?; __rd_envdump; exit $__rd_status' EXIT\n"
    )
}

/// Bash wrapper reporting start and end of `target` (a `SCRIPT_<NAME>` variable).
pub fn progress_wrapper(key: &str, target_env: &str) -> String {
    format!(
        "echo \"{key} START\" > \"${RPC_ENV_VAR}\"\n\
         \"${target_env}\" \"$@\"\n\
         __rd_status=$?\n\
         echo \"{key} END $__rd_status\" > \"${RPC_ENV_VAR}\"\n\
         exit $__rd_status\n"
    )
}
