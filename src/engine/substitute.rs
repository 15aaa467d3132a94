use regex::{Captures, Regex};
use std::sync::OnceLock;

static VARIABLE: OnceLock<Option<Regex>> = OnceLock::new();

fn variable() -> Option<&'static Regex> {
    VARIABLE
        .get_or_init(|| {
            Regex::new(r"\$(?:\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)\}|(?P<bare>[A-Za-z_][A-Za-z0-9_]*))")
                .ok()
        })
        .as_ref()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    pub text: String,
    /// Names that had no value; their references are left untouched.
    pub unresolved: Vec<String>,
}

/// Replace `$VAR` and `${VAR}` references using `lookup`.
pub fn substitute(text: &str, lookup: impl Fn(&str) -> Option<String>) -> Substituted {
    let mut unresolved = Vec::new();
    let Some(variable) = variable() else {
        return Substituted {
            text: text.to_string(),
            unresolved,
        };
    };
    let replaced = variable.replace_all(text, |caps: &Captures<'_>| {
        let name = caps
            .name("braced")
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match lookup(name) {
            Some(value) => value,
            None => {
                if !unresolved.iter().any(|seen| seen == name) {
                    unresolved.push(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });
    Substituted {
        text: replaced.into_owned(),
        unresolved,
    }
}
