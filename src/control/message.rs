use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// One line of the control protocol, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// `SETSPINNER <payload>`; the payload is usually base64 encoded.
    SetSpinner(String),
    StartSpinner,
    StopSpinner,
    /// Opens an environment dump; `KEY=VALUE` lines follow until an empty line.
    EnvDump,
    /// `envdiff:` opens a block of explicit `KEY=VALUE` lines.
    EnvDiff,
    /// `:done` closes an `envdiff:` block.
    Done,
    /// `env: KEY=VALUE`
    Env { key: String, value: String },
    /// `Name: <title>`
    Name(String),
    /// `<key> START` from the progress tracker wrapper.
    Start { key: String },
    /// `<key> END <exit code>` from the progress tracker wrapper.
    End { key: String, code: i32 },
    /// Anything else, with the line terminator removed.
    Line(String),
}

impl ControlMessage {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\n', '\r']);
        match line {
            "STARTSPINNER" => return Self::StartSpinner,
            "STOPSPINNER" => return Self::StopSpinner,
            "ENVDUMP" => return Self::EnvDump,
            "envdiff:" => return Self::EnvDiff,
            ":done" => return Self::Done,
            _ => {}
        }
        if let Some(payload) = line.strip_prefix("SETSPINNER ") {
            return Self::SetSpinner(payload.trim().to_string());
        }
        if let Some(pair) = line.strip_prefix("env: ") {
            if let Some((key, value)) = pair.split_once('=') {
                return Self::Env {
                    key: key.trim().to_string(),
                    value: value.to_string(),
                };
            }
        }
        if let Some(title) = line.strip_prefix("Name: ") {
            return Self::Name(title.trim().to_string());
        }
        if let Some(message) = parse_progress(line) {
            return message;
        }
        Self::Line(line.to_string())
    }

    /// `KEY=VALUE` split for dump and diff lines.
    pub fn as_assignment(&self) -> Option<(&str, &str)> {
        match self {
            Self::Line(line) => line.split_once('=').filter(|(key, _)| !key.is_empty()),
            _ => None,
        }
    }
}

fn parse_progress(line: &str) -> Option<ControlMessage> {
    let mut parts = line.split_whitespace();
    let key = parts.next()?;
    // Environment dump lines are `KEY=VALUE`; never mistake them for progress events.
    if key.contains('=') {
        return None;
    }
    match (parts.next()?, parts.next(), parts.next()) {
        ("START", None, None) => Some(ControlMessage::Start {
            key: key.to_string(),
        }),
        ("END", Some(code), None) => Some(ControlMessage::End {
            key: key.to_string(),
            code: code.parse().ok()?,
        }),
        _ => None,
    }
}

/// Decode a `SETSPINNER` payload: base64 text when it decodes to UTF-8, otherwise the raw payload.
pub fn decode_title(payload: &str) -> String {
    STANDARD
        .decode(payload.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| payload.to_string())
}
