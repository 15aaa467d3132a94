use super::ControlMessage;
use crate::bus::EventBus;
use crate::log_debug;

/// `ESC ] R ;` opens a control sequence inside child output.
pub const OSC_PREFIX: &[u8] = b"\x1b]R;";
/// The C1 string terminator closing a control sequence.
pub const OSC_TERMINATOR: u8 = 0x9c;

const MAX_PAYLOAD: usize = 64 * 1024;

/// Streaming filter that removes control sequences from PTY output and
/// publishes their payloads on the bus.
///
/// Sequences may straddle chunk boundaries; incomplete tails are held back
/// until the next chunk (or [`OscExtractor::finish`]) resolves them.
pub struct OscExtractor {
    bus: EventBus,
    carry: Vec<u8>,
}

impl OscExtractor {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            carry: Vec::new(),
        }
    }

    /// Feed one chunk; returns the bytes that should reach the output sinks.
    pub fn filter(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);
        let mut output = Vec::with_capacity(bytes.len());
        let mut cursor = 0;
        while cursor < bytes.len() {
            let Some(start) = find_prefix_start(&bytes, cursor) else {
                output.extend_from_slice(&bytes[cursor..]);
                break;
            };
            output.extend_from_slice(&bytes[cursor..start]);
            let rest = &bytes[start..];
            if rest.len() < OSC_PREFIX.len() {
                // Partial prefix at the end of the chunk.
                self.carry = rest.to_vec();
                break;
            }
            let payload_start = start + OSC_PREFIX.len();
            match find_terminator(&bytes, payload_start) {
                Some((payload_end, next)) => {
                    self.dispatch(&bytes[payload_start..payload_end]);
                    cursor = next;
                }
                None if bytes.len() - payload_start > MAX_PAYLOAD => {
                    log_debug("control sequence exceeded payload limit; passing through");
                    output.extend_from_slice(&bytes[start..]);
                    break;
                }
                None => {
                    self.carry = bytes[start..].to_vec();
                    break;
                }
            }
        }
        output
    }

    /// Flush anything still held back; an unterminated sequence is passed through as-is.
    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.carry)
    }

    fn dispatch(&self, payload: &[u8]) {
        let text = String::from_utf8_lossy(payload);
        for line in text.lines() {
            self.bus.publish(&ControlMessage::parse(line));
        }
    }
}

/// Position of the next full prefix, or of a prefix fragment that runs to the end of `bytes`.
fn find_prefix_start(bytes: &[u8], from: usize) -> Option<usize> {
    let mut idx = from;
    while idx < bytes.len() {
        if bytes[idx] == 0x1b {
            let available = &bytes[idx..];
            let len = available.len().min(OSC_PREFIX.len());
            if available[..len] == OSC_PREFIX[..len] {
                return Some(idx);
            }
        }
        idx += 1;
    }
    None
}

/// Returns `(payload_end, resume_at)`. Accepts ST (0x9c), BEL, and `ESC \`.
fn find_terminator(bytes: &[u8], mut cursor: usize) -> Option<(usize, usize)> {
    while cursor < bytes.len() {
        match bytes[cursor] {
            OSC_TERMINATOR | 0x07 => return Some((cursor, cursor + 1)),
            0x1b if bytes.get(cursor + 1) == Some(&b'\\') => return Some((cursor, cursor + 2)),
            _ => cursor += 1,
        }
    }
    None
}
