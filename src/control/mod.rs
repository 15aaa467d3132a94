//! Control messages sent by running scripts back to the engine.
//!
//! Two transports feed the [`EventBus`](crate::bus::EventBus): a named pipe
//! whose path is exported to the child as `RDRPC`, and private OSC sequences
//! (`ESC ] R ; <payload> ST`) embedded in the child's terminal output.

mod channel;
mod message;
mod osc;


pub use channel::{ControlChannel, RPC_ENV_VAR};
pub use message::{decode_title, ControlMessage};
pub use osc::{OscExtractor, OSC_PREFIX, OSC_TERMINATOR};
