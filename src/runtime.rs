//! Request worker
//!
//! Runs a session's turns on a tokio task so callers never block on the
//! backend. Results come back on a oneshot per turn; everything to render
//! goes out on a broadcast channel of [`SessionEvent`]s.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::{spawn_session, SessionHandle, SubmitError, TurnHandle};

use crate::processors::OutputBlock;
use crate::state_machine::TurnState;
use serde::Serialize;

/// Sender name for echoed user input
pub const USER_SENDER: &str = "User";

/// Broadcast channel capacity per session
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events sent to the chat surface
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A chat line: user input or agent commentary
    Message {
        sender: String,
        text: String,
    },
    /// Processor output
    Output {
        sender: String,
        block: OutputBlock,
    },
    Error {
        message: String,
    },
    StateChange {
        state: TurnState,
    },
    ContextChanged {
        context_id: Option<String>,
    },
    /// The turn is over; input can be accepted again
    TurnDone,
}
