//! Turn state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the session is within the current turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnState {
    /// Ready for user input
    #[default]
    Idle,

    /// Waiting for the backend reply
    Sending,

    /// Splitting the reply and parsing its payload
    ParsingResponse,

    /// A processor is handling the envelope
    Dispatching,

    /// The turn failed; the error is being surfaced
    Failed { reason: String },
}

impl TurnState {
    pub fn is_idle(&self) -> bool {
        matches!(self, TurnState::Idle)
    }

    /// A turn is in flight
    pub fn is_busy(&self) -> bool {
        !self.is_idle()
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::Sending => write!(f, "sending"),
            TurnState::ParsingResponse => write!(f, "parsing response"),
            TurnState::Dispatching => write!(f, "dispatching"),
            TurnState::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}
