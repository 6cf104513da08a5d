//! Pure state transition function

use super::{TurnEvent, TurnState};
use thiserror::Error;

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Session is busy, wait for the current turn to finish")]
    SessionBusy,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function.
///
/// Given the same inputs it always produces the same output. A rejected
/// event leaves the caller's state untouched.
pub fn transition(state: &TurnState, event: TurnEvent) -> Result<TurnState, TransitionError> {
    match (state, event) {
        (TurnState::Idle, TurnEvent::Submit) => Ok(TurnState::Sending),
        (_, TurnEvent::Submit) => Err(TransitionError::SessionBusy),

        (TurnState::Sending, TurnEvent::BackendReplied) => Ok(TurnState::ParsingResponse),
        (TurnState::Sending, TurnEvent::BackendFailed { reason }) => {
            Ok(TurnState::Failed { reason })
        }

        (TurnState::ParsingResponse, TurnEvent::PayloadParsed) => Ok(TurnState::Dispatching),
        (TurnState::ParsingResponse, TurnEvent::PayloadRejected { reason }) => {
            Ok(TurnState::Failed { reason })
        }

        (TurnState::Dispatching, TurnEvent::DispatchFinished) => Ok(TurnState::Idle),
        (TurnState::Dispatching, TurnEvent::DispatchFailed { reason }) => {
            Ok(TurnState::Failed { reason })
        }

        (TurnState::Failed { .. }, TurnEvent::ErrorSurfaced) => Ok(TurnState::Idle),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {state}"
        ))),
    }
}
