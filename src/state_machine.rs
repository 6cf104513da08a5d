//! Per-turn state machine
//!
//! Pure transitions: the session feeds events in and applies the resulting
//! state, so every turn path can be checked without I/O.

pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use event::TurnEvent;
pub use state::TurnState;
pub use transition::{transition, TransitionError};
