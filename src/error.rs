//! Turn-level failures
//!
//! Everything that can go wrong in a turn ends up here and is shown to the
//! user; none of it stops the session.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// Transport, backend status or backend response shape, already rendered
    /// as an `Error:` reply by the client
    #[error("{0}")]
    Backend(String),

    /// No payload, invalid JSON, not an object, or no discriminator
    #[error("The response did not contain a valid payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown response type: {kind}. Full response: {raw}")]
    UnknownKind { kind: String, raw: String },

    #[error("Error processing the '{kind}' response: {message}")]
    ProcessorFailure { kind: String, message: String },

    #[error("A request is already in progress")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,
}

impl TurnError {
    /// Short machine-readable category, for logs
    pub fn category(&self) -> &'static str {
        match self {
            TurnError::Backend(_) => "backend",
            TurnError::MalformedPayload(_) => "malformed_payload",
            TurnError::UnknownKind { .. } => "unknown_kind",
            TurnError::ProcessorFailure { .. } => "processor_failure",
            TurnError::Busy => "busy",
            TurnError::EmptyMessage => "empty_message",
        }
    }
}
