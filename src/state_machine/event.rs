//! Events that drive a turn

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    // User events
    Submit,

    // Backend events
    BackendReplied,
    BackendFailed { reason: String },

    // Payload events
    PayloadParsed,
    PayloadRejected { reason: String },

    // Dispatch events
    DispatchFinished,
    DispatchFailed { reason: String },

    /// The failure has been shown to the user
    ErrorSurfaced,
}
