//! Property-based tests for the turn state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::transition::*;
use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_reason() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,20}"
}

fn arb_state() -> impl Strategy<Value = TurnState> {
    prop_oneof![
        Just(TurnState::Idle),
        Just(TurnState::Sending),
        Just(TurnState::ParsingResponse),
        Just(TurnState::Dispatching),
        arb_reason().prop_map(|reason| TurnState::Failed { reason }),
    ]
}

fn arb_event() -> impl Strategy<Value = TurnEvent> {
    prop_oneof![
        Just(TurnEvent::Submit),
        Just(TurnEvent::BackendReplied),
        arb_reason().prop_map(|reason| TurnEvent::BackendFailed { reason }),
        Just(TurnEvent::PayloadParsed),
        arb_reason().prop_map(|reason| TurnEvent::PayloadRejected { reason }),
        Just(TurnEvent::DispatchFinished),
        arb_reason().prop_map(|reason| TurnEvent::DispatchFailed { reason }),
        Just(TurnEvent::ErrorSurfaced),
    ]
}

/// How a scripted turn ends
#[derive(Debug, Clone)]
enum Ending {
    Dispatched,
    BackendFailure(String),
    PayloadRejected(String),
    DispatchFailure(String),
}

fn arb_ending() -> impl Strategy<Value = Ending> {
    prop_oneof![
        Just(Ending::Dispatched),
        arb_reason().prop_map(Ending::BackendFailure),
        arb_reason().prop_map(Ending::PayloadRejected),
        arb_reason().prop_map(Ending::DispatchFailure),
    ]
}

/// The event sequence the session emits for one turn
fn script(ending: Ending) -> Vec<TurnEvent> {
    let mut events = vec![TurnEvent::Submit];
    match ending {
        Ending::Dispatched => events.extend([
            TurnEvent::BackendReplied,
            TurnEvent::PayloadParsed,
            TurnEvent::DispatchFinished,
        ]),
        Ending::BackendFailure(reason) => {
            events.extend([TurnEvent::BackendFailed { reason }, TurnEvent::ErrorSurfaced]);
        }
        Ending::PayloadRejected(reason) => events.extend([
            TurnEvent::BackendReplied,
            TurnEvent::PayloadRejected { reason },
            TurnEvent::ErrorSurfaced,
        ]),
        Ending::DispatchFailure(reason) => events.extend([
            TurnEvent::BackendReplied,
            TurnEvent::PayloadParsed,
            TurnEvent::DispatchFailed { reason },
            TurnEvent::ErrorSurfaced,
        ]),
    }
    events
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Every scripted turn is accepted step by step and ends in Idle
    #[test]
    fn scripted_turns_always_return_to_idle(endings in prop::collection::vec(arb_ending(), 1..20)) {
        let mut state = TurnState::Idle;
        for ending in endings {
            for event in script(ending) {
                state = transition(&state, event).map_err(|e| TestCaseError::fail(e.to_string()))?;
            }
            prop_assert_eq!(&state, &TurnState::Idle);
        }
    }

    /// Submit is accepted exactly when the session is idle
    #[test]
    fn submit_accepted_only_when_idle(state in arb_state()) {
        let result = transition(&state, TurnEvent::Submit);
        if state.is_idle() {
            prop_assert_eq!(result, Ok(TurnState::Sending));
        } else {
            prop_assert_eq!(result, Err(TransitionError::SessionBusy));
        }
    }

    /// Same input, same output
    #[test]
    fn transition_is_deterministic(state in arb_state(), event in arb_event()) {
        let a = transition(&state, event.clone());
        let b = transition(&state, event);
        prop_assert_eq!(a, b);
    }

    /// Failed is only entered with the reason carried by the failing event
    #[test]
    fn failed_carries_event_reason(state in arb_state(), event in arb_event()) {
        let expected = match &event {
            TurnEvent::BackendFailed { reason }
            | TurnEvent::PayloadRejected { reason }
            | TurnEvent::DispatchFailed { reason } => Some(reason.clone()),
            _ => None,
        };
        if let Ok(TurnState::Failed { reason }) = transition(&state, event) {
            prop_assert_eq!(Some(reason), expected);
        }
    }

    /// Idle stays reachable: from any state, at most three accepted events lead back
    #[test]
    fn idle_is_always_reachable(state in arb_state()) {
        let path = match &state {
            TurnState::Idle => vec![],
            TurnState::Sending => vec![
                TurnEvent::BackendFailed { reason: "x".into() },
                TurnEvent::ErrorSurfaced,
            ],
            TurnState::ParsingResponse => vec![
                TurnEvent::PayloadRejected { reason: "x".into() },
                TurnEvent::ErrorSurfaced,
            ],
            TurnState::Dispatching => vec![TurnEvent::DispatchFinished],
            TurnState::Failed { .. } => vec![TurnEvent::ErrorSurfaced],
        };
        let mut current = state;
        for event in path {
            current = transition(&current, event).map_err(|e| TestCaseError::fail(e.to_string()))?;
        }
        prop_assert!(current.is_idle());
    }

    /// Random event streams never reach an undefined state
    #[test]
    fn random_streams_stay_well_formed(events in prop::collection::vec(arb_event(), 0..40)) {
        let mut state = TurnState::Idle;
        for event in events {
            let before = state.clone();
            match transition(&state, event) {
                Ok(next) => state = next,
                Err(_) => prop_assert_eq!(&state, &before),
            }
        }
    }
}
