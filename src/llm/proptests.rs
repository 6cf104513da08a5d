//! Property-based tests for the conversation history contract
//!
//! - A failed exchange leaves the history exactly as it was
//! - The history never ends on a user turn after an exchange
//! - The initial prompt shows up in at most one outgoing request

use super::client::{ChatClient, GenerativeBackend, ERROR_SENTINEL};
use super::types::{History, Role};
use super::LlmError;
use crate::runtime::testing::MockLlmService;
use proptest::prelude::*;
use std::sync::Arc;

const SYSTEM: &str = "<<initial prompt>>";

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    ErrorShaped,
    Network,
    Status(u16),
}

fn arb_reply() -> impl Strategy<Value = Reply> {
    prop_oneof![
        3 => "[a-zA-Z0-9 _.!?,]{1,40}".prop_map(Reply::Text),
        1 => Just(Reply::ErrorShaped),
        1 => Just(Reply::Network),
        1 => prop_oneof![Just(400u16), Just(401), Just(429), Just(500), Just(503)].prop_map(Reply::Status),
    ]
}

fn arb_turn() -> impl Strategy<Value = (String, bool, Reply)> {
    ("[a-z ]{1,20}", any::<bool>(), arb_reply())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

proptest! {
    #[test]
    fn failed_turns_leave_history_unchanged(turns in prop::collection::vec(arb_turn(), 1..12)) {
        let rt = runtime();
        let mock = Arc::new(MockLlmService::new("mock"));
        let mut client = ChatClient::new(Arc::clone(&mock), 0.2);

        for (text, with_initial, reply) in turns {
            let succeeds = matches!(reply, Reply::Text(_));
            match reply {
                Reply::Text(t) => mock.queue_text(t),
                Reply::ErrorShaped => mock.queue_text(format!("{ERROR_SENTINEL} upstream")),
                Reply::Network => mock.queue_error(LlmError::network("down")),
                Reply::Status(s) => mock.queue_error(LlmError::from_status(s, "nope")),
            }

            let before: History = client.history().clone();
            let initial = with_initial.then_some(SYSTEM);
            let out = rt.block_on(client.send_message(&text, initial, None));

            if succeeds {
                prop_assert!(!out.starts_with(ERROR_SENTINEL));
                prop_assert_eq!(client.history().last().map(|m| m.role), Some(Role::Model));
                prop_assert!(client.history().len() > before.len());
            } else {
                prop_assert!(out.starts_with(ERROR_SENTINEL));
                prop_assert_eq!(client.history(), &before);
            }
            prop_assert!(client.history().is_settled());
        }
    }

    #[test]
    fn initial_prompt_sent_in_at_most_one_successful_request(n in 1usize..8) {
        let rt = runtime();
        let mock = Arc::new(MockLlmService::new("mock"));
        let mut client = ChatClient::new(Arc::clone(&mock), 0.2);

        for i in 0..n {
            mock.queue_text(format!("reply {i}"));
            rt.block_on(client.send_message(&format!("q{i}"), Some(SYSTEM), None));
        }

        let in_history = client
            .history()
            .messages()
            .iter()
            .filter(|m| m.text == SYSTEM)
            .count();
        prop_assert_eq!(in_history, 1);

        // Only the first request carried it as a fresh append
        let requests = mock.recorded_requests();
        for req in requests.iter().skip(1) {
            prop_assert_eq!(req.messages.iter().filter(|m| m.text == SYSTEM).count(), 1);
            prop_assert_eq!(&req.messages[0].text, SYSTEM);
        }
    }
}
