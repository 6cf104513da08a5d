//! Conversation-aware client on top of an [`LlmService`]
//!
//! Owns the turn history for one conversation and guarantees that a failed
//! exchange leaves it exactly as it was before the call.

use super::types::{History, LlmRequest, Message};
use super::{LlmError, LlmService};
use async_trait::async_trait;

/// Prefix of every reply that reports a failure instead of model output
pub const ERROR_SENTINEL: &str = "Error:";

/// Contract every generative backend client satisfies.
///
/// Failures never cross this boundary as errors: they come back as a reply
/// starting with [`ERROR_SENTINEL`], and the history is rolled back.
#[async_trait]
pub trait GenerativeBackend: Send {
    /// Forget every turn. Safe to call at any time.
    fn reset_history(&mut self);

    /// Append the user turn (preceded once by `initial_text`), send the whole
    /// conversation, and return the raw reply.
    async fn send_message(
        &mut self,
        user_text: &str,
        initial_text: Option<&str>,
        temperature: Option<f32>,
    ) -> String;

    /// Read-only view of the conversation so far
    fn history(&self) -> &History;
}

/// History-keeping client generic over the transport
pub struct ChatClient<L: LlmService> {
    service: L,
    history: History,
    temperature: f32,
    /// The initial prompt is part of the current history
    primed: bool,
}

impl<L: LlmService> ChatClient<L> {
    pub fn new(service: L, temperature: f32) -> Self {
        Self {
            service,
            history: History::new(),
            temperature: clamp_temperature(temperature),
            primed: false,
        }
    }

    pub fn model_id(&self) -> &str {
        self.service.model_id()
    }

    pub fn default_temperature(&self) -> f32 {
        self.temperature
    }

    fn describe_failure(err: &LlmError) -> String {
        if err.kind.is_backend_reported() {
            format!("{ERROR_SENTINEL} the backend rejected the request. {err}")
        } else {
            format!("{ERROR_SENTINEL} could not process the request or the response. {err}")
        }
    }

    fn rollback(&mut self, mark: usize, user: &Message) {
        if !self.history.rollback_to(mark, user) {
            tracing::warn!(
                mark,
                len = self.history.len(),
                "History tail changed during request, skipping rollback"
            );
        }
    }
}

#[async_trait]
impl<L: LlmService> GenerativeBackend for ChatClient<L> {
    fn reset_history(&mut self) {
        self.history.clear();
        self.primed = false;
        tracing::debug!("Conversation history reset");
    }

    async fn send_message(
        &mut self,
        user_text: &str,
        initial_text: Option<&str>,
        temperature: Option<f32>,
    ) -> String {
        let mark = self.history.len();

        let mut carries_initial = false;
        if let Some(initial) = initial_text {
            // Only ever the opening turn of a conversation
            if !self.primed && self.history.is_empty() {
                self.history.push(Message::user(initial));
                carries_initial = true;
            }
        }

        let user = Message::user(user_text);
        self.history.push(user.clone());

        let request = LlmRequest {
            messages: self.history.messages().to_vec(),
            temperature: temperature.map_or(self.temperature, clamp_temperature),
        };

        match self.service.complete(&request).await {
            Ok(text) if text.starts_with(ERROR_SENTINEL) => {
                // An error-shaped reply is not conversation content
                self.rollback(mark, &user);
                text
            }
            Ok(text) => {
                self.history.push(Message::model(text.clone()));
                if carries_initial {
                    self.primed = true;
                }
                text
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind, "send_message failed, rolling back");
                self.rollback(mark, &user);
                Self::describe_failure(&e)
            }
        }
    }

    fn history(&self) -> &History {
        &self.history
    }
}

fn clamp_temperature(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::runtime::testing::MockLlmService;
    use std::sync::Arc;

    fn client(mock: &Arc<MockLlmService>) -> ChatClient<Arc<MockLlmService>> {
        ChatClient::new(Arc::clone(mock), 0.1)
    }

    #[tokio::test]
    async fn test_initial_prompt_precedes_first_turn() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_text("hello");
        let mut client = client(&mock);

        let reply = client.send_message("list tables", Some("SYSTEM"), None).await;

        assert_eq!(reply, "hello");
        let sent = mock.recorded_requests();
        assert_eq!(sent[0].messages.len(), 2);
        assert_eq!(sent[0].messages[0], Message::user("SYSTEM"));
        assert_eq!(sent[0].messages[1], Message::user("list tables"));
        assert_eq!(client.history().len(), 3);
        assert_eq!(client.history().last().unwrap().role, Role::Model);
    }

    #[tokio::test]
    async fn test_initial_prompt_sent_only_once() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_text("one");
        mock.queue_text("two");
        let mut client = client(&mock);

        client.send_message("a", Some("SYSTEM"), None).await;
        client.send_message("b", Some("SYSTEM"), None).await;

        let sent = mock.recorded_requests();
        let system_count = sent[1]
            .messages
            .iter()
            .filter(|m| m.text == "SYSTEM")
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(client.history().len(), 5);
    }

    #[tokio::test]
    async fn test_initial_prompt_never_lands_mid_conversation() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_text("one");
        mock.queue_text("two");
        let mut client = client(&mock);

        client.send_message("a", None, None).await;
        client.send_message("b", Some("SYSTEM"), None).await;

        let texts: Vec<&str> = client
            .history()
            .messages()
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["a", "one", "b", "two"]);
    }

    #[tokio::test]
    async fn test_transport_failure_rolls_back_everything_appended() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_error(LlmError::network("connection refused"));
        let mut client = client(&mock);

        let reply = client.send_message("hi", Some("SYSTEM"), None).await;

        assert!(reply.starts_with(ERROR_SENTINEL));
        assert!(reply.contains("connection refused"));
        assert!(client.history().is_empty());
    }

    #[tokio::test]
    async fn test_backend_status_failure_keeps_prior_turns() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_text("first answer");
        mock.queue_error(LlmError::from_status(500, "quota exceeded"));
        let mut client = client(&mock);

        client.send_message("first", None, None).await;
        let before = client.history().clone();
        let reply = client.send_message("second", None, None).await;

        assert!(reply.starts_with("Error:"));
        assert!(reply.contains("quota exceeded"));
        assert_eq!(client.history(), &before);
    }

    #[tokio::test]
    async fn test_error_shaped_reply_is_not_recorded() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_text("Error: something upstream");
        let mut client = client(&mock);

        let reply = client.send_message("hi", None, None).await;

        assert_eq!(reply, "Error: something upstream");
        assert!(client.history().is_empty());
    }

    #[tokio::test]
    async fn test_failed_first_turn_does_not_prime() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_error(LlmError::network("timeout"));
        mock.queue_text("ok");
        let mut client = client(&mock);

        client.send_message("a", Some("SYSTEM"), None).await;
        client.send_message("b", Some("SYSTEM"), None).await;

        let sent = mock.recorded_requests();
        assert_eq!(sent[1].messages[0].text, "SYSTEM");
    }

    #[tokio::test]
    async fn test_temperature_override_is_per_call() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_text("a");
        mock.queue_text("b");
        let mut client = client(&mock);

        client.send_message("x", None, Some(0.9)).await;
        client.send_message("y", None, None).await;

        let sent = mock.recorded_requests();
        assert!((sent[0].temperature - 0.9).abs() < f32::EPSILON);
        assert!((sent[1].temperature - 0.1).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_temperature_is_clamped() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_text("a");
        let mut client = client(&mock);

        client.send_message("x", None, Some(7.5)).await;

        assert!((mock.recorded_requests()[0].temperature - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_reset_history_rearms_initial_prompt() {
        let mock = Arc::new(MockLlmService::new("mock"));
        mock.queue_text("a");
        mock.queue_text("b");
        let mut client = client(&mock);

        client.send_message("x", Some("SYSTEM"), None).await;
        client.reset_history();
        assert!(client.history().is_empty());
        client.send_message("y", Some("SYSTEM"), None).await;

        let sent = mock.recorded_requests();
        assert_eq!(sent[1].messages.len(), 2);
        assert_eq!(sent[1].messages[0].text, "SYSTEM");
    }
}
