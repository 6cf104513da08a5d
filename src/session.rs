//! Conversation session: the turn orchestrator
//!
//! A session owns the backend client (and with it the history), the bound
//! data context and the first-turn flag. One turn runs the backend call,
//! splits the reply, parses the envelope and dispatches it, emitting
//! [`SessionEvent`]s as it goes.

use crate::data::DataContext;
use crate::envelope::ResponseEnvelope;
use crate::error::TurnError;
use crate::extract;
use crate::llm::{GenerativeBackend, History, ERROR_SENTINEL};
use crate::processors::{DispatchOutcome, ProcessorContext, ProcessorRegistry};
use crate::runtime::{SessionEvent, EVENT_CHANNEL_CAPACITY, USER_SENDER};
use crate::state_machine::{transition, TurnEvent, TurnState};
use crate::system_prompt::build_initial_prompt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default sender name for agent output
pub const DEFAULT_AGENT_NAME: &str = "System";

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The envelope was handled by its processor
    Dispatched { kind: String },
    /// The envelope named a kind nobody handles
    UnknownKind { kind: String },
    Failed(TurnError),
}

pub struct ChatSession<B: GenerativeBackend> {
    backend: B,
    registry: Arc<ProcessorRegistry>,
    template: String,
    agent_name: String,
    data: Option<DataContext>,
    /// Gates the initial prompt; cleared by the first send attempt
    first_turn: bool,
    state: TurnState,
    events: broadcast::Sender<SessionEvent>,
}

impl<B: GenerativeBackend> ChatSession<B> {
    pub fn new(backend: B, registry: Arc<ProcessorRegistry>, template: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            registry,
            template: template.into(),
            agent_name: DEFAULT_AGENT_NAME.to_string(),
            data: None,
            first_turn: true,
            state: TurnState::Idle,
            events,
        }
    }

    #[must_use]
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = name.into();
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn is_first_turn(&self) -> bool {
        self.first_turn
    }

    pub fn history(&self) -> &History {
        self.backend.history()
    }

    pub fn data_context(&self) -> Option<&DataContext> {
        self.data.as_ref()
    }

    /// Bind (or unbind) the data the conversation is about.
    ///
    /// A different context starts a new conversation: history is cleared and
    /// the initial prompt is re-armed. Rebinding the same id changes nothing.
    /// Returns whether the context changed.
    pub fn bind_data_context(&mut self, data: Option<DataContext>) -> bool {
        let current = self.data.as_ref().map(|d| d.id.as_str());
        let next = data.as_ref().map(|d| d.id.as_str());
        if current == next {
            tracing::debug!(context_id = ?next, "Same data context, keeping conversation");
            return false;
        }

        let context_id = next.map(String::from);
        tracing::info!(context_id = ?context_id, "Data context changed, starting new conversation");
        self.data = data;
        self.backend.reset_history();
        self.first_turn = true;
        self.emit(SessionEvent::ContextChanged { context_id });
        true
    }

    /// Forget the conversation and re-arm the initial prompt
    pub fn reset(&mut self) {
        self.backend.reset_history();
        self.first_turn = true;
        tracing::info!("Conversation reset");
    }

    /// Run one full turn for `user_text`
    pub async fn run_turn(&mut self, user_text: &str) -> TurnOutcome {
        let text = user_text.trim();
        if text.is_empty() {
            return TurnOutcome::Failed(TurnError::EmptyMessage);
        }
        if let Err(e) = self.apply(TurnEvent::Submit) {
            tracing::warn!(error = %e, "Submit rejected");
            return TurnOutcome::Failed(TurnError::Busy);
        }
        self.emit(SessionEvent::Message {
            sender: USER_SENDER.to_string(),
            text: text.to_string(),
        });

        // Sending
        let initial = match (&self.data, self.first_turn) {
            (Some(data), true) => {
                Some(build_initial_prompt(&self.template, &self.registry, data).await)
            }
            _ => None,
        };
        let reply = self
            .backend
            .send_message(text, initial.as_deref(), None)
            .await;
        // A failed first turn does not get a second chance at the initial prompt
        self.first_turn = false;

        if reply.starts_with(ERROR_SENTINEL) {
            return self.fail(TurnError::Backend(reply));
        }
        self.advance(TurnEvent::BackendReplied);

        // ParsingResponse
        let split = extract::split(reply.trim());
        if !split.commentary.is_empty() {
            self.emit(SessionEvent::Message {
                sender: self.agent_name.clone(),
                text: split.commentary,
            });
        }
        let Some(payload) = split.payload else {
            return self.fail(TurnError::MalformedPayload(
                "no fenced JSON block in the reply".to_string(),
            ));
        };
        let envelope = match ResponseEnvelope::parse(&payload) {
            Ok(envelope) => envelope,
            Err(e) => return self.fail(TurnError::MalformedPayload(e.to_string())),
        };
        self.advance(TurnEvent::PayloadParsed);

        // Dispatching
        let ctx = ProcessorContext::new(self.agent_name.clone(), self.data.clone());
        match self.registry.dispatch(&ctx, text, &envelope).await {
            DispatchOutcome::Handled { kind, output } => {
                for block in output.blocks {
                    self.emit(SessionEvent::Output {
                        sender: self.agent_name.clone(),
                        block,
                    });
                }
                self.advance(TurnEvent::DispatchFinished);
                self.emit(SessionEvent::TurnDone);
                tracing::info!(kind = %kind, "Turn dispatched");
                TurnOutcome::Dispatched { kind }
            }
            DispatchOutcome::UnknownKind { kind, raw } => {
                self.fail(TurnError::UnknownKind {
                    kind: kind.clone(),
                    raw,
                });
                TurnOutcome::UnknownKind { kind }
            }
            DispatchOutcome::Failed { kind, message } => {
                self.fail(TurnError::ProcessorFailure { kind, message })
            }
        }
    }

    /// Surface `error`, pass through Failed and return to Idle
    fn fail(&mut self, error: TurnError) -> TurnOutcome {
        let reason = error.to_string();
        let event = match self.state {
            TurnState::Sending => TurnEvent::BackendFailed { reason },
            TurnState::ParsingResponse => TurnEvent::PayloadRejected { reason },
            _ => TurnEvent::DispatchFailed { reason },
        };
        self.advance(event);

        tracing::warn!(category = error.category(), error = %error, "Turn failed");
        self.emit(SessionEvent::Error {
            message: error.to_string(),
        });
        self.advance(TurnEvent::ErrorSurfaced);
        self.emit(SessionEvent::TurnDone);
        TurnOutcome::Failed(error)
    }

    fn apply(&mut self, event: TurnEvent) -> Result<(), crate::state_machine::TransitionError> {
        let next = transition(&self.state, event)?;
        if next != self.state {
            self.state = next;
            self.emit(SessionEvent::StateChange {
                state: self.state.clone(),
            });
        }
        Ok(())
    }

    /// Apply an event the turn sequence guarantees to be valid
    fn advance(&mut self, event: TurnEvent) {
        if let Err(e) = self.apply(event) {
            tracing::error!(error = %e, state = %self.state, "Unexpected turn transition, forcing idle");
            self.state = TurnState::Idle;
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
