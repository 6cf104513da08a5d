//! Common types for LLM interactions

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Wire name used by the backend (`user` / `model`)
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One conversation turn. Immutable once appended to a [`History`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Ordered log of conversation turns.
///
/// Insertion order is conversation order. Messages can only be appended or
/// rolled back from the tail; nothing in the middle is ever rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Drop everything appended after `mark` (a previous [`History::len`]).
    ///
    /// Only applies when the tail is still the exact `expected` user message;
    /// otherwise the history is left alone and `false` is returned.
    pub fn rollback_to(&mut self, mark: usize, expected: &Message) -> bool {
        if self.messages.len() <= mark || self.last() != Some(expected) {
            return false;
        }
        self.messages.truncate(mark);
        true
    }

    /// True when the log is empty or its last turn came from the model
    pub fn is_settled(&self) -> bool {
        self.last().map_or(true, |m| m.role == Role::Model)
    }
}

/// LLM request: the full ordered conversation plus per-call overrides
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
}
