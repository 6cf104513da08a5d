//! chatagent - conversational data assistant
//!
//! A chat session sends user questions to a generative backend, pulls the
//! fenced JSON payload out of each reply and dispatches it to the processor
//! registered for its kind: plain text, SQL queries, charts or diagrams.

pub mod config;
pub mod data;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod llm;
pub mod processors;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod system_prompt;

pub use config::{AgentConfig, ConfigError};
pub use error::TurnError;
pub use runtime::{spawn_session, SessionEvent, SessionHandle, SubmitError, TurnHandle};
pub use session::{ChatSession, TurnOutcome};
