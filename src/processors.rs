//! Result processors and the registry that dispatches to them
//!
//! Each processor owns one envelope kind. It contributes a short summary
//! line and a detailed section to the initial prompt, and turns the
//! envelope's fields into output blocks for the chat surface.

mod chart;
mod diagram;
mod sql;
mod text;

pub use chart::{ChartProcessor, ChartSeries, ChartSpec};
pub use diagram::{DiagramProcessor, DiagramRenderer, PlantUmlRenderer, RenderError};
pub use sql::SqlProcessor;
pub use text::TextProcessor;

use crate::data::{DataContext, DataError};
use crate::envelope::ResponseEnvelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// One renderable piece of processor output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum OutputBlock {
    Text {
        text: String,
    },
    Table {
        title: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        produced_at: DateTime<Utc>,
    },
    Chart(ChartSpec),
    Diagram {
        title: String,
        image_path: PathBuf,
    },
}

impl OutputBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// What a processor produced for one envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessorOutput {
    pub blocks: Vec<OutputBlock>,
}

impl ProcessorOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::block(OutputBlock::text(text))
    }

    pub fn block(block: OutputBlock) -> Self {
        Self {
            blocks: vec![block],
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Invalid fields: {0}")]
    InvalidFields(#[from] serde_json::Error),
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("No data source is open")]
    NoDataContext,
    #[error("Query failed: {0}")]
    Data(#[from] DataError),
    #[error("Diagram rendering failed: {0}")]
    Render(#[from] RenderError),
}

/// Read-only context handed to every processor call.
///
/// Processors see who is speaking and what data is open, never the
/// conversation itself.
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    /// Sender name for agent output
    pub agent_name: String,
    /// Currently bound data, if any
    pub data: Option<DataContext>,
}

impl ProcessorContext {
    pub fn new(agent_name: impl Into<String>, data: Option<DataContext>) -> Self {
        Self {
            agent_name: agent_name.into(),
            data,
        }
    }

    /// The bound data context, or [`ProcessorError::NoDataContext`]
    pub fn require_data(&self) -> Result<&DataContext, ProcessorError> {
        self.data.as_ref().ok_or(ProcessorError::NoDataContext)
    }
}

/// Handler for one envelope kind
#[async_trait]
pub trait Processor: Send + Sync {
    /// Discriminator value this processor owns
    fn kind(&self) -> &str;

    /// One-line summary for the supported-kinds list
    fn description(&self) -> String;

    /// Detailed prompt section: when to answer with this kind and its JSON shape
    fn prompt_info(&self) -> String;

    /// Turn the envelope fields into output
    async fn handle(
        &self,
        ctx: &ProcessorContext,
        user_text: &str,
        fields: &Map<String, Value>,
    ) -> Result<ProcessorOutput, ProcessorError>;
}

/// Deserialize envelope fields into a processor's input struct
pub(crate) fn parse_fields<T: DeserializeOwned>(
    fields: &Map<String, Value>,
) -> Result<T, ProcessorError> {
    Ok(serde_json::from_value(Value::Object(fields.clone()))?)
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("A processor for kind '{0}' is already registered")]
    DuplicateKind(String),
    #[error("Processor kind must not be empty")]
    EmptyKind,
}

/// Prompt text contributed by all registered processors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContribution {
    /// One `- kind: description` line per processor
    pub summary: String,
    /// Every processor's detailed section
    pub details: String,
}

/// Result of routing one envelope
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled {
        kind: String,
        output: ProcessorOutput,
    },
    UnknownKind {
        kind: String,
        /// The whole envelope, for the diagnostic
        raw: String,
    },
    Failed {
        kind: String,
        message: String,
    },
}

/// Kind-keyed processor map. Built at startup, read-only afterwards.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four built-in processors
    pub fn standard(renderer: Arc<dyn DiagramRenderer>) -> Self {
        let builtin: [Arc<dyn Processor>; 4] = [
            Arc::new(TextProcessor),
            Arc::new(SqlProcessor),
            Arc::new(ChartProcessor),
            Arc::new(DiagramProcessor::new(renderer)),
        ];
        let processors = builtin
            .into_iter()
            .map(|p| (p.kind().to_string(), p))
            .collect();
        Self { processors }
    }

    /// Add a processor; a second processor for the same kind is rejected
    pub fn register(&mut self, processor: Arc<dyn Processor>) -> Result<(), RegistryError> {
        let kind = processor.kind().trim().to_string();
        if kind.is_empty() {
            return Err(RegistryError::EmptyKind);
        }
        if self.processors.contains_key(&kind) {
            return Err(RegistryError::DuplicateKind(kind));
        }
        self.processors.insert(kind, processor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Registered kinds in lexicographic order
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.processors.keys().map(String::as_str)
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Processor>> {
        self.processors.get(kind)
    }

    /// Summary lines and detailed sections, in kind order
    pub fn build_prompt_contribution(&self) -> PromptContribution {
        let mut summary = String::new();
        let mut details = String::new();
        for (kind, processor) in &self.processors {
            summary.push_str(&format!("- {kind}: {}\n", processor.description()));
            details.push_str(processor.prompt_info().trim_end());
            details.push_str("\n\n");
        }
        PromptContribution { summary, details }
    }

    /// Route an envelope to its processor.
    ///
    /// Never fails: unregistered kinds, processor errors and processor panics
    /// all come back as outcomes.
    pub async fn dispatch(
        &self,
        ctx: &ProcessorContext,
        user_text: &str,
        envelope: &ResponseEnvelope,
    ) -> DispatchOutcome {
        let kind = envelope.kind().to_string();
        let Some(processor) = self.processors.get(&kind) else {
            tracing::warn!(kind = %kind, "No processor registered for kind");
            return DispatchOutcome::UnknownKind {
                kind,
                raw: envelope.to_string(),
            };
        };

        let handled = AssertUnwindSafe(processor.handle(ctx, user_text, envelope.fields()))
            .catch_unwind()
            .await;

        match handled {
            Ok(Ok(output)) => {
                tracing::debug!(kind = %kind, blocks = output.blocks.len(), "Processor finished");
                DispatchOutcome::Handled { kind, output }
            }
            Ok(Err(e)) => {
                tracing::warn!(kind = %kind, error = %e, "Processor failed");
                DispatchOutcome::Failed {
                    kind,
                    message: e.to_string(),
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(kind = %kind, panic = %message, "Processor panicked");
                DispatchOutcome::Failed { kind, message }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "processor panicked".to_string()
    }
}
