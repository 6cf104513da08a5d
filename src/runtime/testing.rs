//! Mock implementations for testing
//!
//! These mocks enable session and processor testing without real I/O.

use crate::data::{DataError, DataSource, QueryResult};
use crate::llm::{LlmError, LlmRequest, LlmService};
use crate::processors::{DiagramRenderer, RenderError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    /// Queue a successful reply
    pub fn queue_text(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Hold every following request until the returned handle is notified once per request
    pub fn pause(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Data Source
// ============================================================================

/// Data source with a fixed schema and queued query results
pub struct MockDataSource {
    schema: Result<String, String>,
    results: Mutex<VecDeque<Result<QueryResult, DataError>>>,
    /// Record of every query run
    pub queries: Mutex<Vec<String>>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self {
            schema: Ok(String::new()),
            results: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_schema(mut self, ddl: impl Into<String>) -> Self {
        self.schema = Ok(ddl.into());
        self
    }

    pub fn with_schema_error(mut self, message: impl Into<String>) -> Self {
        self.schema = Err(message.into());
        self
    }

    pub fn queue_result(&self, result: QueryResult) {
        self.results.lock().unwrap().push_back(Ok(result));
    }

    pub fn queue_error(&self, error: DataError) {
        self.results.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl Default for MockDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn describe_schema(&self) -> Result<String, DataError> {
        self.schema.clone().map_err(DataError::Unavailable)
    }

    async fn query(&self, sql: &str) -> Result<QueryResult, DataError> {
        self.queries.lock().unwrap().push(sql.to_string());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(QueryResult::default()))
    }
}

// ============================================================================
// Mock Diagram Renderer
// ============================================================================

/// Renderer that records sources and hands out fake image paths
pub struct MockDiagramRenderer {
    fail: bool,
    /// Record of rendered sources
    pub sources: Mutex<Vec<String>>,
}

impl MockDiagramRenderer {
    pub fn new() -> Self {
        Self {
            fail: false,
            sources: Mutex::new(Vec::new()),
        }
    }

    /// A renderer whose every call fails like a crashed subprocess
    pub fn failing() -> Self {
        Self {
            fail: true,
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn rendered_sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

impl Default for MockDiagramRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiagramRenderer for MockDiagramRenderer {
    async fn render(&self, source: &str) -> Result<PathBuf, RenderError> {
        let mut sources = self.sources.lock().unwrap();
        sources.push(source.to_string());
        if self.fail {
            return Err(RenderError::Failed {
                code: 1,
                stderr: "mock renderer failure".to_string(),
            });
        }
        Ok(PathBuf::from(format!("/tmp/mock-diagram-{}.png", sources.len())))
    }
}
