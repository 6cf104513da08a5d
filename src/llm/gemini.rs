//! Google Gemini provider implementation

use super::types::{LlmRequest, Message};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Public Gemini endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini service implementation
pub struct GeminiService {
    client: Client,
    api_key: String,
    endpoint: String,
    model_id: String,
}

impl GeminiService {
    pub fn new(
        api_key: String,
        model: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/'),
            model
        );

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint,
            model_id: model.to_string(),
        })
    }

    fn translate_request(request: &LlmRequest) -> GeminiRequest {
        GeminiRequest {
            contents: request.messages.iter().map(GeminiContent::from).collect(),
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
            },
        }
    }

    /// Turn an HTTP status and body into reply text or a classified error
    fn interpret_response(status: u16, body: &str) -> Result<String, LlmError> {
        if !(200..300).contains(&status) {
            return Err(LlmError::from_status(status, &error_message(body)));
        }

        let resp: GeminiResponse = serde_json::from_str(body).map_err(|e| {
            LlmError::malformed_response(format!("Failed to parse response: {e} - body: {body}"))
                .with_status(status)
        })?;

        let Some(candidates) = resp.candidates else {
            if let Some(err) = resp.error {
                let message = err
                    .message
                    .unwrap_or_else(|| "unknown backend error".to_string());
                return Err(LlmError::unknown(format!("Backend error: {message}")).with_status(status));
            }
            return Err(LlmError::malformed_response(
                "Unexpected response structure: no 'candidates' field",
            ));
        };

        let candidate = candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::empty_response("The 'candidates' array is empty"))?;

        let parts = candidate
            .content
            .ok_or_else(|| LlmError::empty_response("The candidate has no 'content' field"))?
            .parts
            .unwrap_or_default();
        if parts.is_empty() {
            return Err(LlmError::empty_response("The candidate content has no parts"));
        }

        let texts: Vec<String> = parts.into_iter().filter_map(|p| p.text).collect();
        if texts.is_empty() {
            return Err(LlmError::empty_response("The candidate parts have no 'text' field"));
        }

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" {
                tracing::warn!(finish_reason = reason, "Gemini reply did not finish normally");
            }
        }

        Ok(texts.concat())
    }
}

#[async_trait]
impl LlmService for GeminiService {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let gemini_request = Self::translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        Self::interpret_response(status.as_u16(), &body)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Best-effort extraction of the backend's own error message
fn error_message(body: &str) -> String {
    if let Ok(resp) = serde_json::from_str::<GeminiErrorResponse>(body) {
        if let Some(message) = resp.error.and_then(|e| e.message).or(resp.message) {
            return message;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "<empty body>".to_string()
    } else {
        trimmed.to_string()
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiTextPart>,
}

impl From<&Message> for GeminiContent {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str(),
            parts: vec![GeminiTextPart {
                text: msg.text.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

// Response side: every level is optional so odd shapes degrade to errors
// instead of deserialization failures.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiReplyContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Option<Vec<GeminiReplyPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    #[serde(default)]
    error: Option<GeminiError>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    message: Option<String>,
}
