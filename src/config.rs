//! Runtime configuration from environment variables

use crate::llm::DEFAULT_BASE_URL;
use crate::session::DEFAULT_AGENT_NAME;
use crate::system_prompt::{missing_placeholders, DEFAULT_PROMPT_TEMPLATE};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PLANTUML_BIN: &str = "plantuml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CHATAGENT_TEMPERATURE is not a number: {0}")]
    InvalidTemperature(String),
    #[error("CHATAGENT_TEMPERATURE must be between 0.0 and 1.0, got {0}")]
    TemperatureOutOfRange(f32),
    #[error("CHATAGENT_TIMEOUT_SECS is not a whole number of seconds: {0}")]
    InvalidTimeout(String),
    #[error("Cannot read prompt template {path}: {source}")]
    TemplateUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Prompt template is missing placeholders: {}", .0.join(", "))]
    MissingPlaceholders(Vec<&'static str>),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Required by the binary, optional here so tests can build a config
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub template: String,
    pub agent_name: String,
    pub view_bounds: Option<String>,
    pub plantuml_bin: PathBuf,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let temperature = match var("CHATAGENT_TEMPERATURE") {
            Some(raw) => parse_temperature(&raw)?,
            None => DEFAULT_TEMPERATURE,
        };

        let timeout = match var("CHATAGENT_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidTimeout(raw))?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let template = match var("CHATAGENT_PROMPT_TEMPLATE") {
            Some(path) => load_template(PathBuf::from(path))?,
            None => DEFAULT_PROMPT_TEMPLATE.to_string(),
        };

        Ok(Self {
            api_key: var("GEMINI_API_KEY"),
            model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: var("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature,
            timeout,
            template,
            agent_name: var("CHATAGENT_AGENT_NAME")
                .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string()),
            view_bounds: var("CHATAGENT_VIEW_BOUNDS"),
            plantuml_bin: var("PLANTUML_BIN")
                .map_or_else(|| PathBuf::from(DEFAULT_PLANTUML_BIN), PathBuf::from),
        })
    }
}

fn parse_temperature(raw: &str) -> Result<f32, ConfigError> {
    let value: f32 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidTemperature(raw.to_string()))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::TemperatureOutOfRange(value));
    }
    Ok(value)
}

fn load_template(path: PathBuf) -> Result<String, ConfigError> {
    let template = match std::fs::read_to_string(&path) {
        Ok(template) => template,
        Err(source) => return Err(ConfigError::TemplateUnreadable { path, source }),
    };
    let missing = missing_placeholders(&template);
    if !missing.is_empty() {
        return Err(ConfigError::MissingPlaceholders(missing));
    }
    tracing::info!(path = %path.display(), "Loaded prompt template");
    Ok(template)
}
