//! Response envelope: the structured payload a model reply carries
//!
//! The payload is a JSON object tagged by a discriminator. The discriminator
//! key on the wire is `type`; `kind` is accepted as an alias.

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Wire keys recognised as the discriminator, in lookup order
pub const DISCRIMINATOR_KEYS: &[&str] = &["type", "kind"];

/// Why a payload could not become an envelope
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("payload has no \"type\" field")]
    MissingKind,
    #[error("payload \"type\" must be a non-empty string")]
    InvalidKind,
}

/// Parsed payload, tagged by `kind`. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    kind: String,
    fields: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Parse payload text into an envelope
    pub fn parse(payload: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(payload)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let mut fields = match value {
            Value::Object(map) => map,
            other => return Err(EnvelopeError::NotAnObject(json_type_name(&other))),
        };

        let key = DISCRIMINATOR_KEYS
            .iter()
            .find(|k| fields.contains_key(**k))
            .ok_or(EnvelopeError::MissingKind)?;

        let kind = match fields.remove(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(EnvelopeError::InvalidKind),
        };

        Ok(Self { kind, fields })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Kind-specific fields, without the discriminator
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The envelope as it would appear on the wire
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert("type".to_string(), Value::String(self.kind.clone()));
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl fmt::Display for ResponseEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_text_envelope() {
        let env = ResponseEnvelope::parse(r#"{"type":"text","message":"hi"}"#).unwrap();
        assert_eq!(env.kind(), "text");
        assert_eq!(env.fields().get("message"), Some(&json!("hi")));
        assert!(!env.fields().contains_key("type"));
    }

    #[test]
    fn test_kind_alias() {
        let env = ResponseEnvelope::parse(r#"{"kind":"zoom","level":3}"#).unwrap();
        assert_eq!(env.kind(), "zoom");
        assert_eq!(env.fields().len(), 1);
    }

    #[test]
    fn test_type_wins_over_kind() {
        let env = ResponseEnvelope::parse(r#"{"kind":"a","type":"b"}"#).unwrap();
        assert_eq!(env.kind(), "b");
        assert_eq!(env.fields().get("kind"), Some(&json!("a")));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ResponseEnvelope::parse("{type: text"),
            Err(EnvelopeError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(
            ResponseEnvelope::parse("[1,2]"),
            Err(EnvelopeError::NotAnObject("an array"))
        ));
    }

    #[test]
    fn test_missing_or_empty_kind() {
        assert!(matches!(
            ResponseEnvelope::parse(r#"{"message":"hi"}"#),
            Err(EnvelopeError::MissingKind)
        ));
        assert!(matches!(
            ResponseEnvelope::parse(r#"{"type":"  "}"#),
            Err(EnvelopeError::InvalidKind)
        ));
        assert!(matches!(
            ResponseEnvelope::parse(r#"{"type":7}"#),
            Err(EnvelopeError::InvalidKind)
        ));
    }

    #[test]
    fn test_display_includes_kind_and_fields() {
        let env = ResponseEnvelope::parse(r#"{"type":"zoom","level":3}"#).unwrap();
        let shown = env.to_string();
        assert!(shown.contains("\"type\":\"zoom\""));
        assert!(shown.contains("\"level\":3"));
    }
}
