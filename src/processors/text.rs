//! Plain conversational replies

use super::{parse_fields, Processor, ProcessorContext, ProcessorError, ProcessorOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

pub struct TextProcessor;

#[derive(Debug, Deserialize)]
struct TextInput {
    message: String,
}

#[async_trait]
impl Processor for TextProcessor {
    fn kind(&self) -> &'static str {
        "text"
    }

    fn description(&self) -> String {
        "Answers general questions with a plain text message.".to_string()
    }

    fn prompt_info(&self) -> String {
        r#"
== Responses of type 'text' ==
  Use this type when the request does not match any of the other types.
  The 'type' field must be "text".
  Include a 'message' field with the answer to show to the user.
  The resulting JSON must be valid: escape double quotes and line breaks inside the message.
  Example:
  {
    "type": "text",
    "message": "Hello, I am a chat assistant. How can I help you?"
  }
"#
        .to_string()
    }

    async fn handle(
        &self,
        _ctx: &ProcessorContext,
        _user_text: &str,
        fields: &Map<String, Value>,
    ) -> Result<ProcessorOutput, ProcessorError> {
        let input: TextInput = parse_fields(fields)?;
        Ok(ProcessorOutput::text(input.message))
    }
}
