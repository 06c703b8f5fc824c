//! Wire models for the chat and alert streaming endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ClientError;

/// Body of a streaming chat request.
///
/// # Example
/// ```rust
/// use visionai_stream::model::ChatRequest;
///
/// let request = ChatRequest::new("How many cameras are offline?")
///     .with_system_prompt("You are a surveillance assistant.")
///     .with_conversation_id("c-42");
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User message; must not be blank
    pub message: String,

    /// Always `true` for this endpoint
    pub stream: bool,

    /// Optional system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Conversation to continue; sent as `null` to start a new one
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    /// Create a new streaming request for `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stream: true,
            system_prompt: None,
            conversation_id: None,
        }
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Continue an existing conversation. An empty id starts a new one.
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into()).filter(|id| !id.is_empty());
        self
    }

    /// Reject requests that must never reach the wire.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.message.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "message must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One parsed chunk of a streaming chat response.
///
/// Every field is optional; the accessors never fail on a missing path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChatDelta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatChunk {
    /// Incremental content at `choices[0].delta.content`, if non-empty.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.as_ref())
            .and_then(|delta| delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }

    /// Correlation id carried by this chunk, if non-empty.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// A message pushed on the alert stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertMessage {
    /// Payload that parsed as JSON
    Json(Value),
    /// Payload that did not parse; delivered verbatim
    Raw(String),
}

impl AlertMessage {
    /// Interpret a payload that failed the first JSON parse.
    ///
    /// Some servers wrap alert payloads in a second `data: ` prefix.
    pub fn from_unparsed(payload: &str) -> Self {
        payload
            .strip_prefix("data: ")
            .and_then(|inner| serde_json::from_str(inner).ok())
            .map(AlertMessage::Json)
            .unwrap_or_else(|| AlertMessage::Raw(payload.to_string()))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            AlertMessage::Json(value) => Some(value),
            AlertMessage::Raw(_) => None,
        }
    }
}
