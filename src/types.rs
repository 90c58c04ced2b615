//! Request and response value types for the chat-completion client.
//!
//! Everything here is a transient, call-scoped value object: requests are
//! built fresh per call and never mutated afterwards, responses are only
//! constructed by successfully parsing a well-formed remote reply.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ============================================================================
// Messages
// ============================================================================

/// Role of a chat message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System message for setting context. Must be the first message.
    System,
    /// User input message. Must be the last message.
    User,
    /// Assistant response message.
    Assistant,
}

impl ChatRole {
    /// Convert role to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A single role-tagged message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender.
    pub role: ChatRole,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// Structured output
// ============================================================================

/// Structured-output descriptor attached to a completion request.
///
/// Asks the remote service to constrain its reply to the given JSON-Schema
/// shape, and triggers client-side decoding of the reply content.
///
/// Strict mode (`strict = true`) requires every declared property to be
/// listed as required. A schema with any optional property must therefore
/// be issued with `strict = false`.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredOutput {
    /// Name of the schema, echoed back by the service.
    pub name: String,
    /// Whether the service must enforce the schema exactly.
    pub strict: bool,
    /// JSON-Schema object describing the expected reply shape.
    pub schema: JsonValue,
}

impl StructuredOutput {
    /// Create a new structured-output descriptor.
    pub fn new(name: impl Into<String>, strict: bool, schema: JsonValue) -> Self {
        Self {
            name: name.into(),
            strict,
            schema,
        }
    }
}

// ============================================================================
// Completion request
// ============================================================================

/// A chat-completion request.
///
/// Built fresh per call; tuning parameters left as `None` are omitted from
/// the outbound payload, except `temperature` which defaults to 1.0.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier (e.g. "anthropic/claude-3.5-sonnet").
    pub model: String,
    /// Ordered message sequence. Must be non-empty and end with a user
    /// message; a system message may only appear first.
    pub messages: Vec<Message>,
    /// Optional structured-output descriptor.
    pub response_schema: Option<StructuredOutput>,
    /// Sampling temperature. Defaults to 1.0 when omitted.
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
    /// Top-p (nucleus) sampling.
    pub top_p: Option<f32>,
    /// Frequency penalty.
    pub frequency_penalty: Option<f32>,
    /// Presence penalty.
    pub presence_penalty: Option<f32>,
    /// Stop sequences.
    pub stop: Option<Vec<String>>,
    /// Streaming flag, forwarded verbatim.
    pub stream: Option<bool>,
}

impl CompletionRequest {
    /// Create a request with the required fields only.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            response_schema: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
            stream: None,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set top-p sampling.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set stop sequences.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Attach a structured-output descriptor.
    pub fn with_response_schema(mut self, schema: StructuredOutput) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

// ============================================================================
// Completion response
// ============================================================================

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

impl FinishReason {
    /// Parse a wire value. Unrecognized values map to `None` rather than
    /// failing the whole response.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stop" => Some(Self::Stop),
            "length" => Some(Self::Length),
            "tool_calls" => Some(Self::ToolCalls),
            "content_filter" => Some(Self::ContentFilter),
            _ => None,
        }
    }
}

/// Content of a reply choice.
///
/// Plain text normally; a decoded JSON value when the originating request
/// carried a structured-output descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChoiceContent {
    Text(String),
    Json(JsonValue),
}

impl ChoiceContent {
    /// The raw text, if this is a text reply.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Json(_) => None,
        }
    }

    /// The decoded JSON value, if structured output was requested.
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Text(_) => None,
            Self::Json(v) => Some(v),
        }
    }
}

/// Reply message within a choice.
#[derive(Debug, Clone, Serialize)]
pub struct ChoiceMessage {
    /// Role of the reply (normally "assistant").
    pub role: String,
    /// Reply content.
    pub content: ChoiceContent,
}

/// One generated reply choice.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    /// Position of this choice in the reply.
    pub index: u32,
    /// The generated message.
    pub message: ChoiceMessage,
    /// Why generation stopped, when the service reported a known reason.
    pub finish_reason: Option<FinishReason>,
}

/// Token-usage accounting for one completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A fully parsed and structurally validated completion response.
///
/// Only constructed from a well-formed remote reply; a missing required
/// field is a hard parse failure, never a partially defaulted response.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    /// Response identifier assigned by the service.
    pub id: String,
    /// Model that actually served the request.
    pub model: String,
    /// Generated choices, always non-empty.
    pub choices: Vec<CompletionChoice>,
    /// Token-usage accounting.
    pub usage: Usage,
    /// Creation time in epoch seconds. Falls back to local wall-clock time
    /// when the service omits it; the fallback is logged since it
    /// fabricates a timestamp.
    pub created_at_epoch_seconds: i64,
}

impl CompletionResponse {
    /// Content of the first choice, for the common single-choice case.
    pub fn first_content(&self) -> Option<&ChoiceContent> {
        self.choices.first().map(|c| &c.message.content)
    }
}

// ============================================================================
// Model listing
// ============================================================================

/// Pricing information for a listed model, in USD per token as reported by
/// the service (string-encoded decimals).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ModelPricing {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub completion: String,
}

/// One model available through the service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelInfo {
    /// Unique model identifier (e.g. "openai/gpt-4o").
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Model description.
    #[serde(default)]
    pub description: Option<String>,
    /// Pricing information.
    #[serde(default)]
    pub pricing: Option<ModelPricing>,
}
