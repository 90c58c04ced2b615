//! Chat-completion client for AI-assisted recipe generation.
//!
//! This crate is the outbound-LLM component of a recipe-management
//! application. It provides:
//!
//! - Text completion against an OpenAI-compatible chat endpoint
//!   (OpenRouter by default), with pre-flight validation, bounded retries
//!   with exponential backoff, and a per-attempt timeout
//! - Structured output: attach a JSON-Schema descriptor and get the reply
//!   content decoded into a JSON value
//! - Model listing
//! - Recipe generation from a user's existing recipes and dietary
//!   preferences
//!
//! All persistence, authentication, and UI concerns live in the embedding
//! application; this crate holds no state beyond the credential and base
//! URL captured at construction.
//!
//! # Example
//!
//! ```ignore
//! use souschef_llm::{ChatCompletionClient, CompletionRequest, Message};
//!
//! let client = ChatCompletionClient::new("sk-or-...")?
//!     .with_referrer("https://myapp.example")
//!     .with_title("My Recipe App");
//!
//! let request = CompletionRequest::new(
//!     "anthropic/claude-3.5-sonnet",
//!     vec![Message::user("Suggest a weeknight dinner.")],
//! );
//! let response = client.complete(&request).await?;
//! ```

pub mod client;
pub mod error;
pub mod recipes;
pub mod transport;
pub mod types;

pub use client::{single_turn, ChatCompletionClient};
pub use error::{LlmError, Result};
pub use recipes::{
    DietaryPreferences, Difficulty, ExistingRecipe, GeneratedIngredient, GeneratedRecipe,
    GenerationMode, RecipeGenerationParams,
};
pub use transport::{
    HttpMethod, HttpTransport, MockTransport, RecordedRequest, ReqwestTransport, TransportError,
    TransportRequest, TransportResponse,
};
pub use types::{
    ChatRole, ChoiceContent, ChoiceMessage, CompletionChoice, CompletionRequest,
    CompletionResponse, FinishReason, Message, ModelInfo, ModelPricing, StructuredOutput, Usage,
};
