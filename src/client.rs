//! Chat-completion client with bounded retries and structural response
//! validation.
//!
//! The client is stateless beyond the credential and base URL captured at
//! construction: calls are independent, safe to issue concurrently, and
//! retries of one call are strictly sequential. There is no ambient or
//! global instance; the embedding application constructs and owns the
//! client explicitly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{LlmError, Result};
use crate::transport::{
    HttpMethod, HttpTransport, ReqwestTransport, TransportError, TransportRequest,
    TransportResponse,
};
use crate::types::{
    ChatRole, ChoiceContent, ChoiceMessage, CompletionChoice, CompletionRequest,
    CompletionResponse, FinishReason, Message, ModelInfo, StructuredOutput, Usage,
};

// ============================================================================
// Constants
// ============================================================================

/// Default API base URL (OpenRouter).
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Temperature applied when the caller omits one.
const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Maximum retries after the first attempt (4 attempts total).
const MAX_RETRIES: u32 = 3;

/// Base backoff delay; attempt k waits `BASE_DELAY_MS * 2^(k-1)` ms.
const BASE_DELAY_MS: u64 = 1000;

/// Per-attempt deadline for completion requests.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Wire payload (OpenAI-compatible)
// ============================================================================

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: Vec<PayloadMessage<'a>>,
    /// Always present: defaults to [`DEFAULT_TEMPERATURE`] when the caller
    /// omits it.
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct PayloadMessage<'a> {
    role: ChatRole,
    content: &'a str,
}

/// Structured response-format directive.
#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a JsonValue,
}

// ============================================================================
// Raw response types
//
// Everything is optional here; structural validation with distinct error
// messages happens in `parse_completion`, never in serde defaults.
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawCompletion {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    choices: Option<Vec<RawChoice>>,
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    index: Option<u32>,
    message: Option<RawMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    role: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

/// Error body: `{"error": "..."}` or `{"error": {"message": "...", ...}}`.
#[derive(Debug, Deserialize)]
struct RawErrorBody {
    error: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct RawModels {
    data: Option<Vec<ModelInfo>>,
}

// ============================================================================
// Client
// ============================================================================

/// Client for a remote OpenAI-compatible chat-completion endpoint.
#[derive(Clone)]
pub struct ChatCompletionClient {
    api_key: String,
    base_url: String,
    referrer: Option<String>,
    title: Option<String>,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("referrer", &self.referrer)
            .field("title", &self.title)
            .finish()
    }
}

impl ChatCompletionClient {
    /// Create a client with the given API credential.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Unauthorized`] when the credential is empty or
    /// blank, so no client can exist that would silently send
    /// unauthenticated requests.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Unauthorized(
                "API credential must not be empty".to_string(),
            ));
        }
        let transport = ReqwestTransport::new()
            .map_err(|e| LlmError::Internal(format!("failed to initialize transport: {}", e)))?;
        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            referrer: None,
            title: None,
            transport: Arc::new(transport),
        })
    }

    /// Set the base URL (for proxies or testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the `HTTP-Referer` origin tag sent with every request.
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Set the `X-Title` application tag sent with every request.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Replace the HTTP transport (tests inject a mock here).
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Chat completions endpoint URL.
    fn completions_endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Headers sent with every API request. The two descriptive tags do not
    /// affect semantics and are only attached when configured.
    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        if let Some(referrer) = &self.referrer {
            headers.push(("HTTP-Referer".to_string(), referrer.clone()));
        }
        if let Some(title) = &self.title {
            headers.push(("X-Title".to_string(), title.clone()));
        }
        headers
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Send a validated chat-completion request and return the parsed,
    /// structurally validated response.
    #[instrument(skip(self, request), fields(model = %request.model))]
    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.complete_inner(request, None).await
    }

    /// Like [`complete`](Self::complete), honoring a cancellation token
    /// during in-flight attempts and backoff delays.
    #[instrument(skip(self, request, cancel), fields(model = %request.model))]
    pub async fn complete_with_cancel(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse> {
        self.complete_inner(request, Some(cancel)).await
    }

    /// Attach a structured-output descriptor to a copy of `request`
    /// (overriding any existing one) and delegate to
    /// [`complete`](Self::complete).
    pub async fn complete_with_schema(
        &self,
        request: &CompletionRequest,
        schema: JsonValue,
        schema_name: &str,
        strict: bool,
    ) -> Result<CompletionResponse> {
        let mut request = request.clone();
        request.response_schema = Some(StructuredOutput::new(schema_name, strict, schema));
        self.complete(&request).await
    }

    /// List the models available through the service.
    ///
    /// Single GET, no retry, no timeout beyond the transport default.
    #[instrument(skip(self))]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let request = TransportRequest {
            method: HttpMethod::Get,
            url: format!("{}/models", self.base_url),
            headers: self.headers(),
            body: None,
        };

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(map_transport_error)?;

        if !response.is_success() {
            return Err(map_error_status(response.status, &response.body));
        }

        let raw: RawModels = serde_json::from_str(&response.body).map_err(|e| {
            debug!(error = %e, "models response body failed to decode");
            LlmError::Internal("failed to decode models response body".to_string())
        })?;
        raw.data
            .ok_or_else(|| LlmError::Internal("models response missing `data` array".to_string()))
    }

    // ========================================================================
    // Request pipeline
    // ========================================================================

    async fn complete_inner(
        &self,
        request: &CompletionRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<CompletionResponse> {
        validate_request(request)?;

        let payload = build_payload(request);
        let body = serde_json::to_string(&payload).map_err(|e| {
            debug!(error = %e, "completion payload failed to serialize");
            LlmError::Internal("failed to serialize completion request".to_string())
        })?;

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            structured = request.response_schema.is_some(),
            "sending completion request"
        );

        let response = self.send_with_retry(body, cancel).await?;

        if !response.is_success() {
            return Err(map_error_status(response.status, &response.body));
        }

        parse_completion(&response.body, request.response_schema.is_some())
    }

    /// Send one POST with up to [`MAX_RETRIES`] retries.
    ///
    /// Only transport-level failures (including the per-attempt timeout)
    /// and HTTP 429 are retried; every other status is handed back after a
    /// single attempt. The backoff delay fully elapses before the next
    /// attempt starts.
    async fn send_with_retry(
        &self,
        body: String,
        cancel: Option<&CancellationToken>,
    ) -> Result<TransportResponse> {
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(BASE_DELAY_MS * (1 << (attempt - 1)));
                debug!(attempt, ?delay, "backing off before retry");
                wait_or_cancel(delay, cancel).await?;
            }

            let request = TransportRequest {
                method: HttpMethod::Post,
                url: self.completions_endpoint(),
                headers: self.headers(),
                body: Some(body.clone()),
            };

            let outcome = attempt_or_cancel(
                self.transport.as_ref(),
                request,
                Duration::from_secs(REQUEST_TIMEOUT_SECS),
                cancel,
            )
            .await?;

            match outcome {
                Ok(response) if response.status == 429 => {
                    if attempt < MAX_RETRIES {
                        warn!(attempt = attempt + 1, "rate limited, will retry");
                        continue;
                    }
                    let detail = extract_error_message(response.status, &response.body);
                    return Err(LlmError::Internal(format!(
                        "rate limit exceeded: {}",
                        detail
                    )));
                }
                Ok(response) => return Ok(response),
                Err(TransportError::Timeout) => {
                    if attempt < MAX_RETRIES {
                        warn!(attempt = attempt + 1, "attempt timed out, will retry");
                        continue;
                    }
                    return Err(LlmError::Internal(format!(
                        "request timed out after {} attempts",
                        attempt + 1
                    )));
                }
                Err(TransportError::Network(message)) => {
                    if attempt < MAX_RETRIES {
                        warn!(attempt = attempt + 1, error = %message, "network failure, will retry");
                        continue;
                    }
                    return Err(LlmError::Internal(format!("network error: {}", message)));
                }
            }
        }

        // The loop always returns within MAX_RETRIES + 1 iterations.
        Err(LlmError::Internal("retry budget exhausted".to_string()))
    }
}

/// Run one transport attempt under the per-attempt deadline, honoring the
/// cancellation token if one was supplied.
async fn attempt_or_cancel(
    transport: &dyn HttpTransport,
    request: TransportRequest,
    deadline: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<std::result::Result<TransportResponse, TransportError>> {
    let attempt = tokio::time::timeout(deadline, transport.execute(request));
    let outcome = match cancel {
        Some(token) => {
            tokio::select! {
                _ = token.cancelled() => {
                    return Err(LlmError::Internal("request cancelled".to_string()));
                }
                outcome = attempt => outcome,
            }
        }
        None => attempt.await,
    };
    // A deadline miss is treated like any other retryable transport failure.
    Ok(outcome.unwrap_or(Err(TransportError::Timeout)))
}

/// Sleep for a backoff delay, honoring the cancellation token.
async fn wait_or_cancel(delay: Duration, cancel: Option<&CancellationToken>) -> Result<()> {
    match cancel {
        Some(token) => {
            tokio::select! {
                _ = token.cancelled() => Err(LlmError::Internal("request cancelled".to_string())),
                _ = sleep(delay) => Ok(()),
            }
        }
        None => {
            sleep(delay).await;
            Ok(())
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Check every pre-flight rule and aggregate all violations into a single
/// validation failure. Nothing is sent until this passes.
fn validate_request(request: &CompletionRequest) -> Result<()> {
    let mut details = HashMap::new();

    if request.model.trim().is_empty() {
        details.insert("model".to_string(), "must not be empty".to_string());
    }

    if request.messages.is_empty() {
        details.insert("messages".to_string(), "must not be empty".to_string());
    } else {
        for (i, message) in request.messages.iter().enumerate() {
            if message.content.trim().is_empty() {
                details.insert(
                    format!("messages[{}].content", i),
                    "must not be empty".to_string(),
                );
            }
            if message.role == ChatRole::System && i != 0 {
                details.insert(
                    format!("messages[{}]", i),
                    "system message must be the first message".to_string(),
                );
            }
        }
        let last = request.messages.len() - 1;
        if request.messages[last].role != ChatRole::User {
            details.insert(
                format!("messages[{}]", last),
                "final message must have role user".to_string(),
            );
        }
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(LlmError::validation("invalid completion request", details))
    }
}

// ============================================================================
// Payload construction
// ============================================================================

fn build_payload(request: &CompletionRequest) -> ChatPayload<'_> {
    ChatPayload {
        model: &request.model,
        messages: request
            .messages
            .iter()
            .map(|m| PayloadMessage {
                role: m.role,
                content: &m.content,
            })
            .collect(),
        temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        response_format: request.response_schema.as_ref().map(|s| ResponseFormat {
            format_type: "json_schema",
            json_schema: JsonSchemaFormat {
                name: &s.name,
                strict: s.strict,
                schema: &s.schema,
            },
        }),
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        frequency_penalty: request.frequency_penalty,
        presence_penalty: request.presence_penalty,
        stop: request.stop.as_deref(),
        stream: request.stream,
    }
}

// ============================================================================
// Error mapping
// ============================================================================

fn map_transport_error(error: TransportError) -> LlmError {
    match error {
        TransportError::Timeout => LlmError::Internal("request timed out".to_string()),
        TransportError::Network(message) => {
            LlmError::Internal(format!("network error: {}", message))
        }
    }
}

/// Map a non-2xx status to the shared error taxonomy.
///
/// Only 400, 401, and 402 get dedicated kinds; everything else, including
/// 5xx, is a generic internal error carrying the remote message.
fn map_error_status(status: u16, body: &str) -> LlmError {
    let message = extract_error_message(status, body);
    match status {
        400 => LlmError::Validation {
            message,
            details: None,
        },
        401 => LlmError::Unauthorized(message),
        402 => LlmError::Internal(format!("insufficient credits: {}", message)),
        s if s >= 500 => LlmError::Internal(format!("server error ({}): {}", s, message)),
        s => LlmError::Internal(format!("unexpected status {}: {}", s, message)),
    }
}

/// Pull the human-readable message out of an error body, falling back to
/// the raw text and finally to the status phrase.
fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<RawErrorBody>(body) {
        match parsed.error {
            Some(JsonValue::String(message)) => return message,
            Some(JsonValue::Object(fields)) => {
                if let Some(message) = fields.get("message").and_then(|v| v.as_str()) {
                    return message.to_string();
                }
            }
            _ => {}
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    status_phrase(status)
}

fn status_phrase(status: u16) -> String {
    let phrase = match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => return format!("HTTP {}", status),
    };
    format!("{} {}", status, phrase)
}

// ============================================================================
// Response parsing
// ============================================================================

/// Parse and structurally validate a 2xx body. Any missing required field
/// is a hard failure; no partial response is ever returned.
fn parse_completion(body: &str, decode_content: bool) -> Result<CompletionResponse> {
    let raw: RawCompletion = serde_json::from_str(body).map_err(|e| {
        debug!(error = %e, "completion response body failed to decode");
        LlmError::Internal("failed to decode completion response body".to_string())
    })?;

    let id = raw
        .id
        .ok_or_else(|| LlmError::Internal("completion response missing `id`".to_string()))?;
    let model = raw
        .model
        .ok_or_else(|| LlmError::Internal("completion response missing `model`".to_string()))?;
    let raw_choices = raw
        .choices
        .ok_or_else(|| LlmError::Internal("completion response missing `choices`".to_string()))?;
    let raw_usage = raw
        .usage
        .ok_or_else(|| LlmError::Internal("completion response missing `usage`".to_string()))?;

    if raw_choices.is_empty() {
        return Err(LlmError::Internal(
            "completion response contained no choices".to_string(),
        ));
    }

    let mut choices = Vec::with_capacity(raw_choices.len());
    for (position, choice) in raw_choices.into_iter().enumerate() {
        choices.push(parse_choice(position, choice, decode_content)?);
    }

    let usage = Usage {
        prompt_tokens: raw_usage.prompt_tokens.ok_or_else(|| {
            LlmError::Internal("completion usage missing `prompt_tokens`".to_string())
        })?,
        completion_tokens: raw_usage.completion_tokens.ok_or_else(|| {
            LlmError::Internal("completion usage missing `completion_tokens`".to_string())
        })?,
        total_tokens: raw_usage.total_tokens.ok_or_else(|| {
            LlmError::Internal("completion usage missing `total_tokens`".to_string())
        })?,
    };

    let created_at_epoch_seconds = match raw.created {
        Some(created) => created,
        None => {
            // Deliberate leniency: the service's `created` field is treated
            // as optional, but the substitute is a fabricated timestamp.
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            warn!(substituted = now, "completion response missing `created`; using local time");
            now
        }
    };

    Ok(CompletionResponse {
        id,
        model,
        choices,
        usage,
        created_at_epoch_seconds,
    })
}

fn parse_choice(position: usize, raw: RawChoice, decode_content: bool) -> Result<CompletionChoice> {
    let index = raw
        .index
        .ok_or_else(|| LlmError::Internal(format!("choice {} missing `index`", position)))?;
    let message = raw
        .message
        .ok_or_else(|| LlmError::Internal(format!("choice {} missing `message`", position)))?;
    let role = message
        .role
        .ok_or_else(|| LlmError::Internal(format!("choice {} missing `message.role`", position)))?;
    let text = message.content.ok_or_else(|| {
        LlmError::Internal(format!("choice {} missing `message.content`", position))
    })?;

    let content = if decode_content {
        let value = serde_json::from_str::<JsonValue>(&text).map_err(|e| {
            debug!(choice = position, error = %e, "structured content failed to decode");
            LlmError::Internal(format!(
                "choice {} content is not valid JSON for the requested schema",
                position
            ))
        })?;
        ChoiceContent::Json(value)
    } else {
        ChoiceContent::Text(text)
    };

    Ok(CompletionChoice {
        index,
        message: ChoiceMessage { role, content },
        finish_reason: raw.finish_reason.as_deref().and_then(FinishReason::parse),
    })
}

/// Convenience constructor for a single-turn request, mirroring how the
/// recipe application calls the client.
pub fn single_turn(model: impl Into<String>, system: Option<&str>, user: &str) -> CompletionRequest {
    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(user));
    CompletionRequest::new(model, messages)
}

// ============================================================================
// Unit tests
// ============================================================================
