//! LLM Client: the single point of entry for all Claude API calls.
//!
//! ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
//! Stages depend on the `CompletionModel` trait; `LlmClient` is the production
//! implementation. Retries are applied by the caller through `RetryPolicy`.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::retry::Transient;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// The request itself was rejected (HTTP 400); resending it cannot help.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, LlmError::Api { status: 400, .. })
    }
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(e) => !e.is_builder(),
            // 529 is Anthropic's "overloaded"
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Parse(_) | LlmError::EmptyContent => false,
        }
    }
}

/// One completion call: an optional system prompt and a single user message.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system: Option<&'a str>,
    pub prompt: &'a str,
}

/// Request/response text completion. Implemented by `LlmClient` and by test fakes.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Returns the text of the first text block of the reply.
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl<'a> From<&CompletionRequest<'a>> for AnthropicRequest<'a> {
    fn from(request: &CompletionRequest<'a>) -> Self {
        Self {
            model: request.model,
            max_tokens: request.max_tokens,
            system: request.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: request.prompt,
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Wraps the Anthropic Messages API. Cheap to clone; one instance per process.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
            api_key,
        })
    }

    /// Makes a single raw call to the Claude API, returning the full response object.
    pub async fn call(&self, request: &CompletionRequest<'_>) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest::from(request);

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: api_error_message(body),
            });
        }

        let llm_response: LlmResponse = response.json().await?;

        debug!(
            "LLM call succeeded: model={}, input_tokens={}, output_tokens={}",
            request.model, llm_response.usage.input_tokens, llm_response.usage.output_tokens
        );

        Ok(llm_response)
    }
}

#[async_trait]
impl CompletionModel for LlmClient {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, LlmError> {
        let response = self.call(request).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }
}

/// Pulls `error.message` out of an Anthropic error body, else returns the body as-is.
fn api_error_message(body: String) -> String {
    serde_json::from_str::<AnthropicError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

/// Strips ```json / ```html / ``` code fences from LLM output.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json", "html", ...) on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) if !rest[..newline].contains(char::is_whitespace) => &rest[newline + 1..],
        _ => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .map(str::trim)
        .unwrap_or_else(|| rest.trim())
}
