//! Anthropic API client for the reasoning loop
//!
//! Every call is stateless: the engine composes a full prompt from session
//! state and gets back one completion. Rate limits are retried with
//! exponential backoff and repeated hard failures open a process-wide
//! circuit breaker.

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use corax_core::{CoraxError, Result};

use crate::circuit_breaker::CircuitBreaker;
use crate::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse, LlmReply, Model};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

// Rate limit retry configuration
const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_SECS: u64 = 30;
const MAX_BACKOFF_SECS: u64 = 300; // 5 minutes max

// Shared across every session served by this process
static CIRCUIT_BREAKER: OnceLock<CircuitBreaker> = OnceLock::new();

fn circuit_breaker() -> &'static CircuitBreaker {
    CIRCUIT_BREAKER.get_or_init(CircuitBreaker::default)
}

/// Completion interface the reasoning engine depends on
///
/// The production implementation is [`LlmClient`]; tests script the loop
/// with [`ScriptedLlm`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<LlmReply>;
}

/// Anthropic-backed completion provider
#[derive(Debug, Clone)]
pub struct LlmClient {
    model: Model,
    max_tokens: u32,
    api_key_env: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Set max tokens for completions
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Read the API key from a different environment variable
    pub fn with_api_key_env(mut self, env_name: impl Into<String>) -> Self {
        self.api_key_env = env_name.into();
        self
    }

    fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            CoraxError::Auth(format!(
                "No API key found. Set {} to call the Anthropic API.",
                self.api_key_env
            ))
        })
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new(Model::default())
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<LlmReply> {
        let breaker = circuit_breaker();

        if !breaker.allow_request() {
            return Err(CoraxError::Llm(format!(
                "Circuit breaker is OPEN - too many API failures. Wait {} seconds before retry.",
                breaker.retry_after().as_secs()
            )));
        }

        let api_key = self.api_key()?;

        let request = AnthropicRequest {
            model: self.model.api_name().to_string(),
            max_tokens: self.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        // Retry loop with exponential backoff for rate limits
        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            tracing::debug!("Sending request to Anthropic API (attempt {})", retries + 1);

            let response = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|e| CoraxError::Llm(format!("Failed to send request: {}", e)))?;

            let status = response.status();

            // Rate limit (429): honor retry-after, then back off
            if status.as_u16() == 429 {
                retries += 1;

                if retries > MAX_RETRIES {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown".to_string());
                    return Err(CoraxError::Llm(format!(
                        "Rate limit exceeded after {} retries. Last error: {}",
                        MAX_RETRIES, error_text
                    )));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                tracing::warn!(
                    "Rate limited (429). Waiting {} seconds before retry {}/{}",
                    wait_secs,
                    retries,
                    MAX_RETRIES
                );

                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown".to_string());

                // 5xx errors are transient, retry them too
                if status.is_server_error() && retries < MAX_RETRIES {
                    retries += 1;
                    tracing::warn!(
                        "Server error ({}). Waiting {} seconds before retry {}/{}",
                        status,
                        backoff_secs,
                        retries,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                breaker.record_failure();
                tracing::error!(
                    "Circuit breaker: recorded failure (count: {})",
                    breaker.failure_count()
                );

                return Err(CoraxError::Llm(format!(
                    "Anthropic API error {}: {}",
                    status, error_text
                )));
            }

            let anthropic_response: AnthropicResponse = response
                .json()
                .await
                .map_err(|e| CoraxError::Llm(format!("Failed to parse response: {}", e)))?;

            let text = anthropic_response
                .content
                .first()
                .ok_or_else(|| CoraxError::Llm("No content in response".to_string()))?
                .text
                .clone();

            let usage = anthropic_response.usage.unwrap_or_default();

            breaker.record_success();

            tracing::debug!(
                "Completion finished ({} chars, {} input tokens, {} output tokens)",
                text.len(),
                usage.input_tokens,
                usage.output_tokens
            );

            return Ok(LlmReply { text, usage });
        }
    }
}

/// Scripted provider for tests: hands out canned replies in order
///
/// Returns an error once the script runs out, which doubles as a transport
/// failure for error-path tests.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, _prompt: &str) -> Result<LlmReply> {
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(text) => Ok(LlmReply {
                text,
                usage: corax_core::TokenUsage {
                    input_tokens: 10,
                    output_tokens: 10,
                },
            }),
            None => Err(CoraxError::Llm("Scripted reply queue is empty".to_string())),
        }
    }
}
