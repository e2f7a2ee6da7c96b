//! Chat-model backends.
//!
//! Defines the [`ChatModel`] trait and concrete implementations:
//! - **[`DisabledChat`]**: fails every call; used when no provider is configured.
//! - **[`OpenAiChat`]**: calls an OpenAI-compatible `/v1/chat/completions` endpoint in JSON mode.
//! - **[`OllamaChat`]**: calls a local Ollama instance's `/api/chat` endpoint with `format: "json"`.
//!
//! Backends make exactly one HTTP attempt per call and classify failures
//! into [`GenerationError`] kinds. Retrying, timeouts, and concurrency
//! limits are the caller's job (see [`crate::generate::GenerationClient`]).
//!
//! # Failure classification
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → `ModelError` (retryable)
//! - other HTTP 4xx → `Rejected` (not retryable)
//! - network errors → `ModelError`
//! - a 2xx body without message content → `ParseFailure`

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use study_forge_core::models::ContentKind;
use study_forge_core::prompt::Prompt;

use crate::config::ModelConfig;
use crate::error::GenerationError;

/// One chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub kind: ContentKind,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn from_prompt(kind: ContentKind, prompt: Prompt, temperature: f32, max_tokens: u32) -> Self {
        Self {
            kind,
            system: prompt.system,
            user: prompt.user,
            temperature,
            max_tokens,
        }
    }
}

/// A chat model that answers a system/user prompt pair with raw text.
///
/// Implementations must be cheap to share across tasks; the pipeline holds
/// one behind an `Arc` for the lifetime of the process.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Run one completion and return the assistant message content.
    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError>;
}

/// Instantiate the backend named by `config.provider`.
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<String, GenerationError> {
        Err(GenerationError::rejected(
            "model provider is disabled; set [model].provider in the config",
        ))
    }
}

// ============ OpenAI ============

/// OpenAI (or compatible) chat completions in JSON mode.
///
/// Reads the API key from the environment variable named by
/// `model.api_key_env` (default `OPENAI_API_KEY`).
pub struct OpenAiChat {
    model: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.model required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        Ok(Self {
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::model(format!("OpenAI request failed: {}", e)))?;

        let json = read_json(response, "OpenAI").await?;
        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GenerationError::parse("Invalid OpenAI response: missing message content"))
    }
}

// ============ Ollama ============

/// Local Ollama chat endpoint (`POST /api/chat`, default `http://localhost:11434`).
pub struct OllamaChat {
    model: String,
    url: String,
    http: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "format": "json",
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        let response = self
            .http
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                GenerationError::model(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let json = read_json(response, "Ollama").await?;
        json.pointer("/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GenerationError::parse("Invalid Ollama response: missing message content"))
    }
}

/// Classify the HTTP status and decode a successful body as JSON.
async fn read_json(response: reqwest::Response, provider: &str) -> Result<Value, GenerationError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|e| GenerationError::parse(format!("{} returned invalid JSON: {}", provider, e)));
    }

    let body_text = response.text().await.unwrap_or_default();
    let message = format!("{} API error {}: {}", provider, status, body_text);
    if status.as_u16() == 429 || status.is_server_error() {
        Err(GenerationError::model(message))
    } else {
        Err(GenerationError::rejected(message))
    }
}
