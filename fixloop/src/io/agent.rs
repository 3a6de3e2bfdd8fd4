//! Repair agent abstraction and HTTP text-completion backends.
//!
//! The [`RepairAgent`] trait decouples the loop from the completion backend.
//! Tests use scripted agents that return predetermined source without any
//! network access.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::response::extract_source;
use crate::core::types::{CodeExplanation, DiagnosticRecord};
use crate::error::ConfigError;
use crate::io::prompt::{PromptBuilder, PromptInputs};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Supported completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Anthropic,
    #[value(name = "openai")]
    OpenAi,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Anthropic => "anthropic",
            Backend::OpenAi => "openai",
        }
    }

    /// Environment variable holding the API key for this backend.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Backend::Anthropic => "ANTHROPIC_API_KEY",
            Backend::OpenAi => "OPENAI_API_KEY",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Backend::Anthropic => ANTHROPIC_BASE_URL,
            Backend::OpenAi => OPENAI_BASE_URL,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the API key for `backend` through `lookup` (usually `std::env::var`).
pub fn resolve_api_key<F>(backend: Backend, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(backend.api_key_var())
        .filter(|key| !key.trim().is_empty())
        .ok_or(ConfigError::MissingApiKey(backend.api_key_var()))
}

/// Everything an HTTP repair agent needs, validated once at startup.
#[derive(Clone)]
pub struct AgentConfig {
    pub backend: Backend,
    pub model: String,
    pub api_key: String,
    pub max_tokens: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Overrides the backend's public endpoint (proxies, gateways).
    pub base_url: Option<String>,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("agent model must not be empty".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey(self.backend.api_key_var()));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("agent max_tokens must be > 0".into()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("agent timeout must be > 0".into()));
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or(self.backend.default_base_url())
            .trim_end_matches('/');
        match self.backend {
            Backend::Anthropic => format!("{base}/v1/messages"),
            Backend::OpenAi => format!("{base}/v1/chat/completions"),
        }
    }
}

/// Input for one repair attempt.
#[derive(Debug, Clone, Copy)]
pub struct RepairRequest<'a> {
    /// Project-relative path of the file being repaired.
    pub path: &'a str,
    pub source: &'a str,
    pub diagnostics: &'a [DiagnosticRecord],
    /// Explanations for the distinct codes in `diagnostics`, where available.
    pub explanations: &'a [CodeExplanation],
}

/// Agent reply: the raw text for the operator and the extracted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairResponse {
    pub raw: String,
    pub source: String,
}

/// Abstraction over repair backends.
pub trait RepairAgent {
    /// Return replacement source for `request.source`. Blocks until the
    /// backend answers or its timeout expires.
    fn repair(&self, request: &RepairRequest<'_>) -> Result<RepairResponse>;
}

/// Repair agent talking to a hosted text-completion API over blocking HTTP.
pub struct HttpRepairAgent {
    config: AgentConfig,
    client: reqwest::blocking::Client,
    prompts: PromptBuilder,
}

impl HttpRepairAgent {
    /// Validate `config` and build the HTTP client.
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            config,
            client,
            prompts: PromptBuilder::new()?,
        })
    }

    #[instrument(skip_all, fields(backend = %self.config.backend, model = %self.config.model))]
    fn complete(&self, prompt: &str) -> Result<String> {
        let url = self.config.endpoint();
        let body = request_body(&self.config, prompt);
        let builder = self.client.post(&url).json(&body);
        let builder = match self.config.backend {
            Backend::Anthropic => builder
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Backend::OpenAi => builder.bearer_auth(&self.config.api_key),
        };

        info!(prompt_bytes = prompt.len(), "requesting repair");
        let response = builder.send().with_context(|| format!("POST {url}"))?;
        let status = response.status();
        let text = response.text().context("read agent response body")?;
        if !status.is_success() {
            warn!(%status, "agent request failed");
            bail!("{} API error ({status}): {text}", self.config.backend);
        }
        debug!(bytes = text.len(), "agent response received");
        parse_reply(self.config.backend, &text)
    }
}

impl RepairAgent for HttpRepairAgent {
    fn repair(&self, request: &RepairRequest<'_>) -> Result<RepairResponse> {
        let prompt = self.prompts.build(&PromptInputs {
            path: request.path,
            source: request.source,
            diagnostics: request.diagnostics,
            explanations: request.explanations,
        })?;
        let raw = self.complete(&prompt)?;
        let source =
            extract_source(&raw).ok_or_else(|| anyhow!("agent reply contained no source"))?;
        Ok(RepairResponse { raw, source })
    }
}

/// JSON body for a single-turn completion request.
fn request_body(config: &AgentConfig, prompt: &str) -> Value {
    match config.backend {
        Backend::Anthropic => json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        }),
        // Newer chat models reject `max_tokens`; leave the cap to the server.
        Backend::OpenAi => json!({
            "model": config.model,
            "messages": [{ "role": "user", "content": prompt }],
        }),
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicReply {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the reply text out of a backend response body.
fn parse_reply(backend: Backend, body: &str) -> Result<String> {
    let text = match backend {
        Backend::Anthropic => {
            let reply: AnthropicReply =
                serde_json::from_str(body).context("parse anthropic response")?;
            reply
                .content
                .into_iter()
                .filter(|block| block.kind == "text")
                .filter_map(|block| block.text)
                .collect::<Vec<_>>()
                .join("")
        }
        Backend::OpenAi => {
            let reply: ChatReply = serde_json::from_str(body).context("parse openai response")?;
            reply
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default()
        }
    };
    if text.trim().is_empty() {
        bail!("{backend} response contained no text");
    }
    Ok(text)
}
