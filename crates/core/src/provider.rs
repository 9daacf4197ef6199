//! Provider trait: the abstraction over completion backends.
//!
//! A Provider sends the transcript plus tool declarations to a model and
//! returns either a textual answer or a list of tool requests. It is an
//! opaque, possibly-failing network call; retries are the caller's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{ToolRequest, Turn};
use crate::tool::ToolDeclaration;

/// How the model may use the declared tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides
    #[default]
    Auto,
    /// Tools are declared but must not be called
    None,
    /// The model must call the named tool
    Forced(String),
}

impl From<&str> for ToolChoice {
    fn from(value: &str) -> Self {
        match value {
            "auto" | "" => Self::Auto,
            "none" => Self::None,
            name => Self::Forced(name.to_string()),
        }
    }
}

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The transcript so far
    pub turns: Vec<Turn>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the model can call; empty means plain chat
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,

    #[serde(default)]
    pub tool_choice: ToolChoice,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            model: model.into(),
            turns,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated text, if any
    #[serde(default)]
    pub content: Option<String>,

    /// Tool invocations requested by the model
    #[serde(default)]
    pub tool_requests: Vec<ToolRequest>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl ProviderResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn tools(tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            tool_requests,
            ..Self::default()
        }
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }

    /// The assistant turn this response becomes in the transcript.
    pub fn to_turn(&self) -> Turn {
        Turn::assistant_with_requests(self.content.clone(), self.tool_requests.clone())
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The agent loop calls `complete()` without knowing which backend answers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
