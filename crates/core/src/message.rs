//! Turn and Transcript domain types.
//!
//! A transcript is the ordered, append-only history exchanged between the
//! user, the model and the tool handlers:
//! system prompt → user input → assistant (text or tool requests) → tool results → ...

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TranscriptError;

/// Unique identifier for a transcript (one conversation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TranscriptId(pub String);

impl TranscriptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TranscriptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TranscriptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request from the model to invoke a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Correlation id, unique within the assistant turn
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments exactly as the model produced them (JSON text)
    pub arguments: String,
}

impl ToolRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One entry in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// Instructions that frame the conversation
    System { content: String },

    /// Input from the end user
    User { content: String },

    /// Model output: text, tool requests, or both
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_requests: Vec<ToolRequest>,
    },

    /// The outcome of one tool request
    ToolResult {
        request_id: String,
        tool_name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    /// An assistant turn carrying only text.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_requests: Vec::new(),
        }
    }

    /// An assistant turn requesting tools, with optional accompanying text.
    pub fn assistant_with_requests(content: Option<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Self::Assistant { content, tool_requests }
    }

    pub fn tool_result(
        request_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            request_id: request_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            is_error,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }

    /// Text content of the turn, if it has any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::ToolResult { content, .. } => Some(content),
        }
    }

    pub fn tool_requests(&self) -> &[ToolRequest] {
        match self {
            Self::Assistant { tool_requests, .. } => tool_requests,
            _ => &[],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::ToolResult { is_error: true, .. })
    }
}

/// The ordered, append-only history of one conversation.
///
/// Turns can only be appended through [`Transcript::push`], which rejects a
/// tool result that does not answer a request from the preceding assistant turn.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub id: TranscriptId,
    turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: TranscriptId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a transcript seeded with a system turn.
    pub fn seeded(system_prompt: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.turns.push(Turn::system(system_prompt));
        transcript
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) -> Result<(), TranscriptError> {
        if let Turn::ToolResult { request_id, .. } = &turn {
            if !self.pending_request_ids().any(|id| id == request_id) {
                return Err(TranscriptError::OrphanToolResult {
                    request_id: request_id.clone(),
                });
            }
        }
        self.updated_at = Utc::now();
        self.turns.push(turn);
        Ok(())
    }

    /// Request ids a tool result may currently answer: those of the most
    /// recent assistant turn, provided only tool results follow it.
    fn pending_request_ids(&self) -> impl Iterator<Item = &str> {
        let assistant = self
            .turns
            .iter()
            .rev()
            .find(|t| !matches!(t, Turn::ToolResult { .. }))
            .map(Turn::tool_requests)
            .unwrap_or(&[]);
        assistant.iter().map(|r| r.id.as_str())
    }

    /// Checks the preconditions for handing this transcript to the agent loop.
    pub fn validate_seed(&self) -> Result<(), TranscriptError> {
        match self.turns.first() {
            None => Err(TranscriptError::Empty),
            Some(Turn::System { .. }) => Ok(()),
            Some(_) => Err(TranscriptError::MissingSystemTurn),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns
            .iter()
            .map(|t| t.text().map_or(0, str::len) / 4)
            .sum()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
