//! Error types for the taskloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all taskloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Embedding errors ---
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Transcript errors ---
    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the completion provider. Fatal to the current run.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether a caller-side retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Failures producing embeddings. Aborts a run when raised inside a tool.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Embedding rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Embedding authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Embedding network error: {0}")]
    Network(String),

    #[error("Embedder not configured: {0}")]
    NotConfigured(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedder returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Embedder and backend disagree on the vector dimension.
    #[error("Embedding dimension mismatch: embedder produces {actual}, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// A tool request that broke the name/argument contract. Nothing was invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolContractError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool {tool} is missing required argument '{argument}'")]
    MissingArgument { tool: String, argument: String },

    #[error("Malformed arguments for {tool}: {reason}")]
    MalformedArguments { tool: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error(transparent)]
    Contract(#[from] ToolContractError),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    Execution { tool_name: String, reason: String },

    /// The handler could not reach the embedding service.
    #[error("Tool {tool_name} could not embed: {source}")]
    Embedding {
        tool_name: String,
        source: EmbeddingError,
    },
}

impl ToolError {
    pub fn execution(tool_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Execution {
            tool_name: tool_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors end the run instead of becoming a tool-result turn.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Embedding { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("Tool result '{request_id}' does not answer a request from the preceding assistant turn")]
    OrphanToolResult { request_id: String },

    #[error("Transcript is empty")]
    Empty,

    #[error("Transcript must start with a system turn")]
    MissingSystemTurn,
}
